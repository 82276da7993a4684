// src/reinforcement/learning_context.rs
//
// Owns the four learned stores. Each store sits behind its own mutex so that
// concurrent feedback submissions serialize per store, while matching works
// from a point-in-time snapshot and never holds a lock during scoring.

use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use log::{debug, info, warn};

use super::confidence_calibrator::ConfidenceCalibrator;
use super::feedback_processor::{FeedbackLookup, FeedbackStore};
use super::pattern_learner::PatternLearner;
use super::types::{LearningStateReport, TrainingSample, WeightVector};
use super::weight_learner::AdaptiveWeightLearner;
use crate::config::LearningConfig;
use crate::error::FeedbackError;
use crate::models::{FeedbackRecord, FeedbackSubmission};
use crate::persistence::LoadStatus;

/// Read-only copy of the learned state used for one matching request.
#[derive(Debug, Clone)]
pub struct LearningSnapshot {
    pub weights: WeightVector,
    /// Whether `weights` were learned rather than the defaults
    pub trained: bool,
    pub calibrator: ConfidenceCalibrator,
    pub patterns: PatternLearner,
    pub feedback: FeedbackLookup,
}

/// Result of ingesting one feedback submission.
#[derive(Debug, Clone)]
pub struct FeedbackOutcome {
    pub record: FeedbackRecord,
    /// Size of the batch handed to the weight learner, if this record completed one
    pub weight_update_batch: Option<usize>,
    /// Downstream learners that failed; the record is stored regardless
    pub learner_failures: Vec<String>,
}

pub struct LearningContext {
    config: LearningConfig,
    weights: Mutex<AdaptiveWeightLearner>,
    calibrator: Mutex<ConfidenceCalibrator>,
    patterns: Mutex<PatternLearner>,
    feedback: Mutex<FeedbackStore>,
    /// Stores whose documents were unreadable at load and started from defaults
    corrupt_stores: Vec<String>,
}

fn lock_store<'a, T>(store: &'a Mutex<T>, label: &str) -> MutexGuard<'a, T> {
    store.lock().unwrap_or_else(|poisoned| {
        warn!("{} lock was poisoned; continuing with its last state", label);
        poisoned.into_inner()
    })
}

impl LearningContext {
    /// Loads every store from `config.data_dir`. Missing or corrupt documents
    /// yield default state; loading never fails.
    pub fn load(config: LearningConfig) -> Self {
        info!(
            "Loading learning context from {}",
            config.data_dir.display()
        );
        let (weights, weights_status) = AdaptiveWeightLearner::load_with_status(&config);
        let (calibrator, calibrator_status) = ConfidenceCalibrator::load_with_status(&config);
        let (patterns, patterns_status) = PatternLearner::load_with_status(&config);
        let (feedback, feedback_status) = FeedbackStore::load_with_status(&config);

        let corrupt_stores: Vec<String> = [
            ("weight_learner", weights_status),
            ("calibrator", calibrator_status),
            ("pattern_learner", patterns_status),
            ("feedback_store", feedback_status),
        ]
        .into_iter()
        .filter(|(_, status)| *status == LoadStatus::Corrupt)
        .map(|(label, _)| label.to_string())
        .collect();
        if !corrupt_stores.is_empty() {
            warn!(
                "Learning context started with defaults for corrupt stores: {}",
                corrupt_stores.join(", ")
            );
        }

        Self {
            weights: Mutex::new(weights),
            calibrator: Mutex::new(calibrator),
            patterns: Mutex::new(patterns),
            feedback: Mutex::new(feedback),
            corrupt_stores,
            config,
        }
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    pub fn corrupt_stores(&self) -> &[String] {
        &self.corrupt_stores
    }

    pub fn snapshot(&self) -> LearningSnapshot {
        let (weights, trained) = {
            let learner = lock_store(&self.weights, "weight learner");
            (learner.get_weights(), learner.is_trained())
        };
        LearningSnapshot {
            weights,
            trained,
            calibrator: lock_store(&self.calibrator, "calibrator").clone(),
            patterns: lock_store(&self.patterns, "pattern learner").clone(),
            feedback: lock_store(&self.feedback, "feedback store").lookup().clone(),
        }
    }

    pub fn weights(&self) -> WeightVector {
        lock_store(&self.weights, "weight learner").get_weights()
    }

    pub fn weight_update_count(&self) -> u64 {
        lock_store(&self.weights, "weight learner").update_count()
    }

    pub fn feedback_count(&self) -> usize {
        lock_store(&self.feedback, "feedback store").len()
    }

    pub fn get_suggested_match(&self, file1_column: &str) -> Option<String> {
        lock_store(&self.feedback, "feedback store").get_suggested_match(file1_column)
    }

    /// Stores one judgment, then drives the calibrator, the pattern learner
    /// and, when the record completes a batch, the weight learner. Only the
    /// feedback write can fail the call.
    pub fn add_feedback(
        &self,
        submission: FeedbackSubmission,
    ) -> Result<FeedbackOutcome, FeedbackError> {
        let batch_size = self.config.feedback_batch_size;
        let (record, batch) = {
            let mut store = lock_store(&self.feedback, "feedback store");
            let record = store.add_feedback(submission)?;
            let total = store.len();
            let batch: Option<Vec<TrainingSample>> = (batch_size > 0 && total % batch_size == 0)
                .then(|| store.recent_samples(batch_size));
            (record, batch)
        };

        let mut learner_failures = Vec::new();

        if let Err(e) = lock_store(&self.calibrator, "calibrator")
            .update(record.confidence, record.is_correct)
        {
            warn!("Calibrator update failed for feedback {}: {:#}", record.id, e);
            learner_failures.push("calibrator".to_string());
        }

        let pattern_result = {
            let mut patterns = lock_store(&self.patterns, "pattern learner");
            if record.is_correct {
                patterns.learn_from_positive(&record.file1_column, &record.file2_column)
            } else {
                patterns.learn_from_negative(
                    &record.file1_column,
                    &record.file2_column,
                    record.name_similarity,
                    record.data_similarity,
                )
            }
        };
        if let Err(e) = pattern_result {
            warn!("Pattern learner update failed for feedback {}: {:#}", record.id, e);
            learner_failures.push("pattern_learner".to_string());
        }

        let weight_update_batch = batch.map(|samples| {
            if let Err(e) = lock_store(&self.weights, "weight learner").update_weights(&samples) {
                warn!("Weight learner update failed: {:#}", e);
                learner_failures.push("weight_learner".to_string());
            }
            samples.len()
        });

        debug!(
            "Feedback {} ingested (weight batch: {:?}, learner failures: {})",
            record.id,
            weight_update_batch,
            learner_failures.len()
        );
        Ok(FeedbackOutcome {
            record,
            weight_update_batch,
            learner_failures,
        })
    }

    pub fn report(&self) -> LearningStateReport {
        let (weights, training) = {
            let learner = lock_store(&self.weights, "weight learner");
            (learner.get_weights(), learner.training_stats())
        };
        let (calibration_curve, calibration) = {
            let calibrator = lock_store(&self.calibrator, "calibrator");
            (calibrator.get_calibration_curve(), calibrator.stats())
        };
        LearningStateReport {
            weights,
            training,
            calibration_curve,
            calibration,
            patterns: lock_store(&self.patterns, "pattern learner").stats(),
            feedback: lock_store(&self.feedback, "feedback store").stats(),
            corrupt_stores: self.corrupt_stores.clone(),
        }
    }

    /// Writes every store back to disk.
    pub fn flush(&self) -> Result<()> {
        lock_store(&self.feedback, "feedback store").persist()?;
        lock_store(&self.calibrator, "calibrator").persist()?;
        lock_store(&self.patterns, "pattern learner").persist()?;
        lock_store(&self.weights, "weight learner").persist()?;
        info!("Flushed learning context to {}", self.config.data_dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn context(dir: &tempfile::TempDir) -> LearningContext {
        LearningContext::load(LearningConfig::with_data_dir(dir.path()))
    }

    #[test]
    fn feedback_drives_calibrator_and_patterns() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        ctx.add_feedback(
            FeedbackSubmission::new("unit_price", "price", true).with_confidence(55.0),
        )
        .unwrap();
        ctx.add_feedback(
            FeedbackSubmission::new("foo", "bar", false).with_confidence(35.0),
        )
        .unwrap();

        let report = ctx.report();
        assert_eq!(report.feedback.total_feedback, 2);
        assert_eq!(report.calibration.total_samples, 2);
        assert_eq!(report.patterns.positive_patterns_count, 1);
        assert_eq!(report.patterns.negative_patterns_count, 1);
        assert_eq!(report.training.total_updates, 0);
    }

    #[test]
    fn weight_learner_runs_once_per_full_batch() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let mut batches = Vec::new();
        for i in 0..25 {
            let submission = if i % 2 == 0 {
                FeedbackSubmission::new("x", "y", false).with_features(0.2, 0.1, 0.0)
            } else {
                FeedbackSubmission::new("x", "z", true).with_features(0.8, 0.6, 0.9)
            };
            if let Some(size) = ctx.add_feedback(submission).unwrap().weight_update_batch {
                batches.push(size);
            }
        }
        assert_eq!(batches, vec![10, 10]);
        assert_eq!(ctx.weight_update_count(), 2);
        assert!((ctx.weights().sum() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn snapshot_is_isolated_from_later_feedback() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let before = ctx.snapshot();
        ctx.add_feedback(FeedbackSubmission::new("a", "b", false)).unwrap();
        assert_eq!(before.feedback.boost("a", "b"), 0.0);
        assert!(ctx.snapshot().feedback.boost("a", "b") < 0.0);
    }

    #[test]
    fn concurrent_submissions_are_all_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(context(&dir));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let ctx = Arc::clone(&ctx);
                std::thread::spawn(move || {
                    for i in 0..5 {
                        let col = format!("col_{t}_{i}");
                        ctx.add_feedback(FeedbackSubmission::new(col.clone(), col, true))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(ctx.feedback_count(), 20);
        assert_eq!(ctx.weight_update_count(), 2);

        let reloaded = context(&dir);
        assert_eq!(reloaded.feedback_count(), 20);
    }

    #[test]
    fn state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let ctx = context(&dir);
            ctx.add_feedback(FeedbackSubmission::new("zip", "zip_code", true)).unwrap();
            ctx.flush().unwrap();
        }
        let ctx = context(&dir);
        assert_eq!(ctx.get_suggested_match("zip").as_deref(), Some("zip_code"));
        assert_eq!(ctx.report().patterns.positive_patterns_count, 1);
    }
}
