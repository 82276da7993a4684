// src/reinforcement/weight_learner.rs
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::types::{LossTrend, TrainingHistoryEntry, TrainingSample, TrainingStats, WeightVector};
use crate::config::{LearningConfig, LOSS_WINDOW, PROBABILITY_EPSILON};
use crate::persistence::{load_or_default, save_atomic, LoadStatus};
use crate::utils::{finite_or_zero, mean};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearnerState {
    /// Default weights in use; no batch has been learned yet
    #[default]
    Untrained,
    Trained,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WeightsDocument {
    #[serde(default)]
    state: LearnerState,
    #[serde(default)]
    weights: WeightVector,
    #[serde(default)]
    update_count: u64,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    training_history: Vec<TrainingHistoryEntry>,
}

/// Learns the ensemble weights from labelled feedback with batch gradient
/// descent on binary cross-entropy.
#[derive(Debug, Clone)]
pub struct AdaptiveWeightLearner {
    path: PathBuf,
    learning_rate: f64,
    history_limit: usize,
    doc: WeightsDocument,
}

impl AdaptiveWeightLearner {
    /// Untrained learner persisting to `path`; nothing is read from disk.
    pub fn new(path: impl Into<PathBuf>, learning_rate: f64, history_limit: usize) -> Self {
        Self {
            path: path.into(),
            learning_rate,
            history_limit,
            doc: WeightsDocument::default(),
        }
    }

    /// Loads persisted weights, falling back to defaults when the document is
    /// missing, corrupt, or holds weights that violate the sum-to-one rule.
    pub fn load(config: &LearningConfig) -> Self {
        Self::load_with_status(config).0
    }

    /// Like `load`, also reporting how the persisted document was obtained.
    pub fn load_with_status(config: &LearningConfig) -> (Self, LoadStatus) {
        let path = config.weights_path();
        let (mut doc, mut status): (WeightsDocument, _) =
            load_or_default(&path, "adaptive weights");
        if !weights_are_valid(&doc.weights) {
            warn!(
                "Persisted weights {:?} are invalid. Falling back to defaults.",
                doc.weights
            );
            doc = WeightsDocument::default();
            status = LoadStatus::Corrupt;
        }
        info!(
            "Adaptive weight learner ready ({:?}, {} updates): {:?}",
            doc.state, doc.update_count, doc.weights
        );
        let learner = Self {
            path,
            learning_rate: config.learning_rate,
            history_limit: config.training_history_limit,
            doc,
        };
        (learner, status)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> LearnerState {
        self.doc.state
    }

    pub fn is_trained(&self) -> bool {
        self.doc.state == LearnerState::Trained
    }

    pub fn get_weights(&self) -> WeightVector {
        self.doc.weights
    }

    pub fn update_count(&self) -> u64 {
        self.doc.update_count
    }

    pub fn history(&self) -> &[TrainingHistoryEntry] {
        &self.doc.training_history
    }

    /// One gradient step over `batch`, then persist. An empty batch is a no-op.
    /// A step that would leave no positive weight is rejected: the previous
    /// weights stay in place, but the attempt is still recorded in history.
    pub fn update_weights(&mut self, batch: &[TrainingSample]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let current = self.doc.weights;
        let mut gradients = [0.0f64; 3];
        let mut total_loss = 0.0;

        for sample in batch {
            let features = sample.features().map(finite_or_zero);
            let predicted = current
                .combine(features)
                .clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON);
            let actual = if sample.is_correct { 1.0 } else { 0.0 };

            total_loss += -(actual * predicted.ln() + (1.0 - actual) * (1.0 - predicted).ln());

            let grad_pred = -actual / predicted + (1.0 - actual) / (1.0 - predicted);
            for (g, f) in gradients.iter_mut().zip(features.iter()) {
                *g += grad_pred * f;
            }
        }

        let n = batch.len() as f64;
        let mut stepped = current.as_array();
        for (w, g) in stepped.iter_mut().zip(gradients.iter()) {
            *w = (*w - self.learning_rate * (g / n)).max(0.0);
        }

        let total: f64 = stepped.iter().sum();
        let applied = total > 0.0 && total.is_finite();
        if applied {
            self.doc.weights = WeightVector::from_array(stepped.map(|w| w / total));
            self.doc.state = LearnerState::Trained;
        } else {
            warn!(
                "Weight update would leave no positive weight (sum {}). Keeping {:?}.",
                total, current
            );
        }

        let avg_loss = total_loss / n;
        let now = Utc::now();
        self.doc.update_count += 1;
        self.doc.last_updated = Some(now);
        self.doc.training_history.push(TrainingHistoryEntry {
            timestamp: now,
            loss: avg_loss,
            weights: self.doc.weights,
            batch_size: batch.len(),
            applied,
        });
        self.prune_history();

        info!(
            "Weights updated from batch of {}: {:?} (avg loss {:.4})",
            batch.len(),
            self.doc.weights,
            avg_loss
        );
        self.persist()
    }

    fn prune_history(&mut self) {
        let len = self.doc.training_history.len();
        if len > self.history_limit {
            self.doc.training_history.drain(..len - self.history_limit);
        }
    }

    pub fn persist(&self) -> Result<()> {
        save_atomic(&self.path, &self.doc)?;
        debug!("Saved adaptive weights to {}", self.path.display());
        Ok(())
    }

    pub fn training_stats(&self) -> TrainingStats {
        let history = &self.doc.training_history;
        let window_start = history.len().saturating_sub(LOSS_WINDOW);
        let recent: Vec<f64> = history[window_start..].iter().map(|h| h.loss).collect();

        let loss_trend = if recent.is_empty() {
            None
        } else if recent.len() > 1 && recent[recent.len() - 1] < recent[0] {
            Some(LossTrend::Improving)
        } else {
            Some(LossTrend::Stable)
        };

        TrainingStats {
            total_updates: self.doc.update_count,
            trained: self.is_trained(),
            current_weights: self.doc.weights,
            avg_loss: mean(&recent),
            loss_trend,
            last_updated: self.doc.last_updated,
        }
    }
}

fn weights_are_valid(weights: &WeightVector) -> bool {
    weights
        .as_array()
        .iter()
        .all(|w| w.is_finite() && *w >= 0.0)
        && (weights.sum() - 1.0).abs() < WEIGHT_SUM_TOLERANCE
}
