// src/reinforcement/feedback_processor.rs
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::types::{Correction, FeedbackStats, TrainingSample};
use crate::config::{
    LearningConfig, CONFIRMED_PAIR_BOOST, CORRECTED_PAIR_PENALTY, REJECTED_PAIR_PENALTY,
    WRONG_SUGGESTION_PENALTY,
};
use crate::error::FeedbackError;
use crate::models::{FeedbackRecord, FeedbackSubmission};
use crate::persistence::{load_or_default, save_atomic, LoadStatus};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FeedbackDocument {
    #[serde(default)]
    matches: Vec<FeedbackRecord>,
    /// Keyed by "file1_column|file2_column"
    #[serde(default)]
    corrections: BTreeMap<String, Correction>,
}

fn pair_key(file1_column: &str, file2_column: &str) -> String {
    format!("{}|{}", file1_column, file2_column)
}

/// What past judgments say about column pairs, derived from the feedback log.
/// Cheap to clone into a matching snapshot.
#[derive(Debug, Clone, Default)]
pub struct FeedbackLookup {
    /// Latest verdict per identical pair
    verdicts: HashMap<(String, String), bool>,
    corrected_pairs: HashSet<(String, String)>,
    /// file2 columns once proposed and then corrected away from
    wrong_suggestions: HashSet<String>,
    confirmed_partner: HashMap<String, String>,
    correction_target: HashMap<String, String>,
}

impl FeedbackLookup {
    fn observe(&mut self, record: &FeedbackRecord) {
        let pair = (record.file1_column.clone(), record.file2_column.clone());
        self.verdicts.insert(pair.clone(), record.is_correct);
        if record.is_correct {
            self.confirmed_partner
                .insert(record.file1_column.clone(), record.file2_column.clone());
        } else if let Some(correct) = &record.correct_match {
            self.corrected_pairs.insert(pair);
            self.wrong_suggestions.insert(record.file2_column.clone());
            self.correction_target
                .insert(record.file1_column.clone(), correct.clone());
        }
    }

    /// Historical adjustment for a pair as a fraction of 100 confidence
    /// points: +0.20 if the pair was last confirmed, -0.30 if last rejected,
    /// -0.25 if it was corrected, -0.15 if `file2_column` was once suggested
    /// wrongly for any column, else 0.
    pub fn boost(&self, file1_column: &str, file2_column: &str) -> f64 {
        let pair = (file1_column.to_string(), file2_column.to_string());
        match self.verdicts.get(&pair) {
            Some(true) => return CONFIRMED_PAIR_BOOST,
            Some(false) => return REJECTED_PAIR_PENALTY,
            None => {}
        }
        if self.corrected_pairs.contains(&pair) {
            return CORRECTED_PAIR_PENALTY;
        }
        if self.wrong_suggestions.contains(file2_column) {
            return WRONG_SUGGESTION_PENALTY;
        }
        0.0
    }

    /// Latest confirmed partner of `file1_column`, else its latest correction.
    pub fn suggested_match(&self, file1_column: &str) -> Option<&str> {
        self.confirmed_partner
            .get(file1_column)
            .or_else(|| self.correction_target.get(file1_column))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.verdicts.is_empty()
    }
}

/// Append-only log of user judgments plus the corrections index.
#[derive(Debug, Clone)]
pub struct FeedbackStore {
    path: PathBuf,
    doc: FeedbackDocument,
    lookup: FeedbackLookup,
}

impl FeedbackStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            doc: FeedbackDocument::default(),
            lookup: FeedbackLookup::default(),
        }
    }

    pub fn load(config: &LearningConfig) -> Self {
        Self::load_with_status(config).0
    }

    /// Like `load`, also reporting how the persisted document was obtained.
    pub fn load_with_status(config: &LearningConfig) -> (Self, LoadStatus) {
        let path = config.feedback_path();
        let (doc, status): (FeedbackDocument, _) = load_or_default(&path, "matching feedback");
        let mut lookup = FeedbackLookup::default();
        // the corrections index may outlive the records it came from
        for (key, correction) in &doc.corrections {
            if let Some((file1, file2)) = key.split_once('|') {
                lookup
                    .corrected_pairs
                    .insert((file1.to_string(), file2.to_string()));
                lookup
                    .correction_target
                    .insert(file1.to_string(), correction.correct.clone());
            }
            lookup.wrong_suggestions.insert(correction.suggested.clone());
        }
        for record in &doc.matches {
            lookup.observe(record);
        }
        info!(
            "Feedback store ready with {} records and {} corrections",
            doc.matches.len(),
            doc.corrections.len()
        );
        (Self { path, doc, lookup }, status)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.doc.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc.matches.is_empty()
    }

    pub fn records(&self) -> &[FeedbackRecord] {
        &self.doc.matches
    }

    pub fn corrections(&self) -> &BTreeMap<String, Correction> {
        &self.doc.corrections
    }

    pub fn lookup(&self) -> &FeedbackLookup {
        &self.lookup
    }

    /// Validates, appends and persists one judgment. If the write fails the
    /// in-memory log is left as it was and the error is returned.
    pub fn add_feedback(
        &mut self,
        submission: FeedbackSubmission,
    ) -> Result<FeedbackRecord, FeedbackError> {
        submission.validate()?;
        let record = FeedbackRecord::from_submission(submission);

        let correction_key = match (&record.correct_match, record.is_correct) {
            (Some(_), false) => Some(pair_key(&record.file1_column, &record.file2_column)),
            _ => None,
        };
        let previous_correction = correction_key
            .as_ref()
            .and_then(|key| self.doc.corrections.get(key).cloned());

        self.doc.matches.push(record.clone());
        if let (Some(key), Some(correct)) = (&correction_key, &record.correct_match) {
            let count = previous_correction.as_ref().map_or(0, |c| c.count) + 1;
            self.doc.corrections.insert(
                key.clone(),
                Correction {
                    suggested: record.file2_column.clone(),
                    correct: correct.clone(),
                    count,
                },
            );
        }

        if let Err(e) = self.persist() {
            self.doc.matches.pop();
            if let Some(key) = correction_key {
                match previous_correction {
                    Some(previous) => {
                        self.doc.corrections.insert(key, previous);
                    }
                    None => {
                        self.doc.corrections.remove(&key);
                    }
                }
            }
            return Err(FeedbackError::Persistence(e));
        }

        self.lookup.observe(&record);
        debug!(
            "Stored feedback {} for {} <-> {} (correct: {})",
            record.id, record.file1_column, record.file2_column, record.is_correct
        );
        Ok(record)
    }

    pub fn persist(&self) -> Result<()> {
        save_atomic(&self.path, &self.doc)
    }

    pub fn get_learned_boost(&self, file1_column: &str, file2_column: &str) -> f64 {
        self.lookup.boost(file1_column, file2_column)
    }

    pub fn get_suggested_match(&self, file1_column: &str) -> Option<String> {
        self.lookup.suggested_match(file1_column).map(str::to_string)
    }

    /// The last `n` judgments as weight-learner samples, oldest first.
    pub fn recent_samples(&self, n: usize) -> Vec<TrainingSample> {
        let start = self.doc.matches.len().saturating_sub(n);
        self.doc.matches[start..]
            .iter()
            .map(|r| TrainingSample {
                name_similarity: r.name_similarity,
                data_similarity: r.data_similarity,
                pattern_score: r.pattern_score,
                is_correct: r.is_correct,
            })
            .collect()
    }

    pub fn stats(&self) -> FeedbackStats {
        let total = self.doc.matches.len();
        let correct = self.doc.matches.iter().filter(|m| m.is_correct).count();
        FeedbackStats {
            total_feedback: total,
            correct_matches: correct,
            incorrect_matches: total - correct,
            accuracy: if total > 0 {
                correct as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            total_corrections: self.doc.corrections.len(),
        }
    }
}
