// src/reinforcement/types.rs
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_DATA_WEIGHT, DEFAULT_NAME_WEIGHT, DEFAULT_PATTERN_WEIGHT};

//------------------------------------------------------------------------------
// ENSEMBLE WEIGHTS
//------------------------------------------------------------------------------

/// Ensemble weights over the three core signals. Non-negative, summing to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    pub name: f64,
    pub data: f64,
    pub pattern: f64,
}

impl Default for WeightVector {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME_WEIGHT,
            data: DEFAULT_DATA_WEIGHT,
            pattern: DEFAULT_PATTERN_WEIGHT,
        }
    }
}

impl WeightVector {
    pub fn sum(&self) -> f64 {
        self.name + self.data + self.pattern
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.name, self.data, self.pattern]
    }

    pub fn from_array(values: [f64; 3]) -> Self {
        Self {
            name: values[0],
            data: values[1],
            pattern: values[2],
        }
    }

    /// Weighted sum of (name, data, pattern) features, in [0, 1] for valid inputs.
    pub fn combine(&self, features: [f64; 3]) -> f64 {
        self.as_array()
            .iter()
            .zip(features.iter())
            .map(|(w, f)| w * f)
            .sum()
    }
}

/// Features and label of one judged match, as consumed by the weight learner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub name_similarity: f64,
    pub data_similarity: f64,
    pub pattern_score: f64,
    pub is_correct: bool,
}

impl TrainingSample {
    pub fn features(&self) -> [f64; 3] {
        [self.name_similarity, self.data_similarity, self.pattern_score]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub loss: f64,
    pub weights: WeightVector,
    pub batch_size: usize,
    /// False when the step was rejected and the previous weights were kept
    #[serde(default = "default_true")]
    pub applied: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossTrend {
    Improving,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingStats {
    pub total_updates: u64,
    pub trained: bool,
    pub current_weights: WeightVector,
    /// Mean of the most recent losses, `None` before the first update
    pub avg_loss: Option<f64>,
    pub loss_trend: Option<LossTrend>,
    pub last_updated: Option<DateTime<Utc>>,
}

//------------------------------------------------------------------------------
// CALIBRATION
//------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBin {
    pub correct: u32,
    pub total: u32,
    /// correct / total whenever total > 0
    pub accuracy: f64,
}

impl CalibrationBin {
    pub fn record(&mut self, correct: bool) {
        self.total += 1;
        if correct {
            self.correct += 1;
        }
        self.accuracy = self.correct as f64 / self.total as f64;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationCurvePoint {
    /// e.g. "50-60%"
    pub predicted_range: String,
    /// Observed accuracy on a 0-100 scale
    pub actual_accuracy: f64,
    pub sample_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationStats {
    pub total_samples: u64,
    pub mean_calibration_error: f64,
    pub calibrated_bins: usize,
}

//------------------------------------------------------------------------------
// PATTERNS
//------------------------------------------------------------------------------

/// Feature signature of a rejected match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntiPattern {
    pub col1_tokens: BTreeSet<String>,
    pub col2_tokens: BTreeSet<String>,
    /// Lower edge of the 10-point bucket holding name similarity * 100
    pub name_sim_range: u32,
    pub data_sim_range: u32,
    pub length_ratio: f64,
    pub has_common_prefix: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternDocument {
    #[serde(default)]
    pub positive_patterns: BTreeMap<String, u64>,
    #[serde(default)]
    pub negative_patterns: VecDeque<AntiPattern>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternStats {
    pub positive_patterns_count: usize,
    pub negative_patterns_count: usize,
    pub top_positive_patterns: Vec<(String, u64)>,
}

//------------------------------------------------------------------------------
// FEEDBACK
//------------------------------------------------------------------------------

/// A recorded correction: the pair was wrong and `correct` was the right partner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    pub suggested: String,
    pub correct: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackStats {
    pub total_feedback: usize,
    pub correct_matches: usize,
    pub incorrect_matches: usize,
    /// Percentage of judgments marked correct, 0 when there are none
    pub accuracy: f64,
    pub total_corrections: usize,
}

/// Everything the learning system knows, bundled for inspection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningStateReport {
    pub weights: WeightVector,
    pub training: TrainingStats,
    pub calibration_curve: Vec<CalibrationCurvePoint>,
    pub calibration: CalibrationStats,
    pub patterns: PatternStats,
    pub feedback: FeedbackStats,
    /// Stores that fell back to defaults because their document was unreadable
    #[serde(default)]
    pub corrupt_stores: Vec<String>,
}
