// src/config.rs
use log::{debug, warn};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// Default ensemble weights used until the weight learner has been trained
pub const DEFAULT_NAME_WEIGHT: f64 = 0.45;
pub const DEFAULT_DATA_WEIGHT: f64 = 0.35;
pub const DEFAULT_PATTERN_WEIGHT: f64 = 0.20;

// Share of the ensemble given to the semantic signal when it is available
pub const DEFAULT_SEMANTIC_WEIGHT: f64 = 0.25;

// Acceptance thresholds for candidate matches
pub const MIN_MATCH_CONFIDENCE: f64 = 20.0;
pub const MIN_NAME_OR_PATTERN_SIGNAL: f64 = 0.3;

// Score shaping
pub const EXACT_NAME_FLOOR: f64 = 0.95;
pub const TYPE_MISMATCH_FACTOR: f64 = 0.5;
pub const CUSTOM_MAPPING_CONFIDENCE: f64 = 95.0;

// Learned-pattern adjustments, in confidence points
pub const POSITIVE_PATTERN_BOOST_SCALE: f64 = 10.0;
pub const NEGATIVE_PATTERN_PENALTY_SCALE: f64 = 100.0;
pub const MAX_COMBINED_PENALTY: f64 = 50.0;

// Historical feedback adjustments (fractions of 100 confidence points)
pub const CONFIRMED_PAIR_BOOST: f64 = 0.20;
pub const REJECTED_PAIR_PENALTY: f64 = -0.30;
pub const CORRECTED_PAIR_PENALTY: f64 = -0.25;
pub const WRONG_SUGGESTION_PENALTY: f64 = -0.15;

// Calibration
pub const CALIBRATION_BIN_WIDTH: u32 = 10;
pub const DEFAULT_CALIBRATION_MIN_SAMPLES: u32 = 5;
pub const MAX_CALIBRATION_BLEND: f64 = 0.7;
pub const CALIBRATION_SAMPLES_FOR_FULL_BLEND: f64 = 50.0;

// Weight learning
pub const DEFAULT_LEARNING_RATE: f64 = 0.01;
pub const DEFAULT_FEEDBACK_BATCH_SIZE: usize = 10;
pub const TRAINING_HISTORY_LIMIT: usize = 100;
pub const LOSS_WINDOW: usize = 10;
pub const PROBABILITY_EPSILON: f64 = 1e-7;

// Pattern learning
pub const MAX_NEGATIVE_PATTERNS: usize = 100;
pub const MIN_PATTERN_TOKEN_LENGTH: usize = 3;
pub const MAX_NEGATIVE_PENALTY: f64 = 0.5;
pub const NEGATIVE_PENALTY_PER_MATCH: f64 = 0.1;
pub const ANTI_PATTERN_TOKEN_OVERLAP: f64 = 0.5;
pub const TOP_PATTERNS_REPORTED: usize = 10;

// Active learning
pub const DEFAULT_FEEDBACK_UNCERTAINTY_THRESHOLD: f64 = 0.6;
pub const DEFAULT_FEEDBACK_PRIORITY_COUNT: usize = 5;

// Text-column comparison is limited to this many unique values per column
pub const MAX_UNIQUE_VALUES_SAMPLED: usize = 100;

// Best-effort semantic lookups must answer within this window
pub const DEFAULT_SEMANTIC_TIMEOUT_MS: u64 = 1500;

pub const DEFAULT_DATA_DIR: &str = "data";

/// Runtime settings for the learning stores and the matching pass.
#[derive(Debug, Clone)]
pub struct LearningConfig {
    pub data_dir: PathBuf,
    pub learning_rate: f64,
    pub feedback_batch_size: usize,
    pub calibration_min_samples: u32,
    pub semantic_weight: f64,
    pub semantic_timeout: Duration,
    pub training_history_limit: usize,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            learning_rate: DEFAULT_LEARNING_RATE,
            feedback_batch_size: DEFAULT_FEEDBACK_BATCH_SIZE,
            calibration_min_samples: DEFAULT_CALIBRATION_MIN_SAMPLES,
            semantic_weight: DEFAULT_SEMANTIC_WEIGHT,
            semantic_timeout: Duration::from_millis(DEFAULT_SEMANTIC_TIMEOUT_MS),
            training_history_limit: TRAINING_HISTORY_LIMIT,
        }
    }
}

impl LearningConfig {
    /// Same defaults, rooted at another data directory.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Reads `COLMATCH_*` environment variables over the defaults.
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("COLMATCH_DATA_DIR") {
            if !dir.trim().is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }
        if let Some(rate) = env_parse::<f64>("COLMATCH_LEARNING_RATE") {
            if rate > 0.0 && rate.is_finite() {
                config.learning_rate = rate;
            } else {
                warn!("Ignoring non-positive COLMATCH_LEARNING_RATE={}", rate);
            }
        }
        if let Some(batch) = env_parse::<usize>("COLMATCH_FEEDBACK_BATCH_SIZE") {
            if batch > 0 {
                config.feedback_batch_size = batch;
            } else {
                warn!("Ignoring COLMATCH_FEEDBACK_BATCH_SIZE=0");
            }
        }
        if let Some(min_samples) = env_parse::<u32>("COLMATCH_CALIBRATION_MIN_SAMPLES") {
            config.calibration_min_samples = min_samples;
        }
        if let Some(weight) = env_parse::<f64>("COLMATCH_SEMANTIC_WEIGHT") {
            if (0.0..1.0).contains(&weight) {
                config.semantic_weight = weight;
            } else {
                warn!("COLMATCH_SEMANTIC_WEIGHT must be in [0, 1), got {}", weight);
            }
        }
        if let Some(ms) = env_parse::<u64>("COLMATCH_SEMANTIC_TIMEOUT_MS") {
            config.semantic_timeout = Duration::from_millis(ms);
        }
        if let Some(limit) = env_parse::<usize>("COLMATCH_TRAINING_HISTORY_LIMIT") {
            config.training_history_limit = limit.max(1);
        }

        debug!("Resolved learning config: {:?}", config);
        config
    }

    pub fn weights_path(&self) -> PathBuf {
        self.data_dir.join("adaptive_weights.json")
    }

    pub fn calibration_path(&self) -> PathBuf {
        self.data_dir.join("confidence_calibration.json")
    }

    pub fn patterns_path(&self) -> PathBuf {
        self.data_dir.join("learned_patterns.json")
    }

    pub fn feedback_path(&self) -> PathBuf {
        self.data_dir.join("matching_feedback.json")
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Could not parse environment variable {}='{}'", key, raw);
            None
        }
    }
}
