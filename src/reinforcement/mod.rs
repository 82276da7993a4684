// src/reinforcement/mod.rs

// Module declarations
pub mod active_learner;
pub mod confidence_calibrator;
pub mod feedback_processor; // Public so callers can inspect stored records
pub mod learning_context;
mod orchestrator;
pub mod pattern_learner;
mod types;
pub mod weight_learner;

pub use active_learner::ActiveLearner;
pub use confidence_calibrator::ConfidenceCalibrator;
pub use feedback_processor::{FeedbackLookup, FeedbackStore};
pub use learning_context::{FeedbackOutcome, LearningContext, LearningSnapshot};
pub use orchestrator::MatchingOrchestrator;
pub use pattern_learner::PatternLearner;
pub use weight_learner::{AdaptiveWeightLearner, LearnerState};

// Core types used across the learning system
pub use types::{
    AntiPattern, CalibrationBin, CalibrationCurvePoint, CalibrationStats, Correction,
    FeedbackStats, LearningStateReport, LossTrend, PatternStats, TrainingHistoryEntry,
    TrainingSample, TrainingStats, WeightVector,
};
