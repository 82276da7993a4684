// src/lib.rs
pub mod config;
pub mod correlation;
pub mod error;
pub mod matching;
pub mod models;
pub mod persistence;
pub mod reinforcement;
pub mod results;
pub mod utils;

// Re-export common types for easier access
pub use models::{
    CandidateMatch, ColumnDescriptor, ColumnKind, ColumnValues, Dataset, FeedbackRecord,
    FeedbackSubmission, MatchRequest,
};

// Re-export important functionality
pub use config::LearningConfig;
pub use error::{FeedbackError, MatchError};
pub use reinforcement::{LearningContext, MatchingOrchestrator};
