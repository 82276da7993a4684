// src/models.rs

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FeedbackError;

//------------------------------------------------------------------------------
// COLUMN DESCRIPTION
//------------------------------------------------------------------------------

/// Declared type of a column as reported by the dataset loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Text,
    Datetime,
    Unknown,
}

impl ColumnKind {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnKind::Numeric)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Numeric => "numeric",
            ColumnKind::Text => "text",
            ColumnKind::Datetime => "datetime",
            ColumnKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw values of one column. Missing cells are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "lowercase")]
pub enum ColumnValues {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Numeric(v) => v.len(),
            ColumnValues::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numeric reading of the column. Text cells that do not parse become
    /// missing, and non-finite numbers are treated as missing too.
    pub fn numeric_view(&self) -> Vec<Option<f64>> {
        match self {
            ColumnValues::Numeric(v) => v
                .iter()
                .map(|cell| cell.filter(|x| x.is_finite()))
                .collect(),
            ColumnValues::Text(v) => v
                .iter()
                .map(|cell| {
                    cell.as_deref()
                        .and_then(|s| s.trim().parse::<f64>().ok())
                        .filter(|x| x.is_finite())
                })
                .collect(),
        }
    }

    /// Textual reading of the column, used for value-set comparison.
    pub fn text_view(&self) -> Vec<Option<String>> {
        match self {
            ColumnValues::Numeric(v) => v.iter().map(|cell| cell.map(|x| x.to_string())).collect(),
            ColumnValues::Text(v) => v.clone(),
        }
    }
}

/// Supplies a column's raw values on demand.
pub trait ValueSource: Send + Sync {
    fn fetch(&self, column: &str) -> Result<ColumnValues>;
}

/// A `ValueSource` backed by values already held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryValues {
    columns: HashMap<String, ColumnValues>,
}

impl InMemoryValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, values: ColumnValues) {
        self.columns.insert(column.into(), values);
    }
}

impl ValueSource for InMemoryValues {
    fn fetch(&self, column: &str) -> Result<ColumnValues> {
        self.columns
            .get(column)
            .cloned()
            .ok_or_else(|| anyhow!("no values loaded for column '{}'", column))
    }
}

/// Name and declared kind of one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// One side of a matching request: the column set of a loaded file plus
/// access to its values. Immutable for the duration of an analysis run.
#[derive(Clone)]
pub struct Dataset {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub source: Arc<dyn ValueSource>,
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("name", &self.name)
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

impl Dataset {
    pub fn new(
        name: impl Into<String>,
        columns: Vec<ColumnDescriptor>,
        source: Arc<dyn ValueSource>,
    ) -> Self {
        Self {
            name: name.into(),
            columns,
            source,
        }
    }

    /// Builds a dataset whose values are held in memory.
    pub fn in_memory(
        name: impl Into<String>,
        columns: Vec<(String, ColumnKind, ColumnValues)>,
    ) -> Self {
        let mut values = InMemoryValues::new();
        let mut descriptors = Vec::with_capacity(columns.len());
        for (column, kind, column_values) in columns {
            descriptors.push(ColumnDescriptor::new(column.clone(), kind));
            values.insert(column, column_values);
        }
        Self::new(name, descriptors, Arc::new(values))
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// On-disk form of a dataset accepted by the `colmatch` binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetDocument {
    pub name: String,
    pub columns: Vec<ColumnDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDocument {
    pub name: String,
    pub kind: ColumnKind,
    pub values: ColumnValues,
}

impl From<DatasetDocument> for Dataset {
    fn from(doc: DatasetDocument) -> Self {
        Dataset::in_memory(
            doc.name,
            doc.columns
                .into_iter()
                .map(|c| (c.name, c.kind, c.values))
                .collect(),
        )
    }
}

//------------------------------------------------------------------------------
// MATCH REQUEST / CANDIDATE MATCH
//------------------------------------------------------------------------------

/// A caller-declared pairing that bypasses feature scoring
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomMapping {
    pub file1_column: String,
    pub file2_column: String,
}

#[derive(Debug, Clone)]
pub struct MatchRequest {
    pub dataset1: Dataset,
    pub dataset2: Dataset,
    /// Columns of dataset1 that take no part in matching
    pub exclusions1: HashSet<String>,
    /// Columns of dataset2 that take no part in matching
    pub exclusions2: HashSet<String>,
    pub custom_mappings: Vec<CustomMapping>,
    /// Maximum number of matches returned; `None` returns all accepted matches
    pub limit: Option<usize>,
}

impl MatchRequest {
    pub fn new(dataset1: Dataset, dataset2: Dataset) -> Self {
        Self {
            dataset1,
            dataset2,
            exclusions1: HashSet::new(),
            exclusions2: HashSet::new(),
            custom_mappings: Vec::new(),
            limit: None,
        }
    }

    pub fn exclude_file1(mut self, column: impl Into<String>) -> Self {
        self.exclusions1.insert(column.into());
        self
    }

    pub fn exclude_file2(mut self, column: impl Into<String>) -> Self {
        self.exclusions2.insert(column.into());
        self
    }

    pub fn with_custom_mapping(
        mut self,
        file1_column: impl Into<String>,
        file2_column: impl Into<String>,
    ) -> Self {
        self.custom_mappings.push(CustomMapping {
            file1_column: file1_column.into(),
            file2_column: file2_column.into(),
        });
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Which adjustments shaped a candidate's confidence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchProvenance {
    /// Pairing declared by the caller; no feature scoring took place
    pub custom_mapping: bool,
    /// Exact name match lifted the ensemble to the floor
    pub exact_name_floor: bool,
    /// One column numeric and the other not
    pub type_mismatch: bool,
    /// Semantic similarity took part in the ensemble
    pub semantic_used: bool,
    /// Learned adaptive weights (rather than defaults) were used
    pub learned_weights: bool,
    pub positive_pattern_boost: Option<f64>,
    pub negative_pattern_penalty: Option<f64>,
    pub feedback_boost: Option<f64>,
    /// Combined penalty reached the joint cap
    pub penalty_capped: bool,
    /// The calibrator moved the raw score
    pub calibrated: bool,
}

/// One scored (column, column) pairing between two datasets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMatch {
    pub file1_column: String,
    pub file2_column: String,
    pub name_similarity: f64,
    pub data_similarity: f64,
    pub pattern_score: f64,
    pub semantic_score: Option<f64>,
    /// Ensemble score after learned adjustments, clamped to [0, 100]
    pub raw_confidence: f64,
    /// Raw confidence after calibration, in [0, 100]
    pub confidence: f64,
    pub uncertainty: f64,
    pub reason: String,
    pub provenance: MatchProvenance,
}

//------------------------------------------------------------------------------
// FEEDBACK
//------------------------------------------------------------------------------

/// A user judgment as submitted, validated before it is stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSubmission {
    pub file1_column: String,
    pub file2_column: String,
    pub is_correct: bool,
    #[serde(default)]
    pub correct_match: Option<String>,
    #[serde(default)]
    pub user_note: Option<String>,
    #[serde(default)]
    pub name_similarity: f64,
    #[serde(default)]
    pub data_similarity: f64,
    #[serde(default)]
    pub pattern_score: f64,
    #[serde(default)]
    pub semantic_score: Option<f64>,
    /// Confidence shown to the user when the judgment was made
    #[serde(default)]
    pub confidence: f64,
}

impl FeedbackSubmission {
    pub fn new(
        file1_column: impl Into<String>,
        file2_column: impl Into<String>,
        is_correct: bool,
    ) -> Self {
        Self {
            file1_column: file1_column.into(),
            file2_column: file2_column.into(),
            is_correct,
            correct_match: None,
            user_note: None,
            name_similarity: 0.0,
            data_similarity: 0.0,
            pattern_score: 0.0,
            semantic_score: None,
            confidence: 0.0,
        }
    }

    /// Feedback on a match the orchestrator produced, carrying its features.
    pub fn from_match(candidate: &CandidateMatch, is_correct: bool) -> Self {
        Self {
            name_similarity: candidate.name_similarity,
            data_similarity: candidate.data_similarity,
            pattern_score: candidate.pattern_score,
            semantic_score: candidate.semantic_score,
            confidence: candidate.confidence,
            ..Self::new(
                candidate.file1_column.clone(),
                candidate.file2_column.clone(),
                is_correct,
            )
        }
    }

    pub fn with_features(mut self, name: f64, data: f64, pattern: f64) -> Self {
        self.name_similarity = name;
        self.data_similarity = data;
        self.pattern_score = pattern;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_correction(mut self, correct_match: impl Into<String>) -> Self {
        self.correct_match = Some(correct_match.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.user_note = Some(note.into());
        self
    }

    pub fn validate(&self) -> Result<(), FeedbackError> {
        if self.file1_column.trim().is_empty() || self.file2_column.trim().is_empty() {
            return Err(FeedbackError::InvalidFeedback(
                "both column names are required".to_string(),
            ));
        }
        let unit_features = [
            ("name_similarity", self.name_similarity),
            ("data_similarity", self.data_similarity),
            ("pattern_score", self.pattern_score),
        ];
        for (label, value) in unit_features {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(FeedbackError::InvalidFeedback(format!(
                    "{} must be within [0, 1], got {}",
                    label, value
                )));
            }
        }
        if let Some(semantic) = self.semantic_score {
            if !semantic.is_finite() || !(0.0..=1.0).contains(&semantic) {
                return Err(FeedbackError::InvalidFeedback(format!(
                    "semantic_score must be within [0, 1], got {}",
                    semantic
                )));
            }
        }
        if !self.confidence.is_finite() || !(0.0..=100.0).contains(&self.confidence) {
            return Err(FeedbackError::InvalidFeedback(format!(
                "confidence must be within [0, 100], got {}",
                self.confidence
            )));
        }
        if self.is_correct && self.correct_match.is_some() {
            return Err(FeedbackError::InvalidFeedback(
                "a correction can only accompany a match marked incorrect".to_string(),
            ));
        }
        Ok(())
    }
}

/// A stored user judgment. Append-only and immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: Uuid,
    pub file1_column: String,
    pub file2_column: String,
    pub is_correct: bool,
    pub correct_match: Option<String>,
    pub user_note: Option<String>,
    pub name_similarity: f64,
    pub data_similarity: f64,
    pub pattern_score: f64,
    pub semantic_score: Option<f64>,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

impl FeedbackRecord {
    pub fn from_submission(submission: FeedbackSubmission) -> Self {
        Self {
            id: Uuid::new_v4(),
            file1_column: submission.file1_column,
            file2_column: submission.file2_column,
            is_correct: submission.is_correct,
            correct_match: submission.correct_match,
            user_note: submission.user_note,
            name_similarity: submission.name_similarity,
            data_similarity: submission.data_similarity,
            pattern_score: submission.pattern_score,
            semantic_score: submission.semantic_score,
            confidence: submission.confidence,
            timestamp: Utc::now(),
        }
    }
}
