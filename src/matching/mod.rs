// src/matching/mod.rs
//
// Per-pair feature extraction. Everything here is pure and reads only the
// column descriptors and their precomputed profiles.

pub mod data;
pub mod name;
pub mod pattern;
pub mod semantic;

pub use data::{data_similarity, profile_column, ColumnProfile};
pub use name::name_similarity;
pub use pattern::pattern_score;
pub use semantic::{SemanticLookup, SemanticScorer, StaticEmbeddings};

use serde::{Deserialize, Serialize};

use crate::models::{ColumnDescriptor, ColumnKind};

/// The independent similarity signals of one column pair, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub name_similarity: f64,
    pub data_similarity: f64,
    pub pattern_score: f64,
    pub semantic_score: Option<f64>,
}

impl FeatureVector {
    /// The three always-present signals, in name, data, pattern order.
    pub fn core(&self) -> [f64; 3] {
        [self.name_similarity, self.data_similarity, self.pattern_score]
    }
}

/// One column numeric and the other not.
pub fn is_type_mismatch(kind1: ColumnKind, kind2: ColumnKind) -> bool {
    kind1.is_numeric() != kind2.is_numeric()
}

pub fn extract_features(
    column1: &ColumnDescriptor,
    profile1: &ColumnProfile,
    column2: &ColumnDescriptor,
    profile2: &ColumnProfile,
    semantic: Option<&SemanticLookup>,
) -> FeatureVector {
    FeatureVector {
        name_similarity: name_similarity(&column1.name, &column2.name),
        data_similarity: data_similarity(profile1, profile2),
        pattern_score: pattern_score(&column1.name, &column2.name),
        semantic_score: semantic.and_then(|lookup| lookup.similarity(&column1.name, &column2.name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ColumnValues;

    #[test]
    fn extracts_all_core_signals() {
        let c1 = ColumnDescriptor::new("employee_id", ColumnKind::Numeric);
        let c2 = ColumnDescriptor::new("emp_id", ColumnKind::Numeric);
        let v1 = ColumnValues::Numeric(vec![Some(1.0), Some(2.0), Some(3.0)]);
        let v2 = ColumnValues::Numeric(vec![Some(10.0), Some(20.0), Some(30.0)]);
        let features = extract_features(
            &c1,
            &profile_column(c1.kind, &v1),
            &c2,
            &profile_column(c2.kind, &v2),
            None,
        );
        assert!((features.name_similarity - 0.8).abs() < 1e-9);
        assert!((features.data_similarity - 1.0).abs() < 1e-9);
        assert_eq!(features.pattern_score, 1.0);
        assert_eq!(features.semantic_score, None);
    }

    #[test]
    fn mismatch_is_numeric_versus_non_numeric() {
        assert!(is_type_mismatch(ColumnKind::Numeric, ColumnKind::Text));
        assert!(is_type_mismatch(ColumnKind::Datetime, ColumnKind::Numeric));
        assert!(!is_type_mismatch(ColumnKind::Text, ColumnKind::Datetime));
        assert!(!is_type_mismatch(ColumnKind::Numeric, ColumnKind::Numeric));
    }
}
