// src/correlation.rs
//
// Numeric correlation between matched columns, reported alongside match
// results. Only columns declared numeric on both sides take part.

use std::cmp::Ordering;
use std::fmt;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::MatchError;
use crate::matching::data::pearson_of_pairs;
use crate::models::{CandidateMatch, ColumnDescriptor, Dataset};

// Fewer aligned observations than this yield no correlation
pub const MIN_CORRELATION_SAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrelationStrength {
    Strong,
    Moderate,
    Weak,
    #[serde(rename = "Very Weak")]
    VeryWeak,
}

impl CorrelationStrength {
    pub fn classify(coefficient: f64) -> Self {
        let magnitude = if coefficient.is_finite() {
            coefficient.abs()
        } else {
            0.0
        };
        if magnitude >= 0.7 {
            CorrelationStrength::Strong
        } else if magnitude >= 0.4 {
            CorrelationStrength::Moderate
        } else if magnitude >= 0.2 {
            CorrelationStrength::Weak
        } else {
            CorrelationStrength::VeryWeak
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CorrelationStrength::Strong => "Strong",
            CorrelationStrength::Moderate => "Moderate",
            CorrelationStrength::Weak => "Weak",
            CorrelationStrength::VeryWeak => "Very Weak",
        }
    }
}

impl fmt::Display for CorrelationStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub file1_column: String,
    pub file2_column: String,
    pub pearson: f64,
    pub spearman: f64,
    pub sample_size: usize,
    pub strength: CorrelationStrength,
    /// Confidence of the match the correlation was computed for, if any
    pub match_confidence: Option<f64>,
}

/// Pearson and Spearman coefficients over the pairwise-complete rows of the
/// aligned prefix, with the number of rows used. `None` below
/// `MIN_CORRELATION_SAMPLES` rows. A side without variance scores 0.
pub fn correlate(x: &[Option<f64>], y: &[Option<f64>]) -> Option<(f64, f64, usize)> {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y.iter())
        .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
        .collect();
    if pairs.len() < MIN_CORRELATION_SAMPLES {
        return None;
    }
    let pearson = pearson_of_pairs(&pairs).unwrap_or(0.0);
    let spearman = spearman_of_pairs(&pairs).unwrap_or(0.0);
    Some((pearson, spearman, pairs.len()))
}

fn spearman_of_pairs(pairs: &[(f64, f64)]) -> Option<f64> {
    let xs: Vec<f64> = pairs.iter().map(|p| p.0).collect();
    let ys: Vec<f64> = pairs.iter().map(|p| p.1).collect();
    let ranked: Vec<(f64, f64)> = average_ranks(&xs)
        .into_iter()
        .zip(average_ranks(&ys))
        .collect();
    pearson_of_pairs(&ranked)
}

/// 1-based ranks; tied values share the mean of the ranks they span.
fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && values[order[end + 1]] == values[order[start]] {
            end += 1;
        }
        let shared = (start + end) as f64 / 2.0 + 1.0;
        for &index in &order[start..=end] {
            ranks[index] = shared;
        }
        start = end + 1;
    }
    ranks
}

fn numeric_column<'d>(dataset: &'d Dataset, column: &str) -> Result<&'d ColumnDescriptor, MatchError> {
    let descriptor = dataset
        .column(column)
        .ok_or_else(|| MatchError::UnknownColumn {
            dataset: dataset.name.clone(),
            column: column.to_string(),
        })?;
    if !descriptor.kind.is_numeric() {
        return Err(MatchError::NonNumericColumn {
            dataset: dataset.name.clone(),
            column: column.to_string(),
        });
    }
    Ok(descriptor)
}

fn fetch_numeric(dataset: &Dataset, column: &str) -> Result<Vec<Option<f64>>, MatchError> {
    dataset
        .source
        .fetch(column)
        .map(|values| values.numeric_view())
        .map_err(|source| MatchError::ValueFetch {
            dataset: dataset.name.clone(),
            column: column.to_string(),
            source,
        })
}

/// Correlation of one explicitly requested column pair. Both columns must
/// exist and be numeric.
pub fn correlate_columns(
    dataset1: &Dataset,
    column1: &str,
    dataset2: &Dataset,
    column2: &str,
) -> Result<Option<CorrelationResult>, MatchError> {
    numeric_column(dataset1, column1)?;
    numeric_column(dataset2, column2)?;
    let x = fetch_numeric(dataset1, column1)?;
    let y = fetch_numeric(dataset2, column2)?;

    Ok(correlate(&x, &y).map(|(pearson, spearman, sample_size)| CorrelationResult {
        file1_column: column1.to_string(),
        file2_column: column2.to_string(),
        pearson,
        spearman,
        sample_size,
        strength: CorrelationStrength::classify(pearson),
        match_confidence: None,
    }))
}

/// Correlations for every match between two numeric columns, strongest
/// |Pearson| first. Matches involving non-numeric columns are skipped.
pub fn calculate_correlations(
    dataset1: &Dataset,
    dataset2: &Dataset,
    matches: &[CandidateMatch],
) -> Result<Vec<CorrelationResult>, MatchError> {
    let mut results = Vec::new();
    for m in matches {
        let numeric_pair = matches!(
            (dataset1.column(&m.file1_column), dataset2.column(&m.file2_column)),
            (Some(c1), Some(c2)) if c1.kind.is_numeric() && c2.kind.is_numeric()
        );
        if !numeric_pair {
            debug!(
                "Skipping correlation for {} <-> {}: not a numeric pair",
                m.file1_column, m.file2_column
            );
            continue;
        }
        if let Some(mut result) =
            correlate_columns(dataset1, &m.file1_column, dataset2, &m.file2_column)?
        {
            result.match_confidence = Some(m.confidence);
            results.push(result);
        }
    }

    results.sort_by(|a, b| b.pearson.abs().total_cmp(&a.pearson.abs()));
    info!("Computed {} correlations over {} matches", results.len(), matches.len());
    Ok(results)
}
