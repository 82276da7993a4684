// src/matching/data.rs

use std::collections::HashSet;

use crate::config::MAX_UNIQUE_VALUES_SAMPLED;
use crate::models::{ColumnKind, ColumnValues};
use crate::utils::{clamp_unit, finite_or_zero, is_constant, mean};

const CV_WEIGHT: f64 = 0.6;
const SKEW_WEIGHT: f64 = 0.4;
const DIFF_EPSILON: f64 = 1e-9;

/// Statistics of a numeric column, computed once per analysis run
#[derive(Debug, Clone, PartialEq)]
pub struct NumericProfile {
    /// Cells in original order; missing and non-finite cells are `None`
    pub values: Vec<Option<f64>>,
    pub observed: usize,
    /// Every observed value is identical (or fewer than two were observed)
    pub is_constant: bool,
    /// Coefficient of variation (sample std / mean), 0 when the mean is 0
    pub coefficient_of_variation: f64,
    /// Adjusted Fisher-Pearson skewness, 0 when undefined
    pub skewness: f64,
}

/// What the data-similarity signal needs to know about one column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnProfile {
    Numeric(NumericProfile),
    /// First unique non-missing values, capped for cost
    Textual(HashSet<String>),
}

impl ColumnProfile {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnProfile::Numeric(_))
    }
}

pub fn profile_column(kind: ColumnKind, values: &ColumnValues) -> ColumnProfile {
    if kind.is_numeric() {
        ColumnProfile::Numeric(numeric_profile(values.numeric_view()))
    } else {
        ColumnProfile::Textual(sample_uniques(values.text_view(), MAX_UNIQUE_VALUES_SAMPLED))
    }
}

fn numeric_profile(values: Vec<Option<f64>>) -> NumericProfile {
    let observed: Vec<f64> = values.iter().flatten().copied().collect();
    if is_constant(&observed) {
        return NumericProfile {
            observed: observed.len(),
            is_constant: true,
            coefficient_of_variation: 0.0,
            skewness: 0.0,
            values,
        };
    }
    NumericProfile {
        observed: observed.len(),
        is_constant: false,
        coefficient_of_variation: coefficient_of_variation(&observed),
        skewness: skewness(&observed),
        values,
    }
}

fn sample_uniques(values: Vec<Option<String>>, cap: usize) -> HashSet<String> {
    let mut uniques = HashSet::new();
    for value in values.into_iter().flatten() {
        if uniques.len() >= cap {
            break;
        }
        uniques.insert(value);
    }
    uniques
}

/// Content similarity of two columns in [0, 1]. Numeric pairs use the
/// Pearson magnitude when lengths align, otherwise distribution shape;
/// textual pairs use Jaccard over sampled unique values; mixed pairs and
/// constant numeric columns score 0.
pub fn data_similarity(profile1: &ColumnProfile, profile2: &ColumnProfile) -> f64 {
    match (profile1, profile2) {
        (ColumnProfile::Numeric(a), ColumnProfile::Numeric(b)) => {
            if a.is_constant || b.is_constant {
                return 0.0;
            }
            if a.values.len() == b.values.len() {
                pearson_correlation(&a.values, &b.values)
                    .map(|r| clamp_unit(r.abs()))
                    .unwrap_or(0.0)
            } else {
                distribution_similarity(a, b)
            }
        }
        (ColumnProfile::Textual(a), ColumnProfile::Textual(b)) => jaccard(a, b),
        _ => 0.0,
    }
}

/// Convenience form working straight from declared kinds and raw values.
pub fn column_data_similarity(
    kind1: ColumnKind,
    values1: &ColumnValues,
    kind2: ColumnKind,
    values2: &ColumnValues,
) -> f64 {
    data_similarity(&profile_column(kind1, values1), &profile_column(kind2, values2))
}

/// Pearson correlation over pairwise-complete observations.
/// `None` when fewer than two pairs remain or either side has no variance.
pub fn pearson_correlation(x: &[Option<f64>], y: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y.iter())
        .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
        .collect();
    pearson_of_pairs(&pairs)
}

pub(crate) fn pearson_of_pairs(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }
    let xs: Vec<f64> = pairs.iter().map(|p| p.0).collect();
    let ys: Vec<f64> = pairs.iter().map(|p| p.1).collect();
    if is_constant(&xs) || is_constant(&ys) {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    let r = cov / (var_x.sqrt() * var_y.sqrt());
    r.is_finite().then_some(r.clamp(-1.0, 1.0))
}

/// Shape similarity of two numeric distributions: 0.6 from coefficient of
/// variation, 0.4 from skewness, each as `max(0, 1 - normalized difference)`.
pub fn distribution_similarity(a: &NumericProfile, b: &NumericProfile) -> f64 {
    if a.observed < 2 || b.observed < 2 {
        return 0.0;
    }
    let cv_sim = shape_similarity(a.coefficient_of_variation, b.coefficient_of_variation);
    let skew_sim = shape_similarity(a.skewness, b.skewness);
    clamp_unit(CV_WEIGHT * cv_sim + SKEW_WEIGHT * skew_sim)
}

fn shape_similarity(s1: f64, s2: f64) -> f64 {
    let diff = (s1 - s2).abs() / (s1.abs().max(s2.abs()) + DIFF_EPSILON);
    finite_or_zero((1.0 - diff).max(0.0))
}

fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss = values.iter().map(|v| (v - m).powi(2)).sum::<f64>();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

fn coefficient_of_variation(values: &[f64]) -> f64 {
    match (mean(values), sample_std(values)) {
        (Some(m), Some(sd)) if m != 0.0 => finite_or_zero(sd / m),
        _ => 0.0,
    }
}

fn skewness(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 3 {
        return 0.0;
    }
    let Some(m) = mean(values) else {
        return 0.0;
    };
    let nf = n as f64;
    let m2 = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / nf;
    let m3 = values.iter().map(|v| (v - m).powi(3)).sum::<f64>() / nf;
    if m2 == 0.0 {
        return 0.0;
    }
    let g1 = m3 / m2.powf(1.5);
    finite_or_zero(g1 * (nf * (nf - 1.0)).sqrt() / (nf - 2.0))
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}
