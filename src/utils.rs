// src/utils.rs

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

// Separators that split a column name into word tokens
static NAME_SEPARATORS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[_\-\s.]+").expect("separator pattern is a valid regex")
});

/// Lowercased word tokens of a column name. Empty pieces are dropped.
pub fn tokenize_name(name: &str) -> Vec<String> {
    NAME_SEPARATORS
        .split(&name.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Token set of a column name, keeping only tokens of at least `min_len` chars.
pub fn token_set(name: &str, min_len: usize) -> BTreeSet<String> {
    tokenize_name(name)
        .into_iter()
        .filter(|t| t.chars().count() >= min_len)
        .collect()
}

/// Lowercased name with separators replaced by single spaces.
pub fn spaced_name(name: &str) -> String {
    tokenize_name(name).join(" ")
}

/// Lowercased name with every separator removed.
pub fn compact_name(name: &str) -> String {
    tokenize_name(name).concat()
}

/// Maps NaN and infinities to 0.0.
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// NaN-safe clamp into [0, 1].
pub fn clamp_unit(value: f64) -> f64 {
    finite_or_zero(value).clamp(0.0, 1.0)
}

/// NaN-safe clamp into [0, 100].
pub fn clamp_percent(value: f64) -> f64 {
    finite_or_zero(value).clamp(0.0, 100.0)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// True when every value equals the first. Empty and single-value slices
/// count as constant.
pub fn is_constant(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}

/// Population variance (divides by n). Exactly 0 for constant input; the
/// rounded mean of values like 0.4 would otherwise leave a tiny residue.
pub fn population_variance(values: &[f64]) -> f64 {
    if is_constant(values) {
        return 0.0;
    }
    match mean(values) {
        Some(m) => values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64,
        None => 0.0,
    }
}

pub fn cosine_similarity_manual(v1: &[f32], v2: &[f32]) -> Option<f64> {
    if v1.len() != v2.len() || v1.is_empty() {
        return None;
    }
    let mut dot_product = 0.0;
    let mut mag1_sq = 0.0;
    let mut mag2_sq = 0.0;
    for (a, b) in v1.iter().zip(v2.iter()) {
        dot_product += (*a as f64) * (*b as f64);
        mag1_sq += (*a as f64).powi(2);
        mag2_sq += (*b as f64).powi(2);
    }
    let mag1 = mag1_sq.sqrt();
    let mag2 = mag2_sq.sqrt();
    if mag1 == 0.0 || mag2 == 0.0 {
        return None;
    }
    let similarity = dot_product / (mag1 * mag2);
    if similarity.is_nan() || similarity.is_infinite() {
        log::warn!(
            "Cosine similarity is not finite. dot_product: {}, mag1: {}, mag2: {}",
            dot_product,
            mag1,
            mag2
        );
        return None;
    }
    Some(similarity)
}
