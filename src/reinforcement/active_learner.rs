// src/reinforcement/active_learner.rs
use std::cmp::Ordering;

use crate::models::CandidateMatch;
use crate::utils::{clamp_unit, population_variance};

const BOUNDARY_WEIGHT: f64 = 0.5;
const SIGNAL_CONFLICT_WEIGHT: f64 = 0.3;
const NOVELTY_WEIGHT: f64 = 0.2;
const VARIANCE_SCALE: f64 = 3.0;

/// Scores how much a human judgment of a match would teach the system.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActiveLearner;

impl ActiveLearner {
    /// Uncertainty in [0, 1] from a confidence on the 0-100 scale and the
    /// (name, data, pattern) signals. Peaks for confidences near 50, signals
    /// that disagree, and names matching no known category.
    pub fn calculate_uncertainty(confidence: f64, signals: [f64; 3]) -> f64 {
        let p = clamp_unit(confidence / 100.0);
        let boundary = (1.0 - (p - 0.5).abs() * 2.0).max(0.0);

        let signals = signals.map(clamp_unit);
        let conflict = (population_variance(&signals) * VARIANCE_SCALE).min(1.0);

        let novelty = 1.0 - signals[2];

        clamp_unit(
            BOUNDARY_WEIGHT * boundary + SIGNAL_CONFLICT_WEIGHT * conflict + NOVELTY_WEIGHT * novelty,
        )
    }

    pub fn uncertainty_of(candidate: &CandidateMatch) -> f64 {
        Self::calculate_uncertainty(
            candidate.confidence,
            [
                candidate.name_similarity,
                candidate.data_similarity,
                candidate.pattern_score,
            ],
        )
    }

    /// The `top_k` most uncertain matches, most uncertain first. Ties keep
    /// their input order.
    pub fn prioritize_for_feedback(matches: &[CandidateMatch], top_k: usize) -> Vec<CandidateMatch> {
        let mut scored: Vec<(f64, &CandidateMatch)> = matches
            .iter()
            .map(|m| (Self::uncertainty_of(m), m))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        scored
            .into_iter()
            .take(top_k)
            .map(|(uncertainty, m)| CandidateMatch {
                uncertainty,
                ..m.clone()
            })
            .collect()
    }

    pub fn should_request_feedback(candidate: &CandidateMatch, threshold: f64) -> bool {
        Self::uncertainty_of(candidate) >= threshold
    }
}
