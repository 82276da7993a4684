// src/results.rs

use log::info;
use serde::{Deserialize, Serialize};

use crate::correlation::CorrelationResult;
use crate::models::CandidateMatch;

/// Counts collected while scoring one matching request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchStats {
    pub file1_columns: usize,
    pub file2_columns: usize,
    /// Columns left out of matching by the caller, both sides together
    pub excluded_columns: usize,
    /// Pairs that went through feature scoring
    pub pairs_scored: usize,
    /// Scored pairs that passed the acceptance filter
    pub pairs_accepted: usize,
    pub custom_mappings: usize,
    /// Accepted matches whose raw score was reshaped by the calibrator
    pub calibrated_matches: usize,
    pub semantic_available: bool,
    pub learned_weights: bool,
    /// Matches dropped by the request limit
    pub truncated: usize,
    pub avg_confidence: f64,
    pub high_confidence_matches: usize,
    pub medium_confidence_matches: usize,
    pub low_confidence_matches: usize,
    pub scoring_time_ms: f64,
}

impl MatchStats {
    /// Fills the confidence bands from the returned matches.
    pub fn summarize(&mut self, matches: &[CandidateMatch]) {
        self.high_confidence_matches = matches.iter().filter(|m| m.confidence >= 80.0).count();
        self.medium_confidence_matches = matches
            .iter()
            .filter(|m| m.confidence >= 50.0 && m.confidence < 80.0)
            .count();
        self.low_confidence_matches = matches.iter().filter(|m| m.confidence < 50.0).count();
        self.avg_confidence = if matches.is_empty() {
            0.0
        } else {
            matches.iter().map(|m| m.confidence).sum::<f64>() / matches.len() as f64
        };
    }
}

/// Ranked output of one matching request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchResults {
    pub matches: Vec<CandidateMatch>,
    pub stats: MatchStats,
    /// Filled in by the `colmatch` binary when correlation analysis is requested
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub correlations: Vec<CorrelationResult>,
}

impl MatchResults {
    pub fn top(&self) -> Option<&CandidateMatch> {
        self.matches.first()
    }

    pub fn find(&self, file1_column: &str, file2_column: &str) -> Option<&CandidateMatch> {
        self.matches
            .iter()
            .find(|m| m.file1_column == file1_column && m.file2_column == file2_column)
    }
}

pub fn log_match_summary(results: &MatchResults) {
    let stats = &results.stats;
    info!("=== Column Matching Summary ===");
    info!(
        "Columns: {} x {} ({} excluded), {} pairs scored in {:.2} ms",
        stats.file1_columns,
        stats.file2_columns,
        stats.excluded_columns,
        stats.pairs_scored,
        stats.scoring_time_ms
    );
    info!(
        "Matches returned: {} ({} accepted, {} custom, {} truncated)",
        results.matches.len(),
        stats.pairs_accepted,
        stats.custom_mappings,
        stats.truncated
    );
    info!(
        "Confidence: avg {:.2}, high {}, medium {}, low {}",
        stats.avg_confidence,
        stats.high_confidence_matches,
        stats.medium_confidence_matches,
        stats.low_confidence_matches
    );
    info!(
        "Learned weights: {}, semantic signal: {}, calibrated matches: {}",
        stats.learned_weights, stats.semantic_available, stats.calibrated_matches
    );
    for m in results.matches.iter().take(10) {
        info!(
            "  {} <-> {}: {:.2}% ({})",
            m.file1_column, m.file2_column, m.confidence, m.reason
        );
    }
}
