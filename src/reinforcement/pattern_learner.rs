// src/reinforcement/pattern_learner.rs
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Utc;
use log::{debug, info};

use super::types::{AntiPattern, PatternDocument, PatternStats};
use crate::config::{
    LearningConfig, ANTI_PATTERN_TOKEN_OVERLAP, MAX_NEGATIVE_PATTERNS, MAX_NEGATIVE_PENALTY,
    MIN_PATTERN_TOKEN_LENGTH, NEGATIVE_PENALTY_PER_MATCH, TOP_PATTERNS_REPORTED,
};
use crate::persistence::{load_or_default, save_atomic, LoadStatus};
use crate::utils::{clamp_unit, token_set, tokenize_name};

const PREFIX_LENGTH: usize = 3;

/// Mines token-level signals from judged matches: tokens shared by confirmed
/// pairs, and signatures of rejected pairs.
#[derive(Debug, Clone)]
pub struct PatternLearner {
    path: PathBuf,
    doc: PatternDocument,
}

impl PatternLearner {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            doc: PatternDocument::default(),
        }
    }

    pub fn load(config: &LearningConfig) -> Self {
        Self::load_with_status(config).0
    }

    /// Like `load`, also reporting how the persisted document was obtained.
    pub fn load_with_status(config: &LearningConfig) -> (Self, LoadStatus) {
        let path = config.patterns_path();
        let (mut doc, status): (PatternDocument, _) = load_or_default(&path, "learned patterns");
        while doc.negative_patterns.len() > MAX_NEGATIVE_PATTERNS {
            doc.negative_patterns.pop_front();
        }
        info!(
            "Pattern learner ready: {} positive, {} negative patterns",
            doc.positive_patterns.len(),
            doc.negative_patterns.len()
        );
        (Self { path, doc }, status)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn positive_count(&self, token: &str) -> u64 {
        self.doc.positive_patterns.get(token).copied().unwrap_or(0)
    }

    pub fn negative_patterns(&self) -> impl Iterator<Item = &AntiPattern> {
        self.doc.negative_patterns.iter()
    }

    pub fn record_positive(&mut self, col1: &str, col2: &str) {
        let common = common_tokens(col1, col2);
        for token in &common {
            *self.doc.positive_patterns.entry(token.clone()).or_insert(0) += 1;
        }
        self.doc.last_updated = Some(Utc::now());
        debug!("Learned positive tokens {:?} from {} <-> {}", common, col1, col2);
    }

    pub fn record_negative(&mut self, col1: &str, col2: &str, name_sim: f64, data_sim: f64) {
        let signature = anti_pattern_signature(col1, col2, name_sim, data_sim);
        self.doc.negative_patterns.push_back(signature);
        while self.doc.negative_patterns.len() > MAX_NEGATIVE_PATTERNS {
            self.doc.negative_patterns.pop_front();
        }
        self.doc.last_updated = Some(Utc::now());
        debug!("Learned anti-pattern from {} <-> {}", col1, col2);
    }

    pub fn learn_from_positive(&mut self, col1: &str, col2: &str) -> Result<()> {
        self.record_positive(col1, col2);
        self.persist()
    }

    pub fn learn_from_negative(
        &mut self,
        col1: &str,
        col2: &str,
        name_sim: f64,
        data_sim: f64,
    ) -> Result<()> {
        self.record_negative(col1, col2, name_sim, data_sim);
        self.persist()
    }

    pub fn persist(&self) -> Result<()> {
        save_atomic(&self.path, &self.doc)
    }

    /// Mean relative frequency of the tokens the two names share, in [0, 1].
    pub fn get_positive_pattern_score(&self, col1: &str, col2: &str) -> f64 {
        let common = common_tokens(col1, col2);
        if common.is_empty() {
            return 0.0;
        }
        let max_frequency = self
            .doc
            .positive_patterns
            .values()
            .copied()
            .max()
            .unwrap_or(1)
            .max(1) as f64;
        let total: f64 = common
            .iter()
            .map(|t| self.positive_count(t) as f64 / max_frequency)
            .sum();
        clamp_unit(total / common.len() as f64)
    }

    /// 0.1 per stored anti-pattern resembling this pair, capped at 0.5. A stored
    /// signature resembles the pair when more than half of its tokens recur on
    /// each side and the name similarity falls in the same bucket.
    pub fn get_negative_pattern_penalty(
        &self,
        col1: &str,
        col2: &str,
        name_sim: f64,
        data_sim: f64,
    ) -> f64 {
        if self.doc.negative_patterns.is_empty() {
            return 0.0;
        }
        let current = anti_pattern_signature(col1, col2, name_sim, data_sim);
        let matches = self
            .doc
            .negative_patterns
            .iter()
            .filter(|anti| {
                token_overlap(&anti.col1_tokens, &current.col1_tokens) > ANTI_PATTERN_TOKEN_OVERLAP
                    && token_overlap(&anti.col2_tokens, &current.col2_tokens)
                        > ANTI_PATTERN_TOKEN_OVERLAP
                    && anti.name_sim_range == current.name_sim_range
            })
            .count();
        (matches as f64 * NEGATIVE_PENALTY_PER_MATCH).min(MAX_NEGATIVE_PENALTY)
    }

    pub fn stats(&self) -> PatternStats {
        let mut top: Vec<(String, u64)> = self
            .doc
            .positive_patterns
            .iter()
            .map(|(token, count)| (token.clone(), *count))
            .collect();
        // stable sort keeps alphabetical order among equal counts
        top.sort_by(|a, b| b.1.cmp(&a.1));
        top.truncate(TOP_PATTERNS_REPORTED);

        PatternStats {
            positive_patterns_count: self.doc.positive_patterns.len(),
            negative_patterns_count: self.doc.negative_patterns.len(),
            top_positive_patterns: top,
        }
    }
}

fn common_tokens(col1: &str, col2: &str) -> BTreeSet<String> {
    let tokens1 = token_set(col1, MIN_PATTERN_TOKEN_LENGTH);
    let tokens2 = token_set(col2, MIN_PATTERN_TOKEN_LENGTH);
    tokens1.intersection(&tokens2).cloned().collect()
}

fn similarity_bucket(similarity: f64) -> u32 {
    ((clamp_unit(similarity) * 10.0).floor() as u32) * 10
}

pub fn anti_pattern_signature(col1: &str, col2: &str, name_sim: f64, data_sim: f64) -> AntiPattern {
    let len1 = col1.chars().count();
    let len2 = col2.chars().count();
    let prefix = |s: &str| s.to_lowercase().chars().take(PREFIX_LENGTH).collect::<String>();

    AntiPattern {
        col1_tokens: tokenize_name(col1).into_iter().collect(),
        col2_tokens: tokenize_name(col2).into_iter().collect(),
        name_sim_range: similarity_bucket(name_sim),
        data_sim_range: similarity_bucket(data_sim),
        length_ratio: if len2 > 0 { len1 as f64 / len2 as f64 } else { 1.0 },
        has_common_prefix: len1 >= PREFIX_LENGTH
            && len2 >= PREFIX_LENGTH
            && prefix(col1) == prefix(col2),
        timestamp: Utc::now(),
    }
}

/// Share of `stored` tokens that also appear in `current`.
fn token_overlap(stored: &BTreeSet<String>, current: &BTreeSet<String>) -> f64 {
    if stored.is_empty() {
        return 0.0;
    }
    stored.intersection(current).count() as f64 / stored.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn learner(dir: &tempfile::TempDir) -> PatternLearner {
        PatternLearner::new(dir.path().join("learned_patterns.json"))
    }

    #[test]
    fn positive_tokens_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let mut learner = learner(&dir);
        learner.record_positive("customer_email", "email_customer");
        learner.record_positive("customer_id", "customer_key");
        assert_eq!(learner.positive_count("customer"), 2);
        assert_eq!(learner.positive_count("email"), 1);
        // short tokens are not learned
        assert_eq!(learner.positive_count("id"), 0);

        assert_eq!(learner.get_positive_pattern_score("customer_no", "customer_ref"), 1.0);
        let score = learner.get_positive_pattern_score("email_addr", "email");
        assert!((score - 0.5).abs() < 1e-9, "got {score}");
        assert_eq!(learner.get_positive_pattern_score("foo", "bar"), 0.0);
    }

    #[test]
    fn negative_history_is_bounded_fifo() {
        let dir = tempfile::tempdir().unwrap();
        let mut learner = learner(&dir);
        for i in 0..(MAX_NEGATIVE_PATTERNS + 5) {
            learner.record_negative(&format!("col_{i}"), "other", 0.1, 0.0);
        }
        assert_eq!(learner.stats().negative_patterns_count, MAX_NEGATIVE_PATTERNS);
        let oldest = learner.negative_patterns().next().unwrap();
        assert!(oldest.col1_tokens.contains("5"));
    }

    #[test]
    fn penalty_requires_token_overlap_and_same_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let mut learner = learner(&dir);
        learner.record_negative("foo", "bar", 0.0, 0.2);
        assert!((learner.get_negative_pattern_penalty("foo", "bar", 0.0, 0.9) - 0.1).abs() < 1e-9);
        // different name-similarity bucket
        assert_eq!(learner.get_negative_pattern_penalty("foo", "bar", 0.55, 0.2), 0.0);
        // tokens do not recur
        assert_eq!(learner.get_negative_pattern_penalty("baz", "bar", 0.0, 0.2), 0.0);

        for _ in 0..10 {
            learner.record_negative("foo", "bar", 0.0, 0.2);
        }
        assert_eq!(learner.get_negative_pattern_penalty("foo", "bar", 0.0, 0.2), 0.5);
    }

    #[test]
    fn signature_features() {
        let sig = anti_pattern_signature("Order_Total", "order_tax", 0.47, 1.0);
        assert_eq!(sig.name_sim_range, 40);
        assert_eq!(sig.data_sim_range, 100);
        assert!(sig.has_common_prefix);
        assert!((sig.length_ratio - 11.0 / 9.0).abs() < 1e-9);
        assert!(sig.col1_tokens.contains("total"));
    }

    #[test]
    fn stats_rank_top_tokens_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config = LearningConfig::with_data_dir(dir.path());
        let mut learner = PatternLearner::load(&config);
        learner.learn_from_positive("unit_price", "price").unwrap();
        learner.learn_from_positive("sale_price", "price_usd").unwrap();
        learner.learn_from_positive("order_date", "date").unwrap();
        learner.learn_from_negative("foo", "bar", 0.0, 0.0).unwrap();

        let reloaded = PatternLearner::load(&config);
        let stats = reloaded.stats();
        assert_eq!(stats.positive_patterns_count, 2);
        assert_eq!(stats.negative_patterns_count, 1);
        assert_eq!(stats.top_positive_patterns[0], ("price".to_string(), 2));
    }
}
