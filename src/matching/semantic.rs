// src/matching/semantic.rs
//
// Optional embedding-based name similarity. The external scorer is
// best-effort: a slow scorer leaves the signal absent for the whole request
// instead of failing it, and a pair the scorer cannot judge is absent, not 0.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures::future;
use log::{debug, warn};

use crate::utils::{clamp_unit, cosine_similarity_manual};

pub type SimilarityFuture<'a> = Pin<Box<dyn Future<Output = Option<f64>> + Send + 'a>>;

/// Source of semantic similarity between two column names (a model server,
/// a cache, a fixed embedding table).
pub trait SemanticScorer: Send + Sync {
    /// Similarity in [0, 1], or `None` when the scorer has no opinion.
    fn similarity<'a>(&'a self, name1: &'a str, name2: &'a str) -> SimilarityFuture<'a>;
}

/// Fixed name → embedding table. Lookups are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct StaticEmbeddings {
    vectors: HashMap<String, Vec<f32>>,
}

impl StaticEmbeddings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vector(mut self, name: &str, vector: Vec<f32>) -> Self {
        self.insert(name, vector);
        self
    }

    pub fn insert(&mut self, name: &str, vector: Vec<f32>) {
        self.vectors.insert(name.trim().to_lowercase(), vector);
    }

    fn vector(&self, name: &str) -> Option<&Vec<f32>> {
        self.vectors.get(&name.trim().to_lowercase())
    }
}

impl SemanticScorer for StaticEmbeddings {
    fn similarity<'a>(&'a self, name1: &'a str, name2: &'a str) -> SimilarityFuture<'a> {
        Box::pin(async move {
            let v1 = self.vector(name1)?;
            let v2 = self.vector(name2)?;
            cosine_similarity_manual(v1, v2).map(clamp_unit)
        })
    }
}

/// Semantic scores fetched for one request, queried while scoring pairs.
#[derive(Debug, Clone, Default)]
pub struct SemanticLookup {
    scores: HashMap<(String, String), f64>,
}

impl SemanticLookup {
    pub fn insert(&mut self, name1: &str, name2: &str, score: f64) {
        self.scores
            .insert((name1.to_string(), name2.to_string()), clamp_unit(score));
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn similarity(&self, name1: &str, name2: &str) -> Option<f64> {
        self.scores
            .get(&(name1.to_string(), name2.to_string()))
            .copied()
    }
}

/// Asks the scorer about every pair concurrently under one deadline.
/// Returns `None` when the deadline passes before all answers arrive.
pub async fn fetch_semantic_lookup(
    scorer: &dyn SemanticScorer,
    pairs: &[(String, String)],
    deadline: Duration,
) -> Option<SemanticLookup> {
    let requests = pairs
        .iter()
        .map(|(name1, name2)| scorer.similarity(name1, name2));

    match tokio::time::timeout(deadline, future::join_all(requests)).await {
        Ok(answers) => {
            let mut lookup = SemanticLookup::default();
            for ((name1, name2), answer) in pairs.iter().zip(answers) {
                if let Some(score) = answer.filter(|s| s.is_finite()) {
                    lookup.insert(name1, name2, score);
                }
            }
            debug!(
                "Semantic scorer answered {} of {} pairs",
                lookup.len(),
                pairs.len()
            );
            Some(lookup)
        }
        Err(_) => {
            warn!(
                "Semantic scorer timed out after {:?}, continuing without semantic signal",
                deadline
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowScorer;

    impl SemanticScorer for SlowScorer {
        fn similarity<'a>(&'a self, _name1: &'a str, _name2: &'a str) -> SimilarityFuture<'a> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Some(1.0)
            })
        }
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn static_embeddings_score_known_names() {
        let scorer = StaticEmbeddings::new()
            .with_vector("salary", vec![1.0, 0.0])
            .with_vector("annual_income", vec![0.8, 0.6])
            .with_vector("dept", vec![-1.0, 0.0]);
        let lookup = fetch_semantic_lookup(
            &scorer,
            &pairs(&[
                ("salary", "annual_income"),
                ("dept", "annual_income"),
                ("salary", "unknown"),
            ]),
            Duration::from_secs(1),
        )
        .await
        .expect("static scorer answers immediately");

        let sim = lookup.similarity("salary", "annual_income").unwrap_or_default();
        assert!((sim - 0.8).abs() < 1e-6, "got {sim}");
        // opposite vectors clamp to zero
        assert_eq!(lookup.similarity("dept", "annual_income"), Some(0.0));
        // no embedding means no opinion, which is not the same as 0
        assert_eq!(lookup.similarity("salary", "unknown"), None);
    }

    #[tokio::test]
    async fn timeout_means_absent() {
        let lookup = fetch_semantic_lookup(
            &SlowScorer,
            &pairs(&[("a", "b")]),
            Duration::from_millis(50),
        )
        .await;
        assert!(lookup.is_none());
    }
}
