// src/reinforcement/orchestrator.rs
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};

use super::active_learner::ActiveLearner;
use super::learning_context::{FeedbackOutcome, LearningContext, LearningSnapshot};
use crate::config::{
    CUSTOM_MAPPING_CONFIDENCE, EXACT_NAME_FLOOR, MAX_COMBINED_PENALTY, MIN_MATCH_CONFIDENCE,
    MIN_NAME_OR_PATTERN_SIGNAL, NEGATIVE_PATTERN_PENALTY_SCALE, POSITIVE_PATTERN_BOOST_SCALE,
    TYPE_MISMATCH_FACTOR,
};
use crate::error::{FeedbackError, MatchError};
use crate::matching::semantic::fetch_semantic_lookup;
use crate::matching::{
    extract_features, is_type_mismatch, profile_column, ColumnProfile, FeatureVector,
    SemanticLookup, SemanticScorer,
};
use crate::models::{
    CandidateMatch, ColumnDescriptor, ColumnValues, Dataset, FeedbackSubmission, MatchProvenance,
    MatchRequest,
};
use crate::results::{MatchResults, MatchStats};
use crate::utils::{clamp_percent, clamp_unit};

const CUSTOM_MAPPING_REASON: &str = "User-defined custom mapping";

/// A request that passed validation, with every participating column profiled.
struct PreparedRequest<'r> {
    columns1: Vec<(&'r ColumnDescriptor, ColumnProfile)>,
    columns2: Vec<(&'r ColumnDescriptor, ColumnProfile)>,
    custom: HashSet<(&'r str, &'r str)>,
    excluded: usize,
    limit: Option<usize>,
}

impl PreparedRequest<'_> {
    /// Name pairs that go through feature scoring.
    fn scored_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for (c1, _) in &self.columns1 {
            for (c2, _) in &self.columns2 {
                if !self.custom.contains(&(c1.name.as_str(), c2.name.as_str())) {
                    pairs.push((c1.name.clone(), c2.name.clone()));
                }
            }
        }
        pairs
    }
}

/// Scores every column pair of two datasets against the learned state and
/// routes judgments back into it.
pub struct MatchingOrchestrator {
    context: Arc<LearningContext>,
    semantic: Option<Arc<dyn SemanticScorer>>,
}

impl MatchingOrchestrator {
    pub fn new(context: Arc<LearningContext>) -> Self {
        Self {
            context,
            semantic: None,
        }
    }

    pub fn with_semantic_scorer(mut self, scorer: Arc<dyn SemanticScorer>) -> Self {
        self.semantic = Some(scorer);
        self
    }

    pub fn context(&self) -> &Arc<LearningContext> {
        &self.context
    }

    /// Ranks the pairs of `request` without the semantic signal.
    pub fn analyze(&self, request: &MatchRequest) -> Result<MatchResults, MatchError> {
        let prepared = prepare(request)?;
        Ok(self.score_prepared(&prepared, None))
    }

    /// Ranks the pairs of `request`, first asking the semantic scorer (if one is
    /// configured) about every scored pair. A scorer that misses the deadline
    /// leaves the signal out for this request.
    pub async fn analyze_with_semantic(
        &self,
        request: &MatchRequest,
    ) -> Result<MatchResults, MatchError> {
        let prepared = prepare(request)?;
        let lookup = match &self.semantic {
            Some(scorer) => {
                let pairs = prepared.scored_pairs();
                fetch_semantic_lookup(
                    scorer.as_ref(),
                    &pairs,
                    self.context.config().semantic_timeout,
                )
                .await
            }
            None => None,
        };
        Ok(self.score_prepared(&prepared, lookup.as_ref()))
    }

    /// Scores a single pair against the current learned state. No acceptance
    /// filter is applied.
    pub fn score_pair(
        &self,
        column1: &ColumnDescriptor,
        values1: &ColumnValues,
        column2: &ColumnDescriptor,
        values2: &ColumnValues,
    ) -> CandidateMatch {
        let snapshot = self.context.snapshot();
        let profile1 = profile_column(column1.kind, values1);
        let profile2 = profile_column(column2.kind, values2);
        let features = extract_features(column1, &profile1, column2, &profile2, None);
        self.score_features(&snapshot, column1, column2, &features)
    }

    pub fn prioritize_for_feedback(
        &self,
        matches: &[CandidateMatch],
        top_k: usize,
    ) -> Vec<CandidateMatch> {
        ActiveLearner::prioritize_for_feedback(matches, top_k)
    }

    pub fn submit_feedback(
        &self,
        submission: FeedbackSubmission,
    ) -> Result<FeedbackOutcome, FeedbackError> {
        self.context.add_feedback(submission)
    }

    fn score_prepared(
        &self,
        prepared: &PreparedRequest<'_>,
        semantic: Option<&SemanticLookup>,
    ) -> MatchResults {
        let started = Instant::now();
        let snapshot = self.context.snapshot();
        let mut stats = MatchStats {
            file1_columns: prepared.columns1.len(),
            file2_columns: prepared.columns2.len(),
            excluded_columns: prepared.excluded,
            semantic_available: semantic.is_some(),
            learned_weights: snapshot.trained,
            ..MatchStats::default()
        };

        let mut matches = Vec::new();
        for (c1, profile1) in &prepared.columns1 {
            for (c2, profile2) in &prepared.columns2 {
                if prepared.custom.contains(&(c1.name.as_str(), c2.name.as_str())) {
                    matches.push(custom_mapping_match(c1, c2));
                    stats.custom_mappings += 1;
                    continue;
                }

                let features = extract_features(c1, profile1, c2, profile2, semantic);
                let candidate = self.score_features(&snapshot, c1, c2, &features);
                stats.pairs_scored += 1;

                if !is_acceptable(&candidate) {
                    continue;
                }
                if candidate.provenance.calibrated {
                    stats.calibrated_matches += 1;
                }
                stats.pairs_accepted += 1;
                matches.push(candidate);
            }
        }

        // stable: equal confidences keep pair order
        matches.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        if let Some(limit) = prepared.limit {
            stats.truncated = matches.len().saturating_sub(limit);
            matches.truncate(limit);
        }

        stats.summarize(&matches);
        stats.scoring_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        info!(
            "Matched {} x {} columns: {} of {} scored pairs accepted, {} custom mappings",
            stats.file1_columns,
            stats.file2_columns,
            stats.pairs_accepted,
            stats.pairs_scored,
            stats.custom_mappings
        );

        MatchResults {
            matches,
            stats,
            correlations: Vec::new(),
        }
    }

    fn score_features(
        &self,
        snapshot: &LearningSnapshot,
        column1: &ColumnDescriptor,
        column2: &ColumnDescriptor,
        features: &FeatureVector,
    ) -> CandidateMatch {
        let mut provenance = MatchProvenance {
            learned_weights: snapshot.trained,
            ..MatchProvenance::default()
        };

        let core = snapshot.weights.combine(features.core());
        let mut ensemble = match features.semantic_score {
            Some(semantic) => {
                provenance.semantic_used = true;
                let w = self.context.config().semantic_weight;
                (1.0 - w) * core + w * semantic
            }
            None => core,
        };
        ensemble = clamp_unit(ensemble);

        if features.name_similarity >= 1.0 && ensemble < EXACT_NAME_FLOOR {
            ensemble = EXACT_NAME_FLOOR;
            provenance.exact_name_floor = true;
        }
        if is_type_mismatch(column1.kind, column2.kind) {
            ensemble *= TYPE_MISMATCH_FACTOR;
            provenance.type_mismatch = true;
        }

        let mut score = ensemble * 100.0;

        let positive = snapshot
            .patterns
            .get_positive_pattern_score(&column1.name, &column2.name);
        if positive > 0.0 {
            score += POSITIVE_PATTERN_BOOST_SCALE * positive;
            provenance.positive_pattern_boost = Some(positive);
        }

        let negative = snapshot.patterns.get_negative_pattern_penalty(
            &column1.name,
            &column2.name,
            features.name_similarity,
            features.data_similarity,
        );
        if negative > 0.0 {
            provenance.negative_pattern_penalty = Some(negative);
        }

        let boost = snapshot.feedback.boost(&column1.name, &column2.name);
        if boost != 0.0 {
            provenance.feedback_boost = Some(boost);
        }

        // both penalty paths can fire for the same rejected pair; they add up
        // to at most MAX_COMBINED_PENALTY points
        let penalty =
            NEGATIVE_PATTERN_PENALTY_SCALE * negative + (-boost).max(0.0) * 100.0;
        if penalty > MAX_COMBINED_PENALTY {
            provenance.penalty_capped = true;
        }
        score += boost.max(0.0) * 100.0 - penalty.min(MAX_COMBINED_PENALTY);

        let raw_confidence = clamp_percent(score);
        let confidence = snapshot.calibrator.calibrate(raw_confidence);
        provenance.calibrated = (confidence - raw_confidence).abs() > 1e-9;
        let uncertainty = ActiveLearner::calculate_uncertainty(confidence, features.core());

        debug!(
            "{} <-> {}: features {:?}, raw {:.2}, calibrated {:.2}",
            column1.name, column2.name, features, raw_confidence, confidence
        );

        CandidateMatch {
            file1_column: column1.name.clone(),
            file2_column: column2.name.clone(),
            name_similarity: features.name_similarity,
            data_similarity: features.data_similarity,
            pattern_score: features.pattern_score,
            semantic_score: features.semantic_score,
            raw_confidence,
            confidence,
            uncertainty,
            reason: match_reason(features),
            provenance,
        }
    }
}

fn is_acceptable(candidate: &CandidateMatch) -> bool {
    candidate.confidence > MIN_MATCH_CONFIDENCE
        && (candidate.name_similarity > MIN_NAME_OR_PATTERN_SIGNAL
            || candidate.pattern_score > MIN_NAME_OR_PATTERN_SIGNAL)
}

fn match_reason(features: &FeatureVector) -> String {
    let mut reason = format!(
        "Name({:.2}), Data({:.2}), Pattern({:.2})",
        features.name_similarity, features.data_similarity, features.pattern_score
    );
    if let Some(semantic) = features.semantic_score {
        reason.push_str(&format!(", Semantic({:.2})", semantic));
    }
    reason
}

fn custom_mapping_match(column1: &ColumnDescriptor, column2: &ColumnDescriptor) -> CandidateMatch {
    let signals = [1.0, 0.0, 0.0];
    CandidateMatch {
        file1_column: column1.name.clone(),
        file2_column: column2.name.clone(),
        name_similarity: signals[0],
        data_similarity: signals[1],
        pattern_score: signals[2],
        semantic_score: None,
        raw_confidence: CUSTOM_MAPPING_CONFIDENCE,
        confidence: CUSTOM_MAPPING_CONFIDENCE,
        uncertainty: ActiveLearner::calculate_uncertainty(CUSTOM_MAPPING_CONFIDENCE, signals),
        reason: CUSTOM_MAPPING_REASON.to_string(),
        provenance: MatchProvenance {
            custom_mapping: true,
            ..MatchProvenance::default()
        },
    }
}

//------------------------------------------------------------------------------
// REQUEST VALIDATION
//------------------------------------------------------------------------------

fn check_unique_columns(dataset: &Dataset) -> Result<(), MatchError> {
    let mut seen = HashSet::new();
    for column in &dataset.columns {
        if !seen.insert(column.name.as_str()) {
            return Err(MatchError::DuplicateColumn {
                dataset: dataset.name.clone(),
                column: column.name.clone(),
            });
        }
    }
    Ok(())
}

fn check_known_column(dataset: &Dataset, column: &str) -> Result<(), MatchError> {
    match dataset.column(column) {
        Some(_) => Ok(()),
        None => Err(MatchError::UnknownColumn {
            dataset: dataset.name.clone(),
            column: column.to_string(),
        }),
    }
}

/// Fetches and profiles the non-excluded columns of one dataset.
fn profile_dataset<'r>(
    dataset: &'r Dataset,
    exclusions: &HashSet<String>,
) -> Result<Vec<(&'r ColumnDescriptor, ColumnProfile)>, MatchError> {
    let mut profiled = Vec::with_capacity(dataset.columns.len());
    for column in dataset
        .columns
        .iter()
        .filter(|c| !exclusions.contains(&c.name))
    {
        let values = dataset
            .source
            .fetch(&column.name)
            .map_err(|source| MatchError::ValueFetch {
                dataset: dataset.name.clone(),
                column: column.name.clone(),
                source,
            })?;
        profiled.push((column, profile_column(column.kind, &values)));
    }
    Ok(profiled)
}

/// Rejects malformed requests before any scoring, then loads the values of
/// every participating column.
fn prepare(request: &MatchRequest) -> Result<PreparedRequest<'_>, MatchError> {
    let (d1, d2) = (&request.dataset1, &request.dataset2);
    check_unique_columns(d1)?;
    check_unique_columns(d2)?;

    for column in &request.exclusions1 {
        check_known_column(d1, column)?;
    }
    for column in &request.exclusions2 {
        check_known_column(d2, column)?;
    }

    let mut custom = HashSet::new();
    let mut targets: HashMap<&str, &str> = HashMap::new();
    for mapping in &request.custom_mappings {
        check_known_column(d1, &mapping.file1_column)?;
        check_known_column(d2, &mapping.file2_column)?;
        if request.exclusions1.contains(&mapping.file1_column)
            || request.exclusions2.contains(&mapping.file2_column)
        {
            debug!(
                "Ignoring custom mapping {} -> {}: column excluded",
                mapping.file1_column, mapping.file2_column
            );
            continue;
        }
        if let Some(previous) = targets.insert(&mapping.file1_column, &mapping.file2_column) {
            if previous != mapping.file2_column {
                return Err(MatchError::InvalidRequest(format!(
                    "column '{}' is mapped to both '{}' and '{}'",
                    mapping.file1_column, previous, mapping.file2_column
                )));
            }
        }
        custom.insert((mapping.file1_column.as_str(), mapping.file2_column.as_str()));
    }

    if request.limit == Some(0) {
        return Err(MatchError::InvalidRequest(
            "limit must be at least 1".to_string(),
        ));
    }

    Ok(PreparedRequest {
        columns1: profile_dataset(d1, &request.exclusions1)?,
        columns2: profile_dataset(d2, &request.exclusions2)?,
        custom,
        excluded: request.exclusions1.len() + request.exclusions2.len(),
        limit: request.limit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LearningConfig;
    use crate::models::ColumnKind;

    fn orchestrator(dir: &tempfile::TempDir) -> MatchingOrchestrator {
        let config = LearningConfig::with_data_dir(dir.path());
        MatchingOrchestrator::new(Arc::new(LearningContext::load(config)))
    }

    fn numeric(values: &[f64]) -> ColumnValues {
        ColumnValues::Numeric(values.iter().map(|v| Some(*v)).collect())
    }

    fn text(values: &[&str]) -> ColumnValues {
        ColumnValues::Text(values.iter().map(|v| Some(v.to_string())).collect())
    }

    fn datasets() -> (Dataset, Dataset) {
        let d1 = Dataset::in_memory(
            "left",
            vec![
                ("order_id".to_string(), ColumnKind::Numeric, numeric(&[1.0, 2.0, 3.0, 4.0])),
                ("status".to_string(), ColumnKind::Text, text(&["open", "closed", "open", "hold"])),
                ("notes".to_string(), ColumnKind::Text, text(&["a", "b", "c", "d"])),
            ],
        );
        let d2 = Dataset::in_memory(
            "right",
            vec![
                ("order_id".to_string(), ColumnKind::Numeric, numeric(&[10.0, 20.0, 30.0, 40.0])),
                ("state".to_string(), ColumnKind::Text, text(&["open", "closed", "void", "hold"])),
                ("comment".to_string(), ColumnKind::Text, text(&["x", "y", "z", "w"])),
            ],
        );
        (d1, d2)
    }

    #[test]
    fn ranks_matches_by_confidence() {
        let dir = tempfile::tempdir().unwrap();
        let (d1, d2) = datasets();
        let results = orchestrator(&dir)
            .analyze(&MatchRequest::new(d1, d2))
            .unwrap();

        let top = results.top().unwrap();
        assert_eq!((top.file1_column.as_str(), top.file2_column.as_str()), ("order_id", "order_id"));
        assert!(top.provenance.exact_name_floor || top.raw_confidence >= 95.0);
        assert_eq!(top.reason, "Name(1.00), Data(1.00), Pattern(1.00)");
        for pair in results.matches.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
        assert_eq!(results.stats.pairs_scored, 9);
        assert_eq!(results.stats.pairs_accepted, results.matches.len());
    }

    #[test]
    fn custom_mapping_bypasses_scoring_and_filter() {
        let dir = tempfile::tempdir().unwrap();
        let (d1, d2) = datasets();
        let request = MatchRequest::new(d1, d2).with_custom_mapping("notes", "comment");
        let results = orchestrator(&dir).analyze(&request).unwrap();

        let mapped = results.find("notes", "comment").unwrap();
        assert_eq!(mapped.confidence, CUSTOM_MAPPING_CONFIDENCE);
        assert_eq!(mapped.reason, CUSTOM_MAPPING_REASON);
        assert!(mapped.provenance.custom_mapping);
        assert_eq!(results.stats.custom_mappings, 1);
        assert_eq!(results.stats.pairs_scored, 8);
    }

    #[test]
    fn exclusions_and_limit_shape_output() {
        let dir = tempfile::tempdir().unwrap();
        let (d1, d2) = datasets();
        let request = MatchRequest::new(d1, d2).exclude_file1("status").with_limit(1);
        let results = orchestrator(&dir).analyze(&request).unwrap();

        assert_eq!(results.matches.len(), 1);
        assert!(results.matches.iter().all(|m| m.file1_column != "status"));
        assert_eq!(results.stats.pairs_scored, 6);
        assert_eq!(results.stats.excluded_columns, 1);
    }

    #[test]
    fn unknown_and_duplicate_columns_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(&dir);
        let (d1, d2) = datasets();

        let err = orch
            .analyze(&MatchRequest::new(d1.clone(), d2.clone()).exclude_file2("missing"))
            .unwrap_err();
        assert!(matches!(err, MatchError::UnknownColumn { ref column, .. } if column == "missing"));

        let err = orch
            .analyze(&MatchRequest::new(d1.clone(), d2.clone()).with_custom_mapping("nope", "state"))
            .unwrap_err();
        assert!(matches!(err, MatchError::UnknownColumn { .. }));

        let mut dup = d1.clone();
        dup.columns.push(ColumnDescriptor::new("status", ColumnKind::Text));
        let err = orch.analyze(&MatchRequest::new(dup, d2)).unwrap_err();
        assert!(matches!(err, MatchError::DuplicateColumn { .. }));
    }

    #[test]
    fn conflicting_custom_mappings_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (d1, d2) = datasets();
        let request = MatchRequest::new(d1, d2)
            .with_custom_mapping("notes", "comment")
            .with_custom_mapping("notes", "state");
        let err = orchestrator(&dir).analyze(&request).unwrap_err();
        assert!(matches!(err, MatchError::InvalidRequest(_)));
    }

    #[test]
    fn missing_values_surface_as_fetch_errors() {
        let dir = tempfile::tempdir().unwrap();
        let (d1, mut d2) = datasets();
        d2.columns.push(ColumnDescriptor::new("phantom", ColumnKind::Text));
        let err = orchestrator(&dir)
            .analyze(&MatchRequest::new(d1, d2))
            .unwrap_err();
        assert!(matches!(err, MatchError::ValueFetch { ref column, .. } if column == "phantom"));
    }

    #[test]
    fn joint_penalty_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(&dir);
        let c1 = ColumnDescriptor::new("region_code", ColumnKind::Text);
        let c2 = ColumnDescriptor::new("region_code", ColumnKind::Text);
        let values = text(&["n", "s", "e", "w"]);

        let before = orch.score_pair(&c1, &values, &c2, &values);
        for _ in 0..6 {
            orch.submit_feedback(FeedbackSubmission::from_match(&before, false))
                .unwrap();
        }
        let after = orch.score_pair(&c1, &values, &c2, &values);

        assert!(after.provenance.penalty_capped);
        assert_eq!(after.provenance.negative_pattern_penalty, Some(0.5));
        assert_eq!(after.provenance.feedback_boost, Some(-0.30));
        assert!(after.raw_confidence >= before.raw_confidence - MAX_COMBINED_PENALTY - 1e-9);
        assert!(after.raw_confidence < before.raw_confidence);
    }
}
