// tests/learning_scenarios.rs

use std::fs;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use colmatch_lib::config::LearningConfig;
use colmatch_lib::reinforcement::{
    AdaptiveWeightLearner, ConfidenceCalibrator, LearningContext, TrainingSample, WeightVector,
};
use colmatch_lib::{FeedbackError, FeedbackSubmission};

#[test]
fn ten_judgments_trigger_one_weight_update() {
    let dir = tempfile::tempdir().unwrap();
    let context = LearningContext::load(LearningConfig::with_data_dir(dir.path()));

    let mut triggered = Vec::new();
    for i in 0..10 {
        let submission = if i % 2 == 0 {
            FeedbackSubmission::new("x", "y", false).with_features(0.1, 0.7, 0.0)
        } else {
            FeedbackSubmission::new("x", "z", true).with_features(0.9, 0.4, 1.0)
        };
        let outcome = context.add_feedback(submission).unwrap();
        triggered.push(outcome.weight_update_batch);
        assert!(outcome.learner_failures.is_empty());
    }

    assert_eq!(triggered.iter().filter(|t| t.is_some()).count(), 1);
    assert_eq!(triggered[9], Some(10));
    assert_eq!(context.weight_update_count(), 1);
    assert!(context.snapshot().trained);
    assert_ne!(context.weights(), WeightVector::default());
}

#[test]
fn weights_stay_normalized_under_random_batches() {
    let dir = tempfile::tempdir().unwrap();
    let mut learner = AdaptiveWeightLearner::new(dir.path().join("adaptive_weights.json"), 0.01, 100);
    let mut rng = StdRng::seed_from_u64(2024);

    for _ in 0..50 {
        let batch: Vec<TrainingSample> = (0..10)
            .map(|_| TrainingSample {
                name_similarity: rng.gen_range(0.0..=1.0),
                data_similarity: rng.gen_range(0.0..=1.0),
                pattern_score: rng.gen_range(0.0..=1.0),
                is_correct: rng.gen_bool(0.5),
            })
            .collect();
        learner.update_weights(&batch).unwrap();

        let weights = learner.get_weights();
        assert!((weights.sum() - 1.0).abs() < 1e-6, "{:?}", weights);
        assert!(weights.as_array().iter().all(|w| *w >= 0.0), "{:?}", weights);
    }
    assert!(learner.history().len() <= 100);
}

#[test]
fn repeated_confirmations_move_calibration() {
    let dir = tempfile::tempdir().unwrap();
    let context = LearningContext::load(LearningConfig::with_data_dir(dir.path()));
    for _ in 0..5 {
        context
            .add_feedback(FeedbackSubmission::new("price", "cost", true).with_confidence(55.0))
            .unwrap();
    }

    let snapshot = context.snapshot();
    let calibrated = snapshot.calibrator.calibrate(55.0);
    assert!(calibrated > 55.0 && calibrated < 100.0);
    assert!((calibrated - 59.5).abs() < 1e-9);
    // no update in between, same answer
    assert_eq!(snapshot.calibrator.calibrate(55.0), calibrated);

    let curve = context.report().calibration_curve;
    assert_eq!(curve.len(), 1);
    assert_eq!(curve[0].predicted_range, "50-60%");
    assert_eq!(curve[0].sample_count, 5);
}

#[test]
fn corrupt_state_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = LearningConfig::with_data_dir(dir.path());
    for path in [
        config.weights_path(),
        config.calibration_path(),
        config.patterns_path(),
        config.feedback_path(),
    ] {
        fs::write(&path, "{ not json").unwrap();
    }

    let context = LearningContext::load(config.clone());
    assert_eq!(context.weights(), WeightVector::default());
    assert_eq!(context.feedback_count(), 0);
    let report = context.report();
    assert_eq!(report.calibration.total_samples, 0);
    assert_eq!(report.patterns.positive_patterns_count, 0);
    assert_eq!(
        report.corrupt_stores,
        vec!["weight_learner", "calibrator", "pattern_learner", "feedback_store"]
    );

    // the next write replaces the corrupt document
    context
        .add_feedback(FeedbackSubmission::new("zip", "postal_code", false).with_correction("zip_code"))
        .unwrap();
    let reloaded = LearningContext::load(config);
    assert_eq!(reloaded.feedback_count(), 1);
    assert_eq!(reloaded.get_suggested_match("zip").as_deref(), Some("zip_code"));
    assert!(!reloaded.corrupt_stores().iter().any(|s| s == "feedback_store"));
}

#[test]
fn learner_failures_do_not_lose_feedback() {
    let dir = tempfile::tempdir().unwrap();
    let config = LearningConfig::with_data_dir(dir.path());
    // directories where the calibrator and pattern documents belong make
    // every save of those two stores fail
    fs::create_dir_all(config.calibration_path()).unwrap();
    fs::create_dir_all(config.patterns_path()).unwrap();

    let context = LearningContext::load(config.clone());
    let outcome = context
        .add_feedback(FeedbackSubmission::new("zip", "zip_code", true).with_confidence(70.0))
        .unwrap();
    assert_eq!(outcome.learner_failures, vec!["calibrator", "pattern_learner"]);
    assert_eq!(outcome.weight_update_batch, None);
    assert_eq!(context.feedback_count(), 1);

    let reloaded = LearningContext::load(config);
    assert_eq!(reloaded.feedback_count(), 1);
    assert_eq!(reloaded.get_suggested_match("zip").as_deref(), Some("zip_code"));
}

#[test]
fn invalid_feedback_is_rejected_without_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let context = LearningContext::load(LearningConfig::with_data_dir(dir.path()));

    let err = context
        .add_feedback(FeedbackSubmission::new("a", "b", true).with_confidence(140.0))
        .unwrap_err();
    assert!(matches!(err, FeedbackError::InvalidFeedback(_)));

    let err = context
        .add_feedback(FeedbackSubmission::new("a", "b", true).with_correction("c"))
        .unwrap_err();
    assert!(matches!(err, FeedbackError::InvalidFeedback(_)));

    assert_eq!(context.feedback_count(), 0);
    assert_eq!(context.report().calibration.total_samples, 0);
}

#[test]
fn calibrator_documents_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = LearningConfig::with_data_dir(dir.path());
    {
        let context = LearningContext::load(config.clone());
        for i in 0..8 {
            context
                .add_feedback(
                    FeedbackSubmission::new("order_total", "amount", i % 4 != 0).with_confidence(82.0),
                )
                .unwrap();
        }
        context.flush().unwrap();
    }

    let calibrator = ConfidenceCalibrator::load(&config);
    let bin = calibrator.bin(82.0);
    assert_eq!((bin.correct, bin.total), (6, 8));
    let expected = (1.0 - 8.0 / 50.0) * 82.0 + (8.0 / 50.0) * 75.0;
    assert!((calibrator.calibrate(82.0) - expected).abs() < 1e-9);
}
