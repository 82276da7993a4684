// src/bin/learning_stats.rs

use anyhow::Result;
use log::{info, warn};

use colmatch_lib::config::LearningConfig;
use colmatch_lib::reinforcement::LearningContext;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = LearningConfig::from_env();
    info!("Reading learning state from {}", config.data_dir.display());
    let context = LearningContext::load(config);
    let report = context.report();

    info!("=== Learning State ===");
    info!(
        "Weights: name={:.3}, data={:.3}, pattern={:.3} ({} updates, trained: {})",
        report.weights.name,
        report.weights.data,
        report.weights.pattern,
        report.training.total_updates,
        report.training.trained
    );
    if let Some(avg_loss) = report.training.avg_loss {
        info!(
            "Average loss over recent updates: {:.4} ({:?})",
            avg_loss, report.training.loss_trend
        );
    }
    info!(
        "Calibration: {} samples in {} bins, mean error {:.2}",
        report.calibration.total_samples,
        report.calibration.calibrated_bins,
        report.calibration.mean_calibration_error
    );
    for point in &report.calibration_curve {
        info!(
            "  {}: {:.1}% accurate over {} samples",
            point.predicted_range, point.actual_accuracy, point.sample_count
        );
    }
    info!(
        "Patterns: {} positive tokens, {} anti-patterns",
        report.patterns.positive_patterns_count, report.patterns.negative_patterns_count
    );
    info!(
        "Feedback: {} records, {:.1}% correct, {} corrections",
        report.feedback.total_feedback, report.feedback.accuracy, report.feedback.total_corrections
    );

    if !report.corrupt_stores.is_empty() {
        warn!(
            "Stores reset to defaults because their documents were unreadable: {}",
            report.corrupt_stores.join(", ")
        );
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
