// src/main.rs
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use colmatch_lib::{
    config::LearningConfig,
    correlation,
    matching::StaticEmbeddings,
    models::DatasetDocument,
    reinforcement::{LearningContext, MatchingOrchestrator},
    results, Dataset, MatchRequest,
};

/// Command-line options for one matching run
#[derive(Parser, Debug)]
#[command(name = "colmatch")]
#[command(about = "Match the columns of two tabular datasets, learning from feedback")]
struct Args {
    /// First dataset document (JSON)
    file1: PathBuf,

    /// Second dataset document (JSON)
    file2: PathBuf,

    /// Maximum number of matches to return
    #[arg(long)]
    limit: Option<usize>,

    /// Column of the first dataset to leave out (repeatable)
    #[arg(long, value_name = "COL")]
    exclude1: Vec<String>,

    /// Column of the second dataset to leave out (repeatable)
    #[arg(long, value_name = "COL")]
    exclude2: Vec<String>,

    /// User-defined mapping between the datasets (repeatable)
    #[arg(long = "map", value_name = "COL1=COL2", value_parser = parse_mapping)]
    mappings: Vec<(String, String)>,

    /// JSON object of column name to embedding vector
    #[arg(long, value_name = "FILE")]
    embeddings: Option<PathBuf>,

    /// Also compute correlations for numeric matches
    #[arg(long)]
    correlations: bool,
}

fn parse_mapping(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((col1, col2)) if !col1.is_empty() && !col2.is_empty() => {
            Ok((col1.to_string(), col2.to_string()))
        }
        _ => Err(format!("expected COL1=COL2, got '{}'", raw)),
    }
}

fn load_dataset(path: &Path) -> Result<Dataset> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset {}", path.display()))?;
    let doc: DatasetDocument = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse dataset {}", path.display()))?;
    info!(
        "Loaded dataset '{}' with {} columns from {}",
        doc.name,
        doc.columns.len(),
        path.display()
    );
    Ok(doc.into())
}

fn load_embeddings(path: &Path) -> Result<StaticEmbeddings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read embeddings {}", path.display()))?;
    let vectors: HashMap<String, Vec<f32>> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse embeddings {}", path.display()))?;
    info!("Loaded {} name embeddings from {}", vectors.len(), path.display());
    let mut embeddings = StaticEmbeddings::new();
    for (name, vector) in vectors {
        embeddings.insert(&name, vector);
    }
    Ok(embeddings)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Try to load .env file if it exists
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let args = Args::parse();
    let start_time = Instant::now();

    let config = LearningConfig::from_env();
    let context = Arc::new(LearningContext::load(config));
    let mut orchestrator = MatchingOrchestrator::new(Arc::clone(&context));
    if let Some(path) = &args.embeddings {
        orchestrator = orchestrator.with_semantic_scorer(Arc::new(load_embeddings(path)?));
    }

    let dataset1 = load_dataset(&args.file1)?;
    let dataset2 = load_dataset(&args.file2)?;

    let mut request = MatchRequest::new(dataset1.clone(), dataset2.clone());
    for column in &args.exclude1 {
        request = request.exclude_file1(column.clone());
    }
    for column in &args.exclude2 {
        request = request.exclude_file2(column.clone());
    }
    for (col1, col2) in &args.mappings {
        request = request.with_custom_mapping(col1.clone(), col2.clone());
    }
    if let Some(limit) = args.limit {
        request = request.with_limit(limit);
    }

    let mut match_results = orchestrator
        .analyze_with_semantic(&request)
        .await
        .context("Matching request failed")?;

    if args.correlations {
        match_results.correlations =
            correlation::calculate_correlations(&dataset1, &dataset2, &match_results.matches)
                .context("Correlation analysis failed")?;
    }

    results::log_match_summary(&match_results);
    for candidate in orchestrator.prioritize_for_feedback(
        &match_results.matches,
        colmatch_lib::config::DEFAULT_FEEDBACK_PRIORITY_COUNT,
    ) {
        info!(
            "Feedback wanted: {} <-> {} (uncertainty {:.2})",
            candidate.file1_column, candidate.file2_column, candidate.uncertainty
        );
    }

    println!("{}", serde_json::to_string_pretty(&match_results)?);
    info!("Matching completed in {:.2?}", start_time.elapsed());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_flags_accumulate() {
        let args = Args::try_parse_from([
            "colmatch", "a.json", "b.json", "--limit", "5", "--exclude1", "notes",
            "--exclude1", "tmp", "--map", "emp_id=employee_id", "--map", "dept=department",
            "--correlations",
        ])
        .unwrap();
        assert_eq!(args.file1, PathBuf::from("a.json"));
        assert_eq!(args.limit, Some(5));
        assert_eq!(args.exclude1, vec!["notes", "tmp"]);
        assert!(args.exclude2.is_empty());
        assert_eq!(
            args.mappings,
            vec![
                ("emp_id".to_string(), "employee_id".to_string()),
                ("dept".to_string(), "department".to_string()),
            ]
        );
        assert!(args.correlations);
        assert_eq!(args.embeddings, None);
    }

    #[test]
    fn malformed_arguments_are_rejected() {
        assert!(Args::try_parse_from(["colmatch", "a.json"]).is_err());
        assert!(Args::try_parse_from(["colmatch", "a.json", "b.json", "--map", "emp_id"]).is_err());
        assert!(Args::try_parse_from(["colmatch", "a.json", "b.json", "--limit", "many"]).is_err());
        assert!(parse_mapping("=dept").is_err());
    }
}
