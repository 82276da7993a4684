// src/bin/submit_feedback.rs

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use std::fs;
use std::io::Read;

use colmatch_lib::config::LearningConfig;
use colmatch_lib::models::FeedbackSubmission;
use colmatch_lib::reinforcement::LearningContext;

#[derive(Parser, Debug)]
#[command(name = "submit_feedback")]
#[command(about = "Record match judgments and let the learners update")]
struct Args {
    /// Column of the first dataset, or a JSON feedback file ("-" reads stdin)
    #[arg(value_name = "FILE1_COLUMN|FEEDBACK_JSON")]
    source: String,

    /// Column of the second dataset
    #[arg(requires = "verdict")]
    file2_column: Option<String>,

    /// Whether the suggested match was right
    verdict: Option<Verdict>,

    /// The column that should have been matched instead
    #[arg(long, value_name = "COL")]
    correct_match: Option<String>,

    #[arg(long)]
    note: Option<String>,

    /// Confidence (0-100) shown when the match was judged
    #[arg(long)]
    confidence: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Verdict {
    #[value(alias = "true", alias = "yes")]
    Correct,
    #[value(alias = "false", alias = "no")]
    Incorrect,
}

fn read_submissions(source: &str) -> Result<Vec<FeedbackSubmission>> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read feedback from stdin")?;
        buf
    } else {
        fs::read_to_string(source).with_context(|| format!("Failed to read {}", source))?
    };
    // a single submission or an array of them
    let value: serde_json::Value = serde_json::from_str(&raw).context("Feedback is not valid JSON")?;
    if value.is_array() {
        serde_json::from_value(value).context("Failed to parse feedback array")
    } else {
        Ok(vec![serde_json::from_value(value).context("Failed to parse feedback")?])
    }
}

impl Args {
    fn has_judgment_options(&self) -> bool {
        self.correct_match.is_some() || self.note.is_some() || self.confidence.is_some()
    }

    /// The single judgment given on the command line, if one was given.
    fn submission(&self) -> Option<FeedbackSubmission> {
        let file2_column = self.file2_column.clone()?;
        let verdict = self.verdict?;
        let mut submission =
            FeedbackSubmission::new(self.source.clone(), file2_column, verdict == Verdict::Correct);
        if let Some(column) = &self.correct_match {
            submission = submission.with_correction(column.clone());
        }
        if let Some(note) = &self.note {
            submission = submission.with_note(note.clone());
        }
        if let Some(confidence) = self.confidence {
            submission = submission.with_confidence(confidence);
        }
        Some(submission)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let args = Args::parse();
    let submissions = match args.submission() {
        Some(submission) => vec![submission],
        None if args.has_judgment_options() => {
            bail!("--correct-match, --note and --confidence need a column pair and verdict")
        }
        None => read_submissions(&args.source)?,
    };

    let context = LearningContext::load(LearningConfig::from_env());
    let mut stored = 0usize;
    for submission in submissions {
        let outcome = context
            .add_feedback(submission)
            .context("Feedback submission rejected")?;
        stored += 1;
        info!(
            "Stored feedback {} for {} <-> {} ({})",
            outcome.record.id,
            outcome.record.file1_column,
            outcome.record.file2_column,
            if outcome.record.is_correct { "correct" } else { "incorrect" }
        );
        if let Some(batch) = outcome.weight_update_batch {
            info!("Feedback batch of {} triggered a weight update", batch);
        }
        for learner in &outcome.learner_failures {
            warn!("{} did not learn from feedback {}", learner, outcome.record.id);
        }
    }

    let weights = context.weights();
    info!(
        "Stored {} feedback records. Weights now name={:.3}, data={:.3}, pattern={:.3}",
        stored, weights.name, weights.data, weights.pattern
    );
    Ok(())
}
