// speech-emotion command line front end
// Loads the model once, then classifies each file given on the command line

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use speech_emotion::{classify_file_with_timeout, render_outcome, Config, Pipeline};

/// Classify the emotion expressed in short speech recordings
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Audio files to classify
    files: Vec<PathBuf>,

    /// Config file (defaults to the app data directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the model artifacts
    #[arg(short, long)]
    model_dir: Option<PathBuf>,

    /// Architecture descriptor path, overrides the config
    #[arg(long)]
    architecture: Option<PathBuf>,

    /// Weights path, overrides the config
    #[arg(long)]
    weights: Option<PathBuf>,

    /// Per-file prediction timeout in seconds (0 disables)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Print one JSON object per file
    #[arg(long)]
    json: bool,

    /// Print what was loaded and exit if no files are given
    #[arg(long)]
    inspect_model: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::load_or_default(),
    };
    if let Some(dir) = &args.model_dir {
        config.model_dir = Some(dir.clone());
    }
    if let Some(secs) = args.timeout_secs {
        config.prediction_timeout_secs = secs;
    }

    let mut artifacts = config
        .model_artifacts()
        .context("Failed to resolve model directory")?;
    if let Some(path) = &args.architecture {
        artifacts.architecture = path.clone();
    }
    if let Some(path) = &args.weights {
        artifacts.weights = path.clone();
    }

    let pipeline = Arc::new(Pipeline::load(&artifacts).context("Failed to load model")?);

    if args.inspect_model {
        println!("{}", serde_json::to_string_pretty(&pipeline.model_info())?);
        if args.files.is_empty() {
            return Ok(ExitCode::SUCCESS);
        }
    }

    if args.files.is_empty() {
        bail!("No audio files given");
    }

    let timeout = config.prediction_timeout();
    let mut failures = 0;

    for path in &args.files {
        let outcome = classify_file_with_timeout(Arc::clone(&pipeline), path.clone(), timeout).await;
        if outcome.is_err() {
            failures += 1;
        }

        if args.json {
            let line = match &outcome {
                Ok(prediction) => json!({ "file": path, "prediction": prediction }),
                Err(failure) => json!({ "file": path, "error": failure }),
            };
            println!("{}", line);
        } else {
            let outcome = outcome.map(|p| p.label);
            if args.files.len() > 1 {
                println!("{}: {}", path.display(), render_outcome(&outcome));
            } else {
                println!("{}", render_outcome(&outcome));
            }
        }
    }

    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
