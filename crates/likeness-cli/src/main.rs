use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use likeness_core::extractor;
use likeness_core::types::{ImageSource, VerificationOutcome};
use likeness_core::verify::Verifier;

mod analyze;
mod batch;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "likeness", about = "ID-photo / selfie verification CLI")]
struct Cli {
    /// ONNX embedding model path (overrides LIKENESS_MODEL_PATH)
    #[arg(long, global = true)]
    model: Option<PathBuf>,
    /// Similarity threshold for a positive verification (overrides LIKENESS_THRESHOLD)
    #[arg(long, global = true)]
    threshold: Option<f32>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a government-ID photo against a selfie, printing the outcome as JSON
    Verify {
        /// Gov-ID image (path or data URI), or one JSON argument
        /// {"gov_id": ..., "selfie": ...}
        gov_id: String,
        /// Selfie image (path or data URI); omitted in the JSON form
        selfie: Option<String>,
    },
    /// Verify every user pair under a directory of per-user upload folders
    Batch {
        /// Root directory with one subdirectory per user
        root: PathBuf,
    },
    /// Batch verification with per-pair image diagnostics
    Analyze {
        /// Root directory with one subdirectory per user
        root: PathBuf,
    },
    /// Verify one pair repeatedly and report the score spread
    Repeat {
        gov_id: String,
        selfie: String,
        /// Number of verification runs
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },
}

fn main() -> ExitCode {
    // Logging goes to stderr; stdout carries nothing but outcome JSON and
    // analysis text.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(model) = cli.model {
        config.model_path = model;
    }
    if let Some(threshold) = cli.threshold {
        config.threshold = threshold;
    }

    match run(cli.command, &config) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("likeness: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands, config: &Config) -> Result<ExitCode> {
    match command {
        Commands::Verify { gov_id, selfie } => cmd_verify(gov_id, selfie, config),
        Commands::Batch { root } => cmd_batch(&root, config),
        Commands::Analyze { root } => cmd_analyze(&root, config),
        Commands::Repeat {
            gov_id,
            selfie,
            runs,
        } => cmd_repeat(&gov_id, &selfie, runs, config),
    }
}

/// Build a verifier on the process-wide shared extractor, loading the model
/// on first use.
fn build_verifier(config: &Config) -> Result<Verifier> {
    let extractor = extractor::initialize(&config.model_path).with_context(|| {
        format!(
            "loading embedding model from {}",
            config.model_path.display()
        )
    })?;
    Ok(Verifier::new(extractor, config.verify_config()))
}

/// JSON form of the verify arguments, as sent by the backend service.
#[derive(Deserialize)]
struct VerifyRequest {
    gov_id: Option<String>,
    selfie: Option<String>,
}

/// Resolve the verify arguments: either two positional images or one JSON
/// argument carrying both. Bad input comes back as a user-facing error string
/// so the caller can emit a structured failure outcome instead of crashing.
fn resolve_pair(first: String, second: Option<String>) -> Result<(ImageSource, ImageSource), String> {
    let (gov_id, selfie) = if first.starts_with('{') {
        if second.is_some() {
            return Err("JSON input takes no second argument".to_string());
        }
        let request: VerifyRequest =
            serde_json::from_str(&first).map_err(|_| "Invalid JSON input".to_string())?;
        (
            request.gov_id.unwrap_or_default(),
            request.selfie.unwrap_or_default(),
        )
    } else {
        (first, second.unwrap_or_default())
    };

    if gov_id.is_empty() || selfie.is_empty() {
        return Err("Both image paths are required".to_string());
    }

    Ok((
        ImageSource::from_user_input(&gov_id),
        ImageSource::from_user_input(&selfie),
    ))
}

fn cmd_verify(first: String, second: Option<String>, config: &Config) -> Result<ExitCode> {
    let (gov_id, selfie) = match resolve_pair(first, second) {
        Ok(pair) => pair,
        Err(error) => {
            return emit_outcome(&VerificationOutcome::failed(error, config.threshold));
        }
    };

    // A missing or unloadable model is reported the same way as any other
    // failure: one structured outcome on stdout, never a crash.
    let verifier = match build_verifier(config) {
        Ok(verifier) => verifier,
        Err(err) => {
            return emit_outcome(&VerificationOutcome::failed(
                format!("{err:#}"),
                config.threshold,
            ));
        }
    };

    emit_outcome(&verifier.verify(&gov_id, &selfie))
}

/// Print one outcome as a JSON line on stdout; the exit status reflects the
/// success flag, not the verification verdict.
fn emit_outcome(outcome: &VerificationOutcome) -> Result<ExitCode> {
    println!("{}", serde_json::to_string(outcome)?);
    Ok(if outcome.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_batch(root: &Path, config: &Config) -> Result<ExitCode> {
    let statuses =
        batch::scan(root).with_context(|| format!("scanning {}", root.display()))?;
    tracing::info!(root = %root.display(), users = statuses.len(), "batch scan");

    let verifier = build_verifier(config)?;
    for status in statuses {
        match status {
            batch::PairStatus::Complete(pair) => {
                let outcome = verifier.verify(
                    &ImageSource::Path(pair.gov_id),
                    &ImageSource::Path(pair.selfie),
                );
                println!(
                    "{}",
                    serde_json::to_string(&serde_json::json!({
                        "user": pair.user,
                        "outcome": outcome,
                    }))?
                );
            }
            batch::PairStatus::Incomplete { user, reason } => {
                tracing::warn!(user = %user, reason = %reason, "incomplete user directory, skipped");
                println!(
                    "{}",
                    serde_json::to_string(&serde_json::json!({
                        "user": user,
                        "incomplete": reason,
                    }))?
                );
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_analyze(root: &Path, config: &Config) -> Result<ExitCode> {
    let statuses =
        batch::scan(root).with_context(|| format!("scanning {}", root.display()))?;
    println!("Analyzing {} user directories", statuses.len());

    let verifier = build_verifier(config)?;
    for (i, status) in statuses.into_iter().enumerate() {
        println!("{}", "=".repeat(60));
        match status {
            batch::PairStatus::Complete(pair) => {
                println!("Analysis {}: user {}", i + 1, pair.user);
                let gov_brightness = print_image_report("Government ID", &pair.gov_id);
                let selfie_brightness = print_image_report("Selfie", &pair.selfie);
                if let (Some(gov), Some(selfie)) = (gov_brightness, selfie_brightness) {
                    println!("Brightness difference: {:.2}", (gov - selfie).abs());
                }

                let outcome = verifier.verify(
                    &ImageSource::Path(pair.gov_id),
                    &ImageSource::Path(pair.selfie),
                );
                if outcome.success {
                    println!("Match score: {:.2}%", outcome.match_score * 100.0);
                    println!(
                        "Verified: {} (threshold {:.0}%)",
                        if outcome.is_verified { "YES" } else { "NO" },
                        outcome.threshold * 100.0
                    );
                    println!("Note: {}", analyze::score_band(outcome.match_score));
                } else {
                    println!(
                        "Verification failed: {}",
                        outcome.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
            batch::PairStatus::Incomplete { user, reason } => {
                println!("Analysis {}: user {}", i + 1, user);
                println!("Incomplete data: {reason}");
            }
        }
        println!();
    }
    Ok(ExitCode::SUCCESS)
}

fn print_image_report(label: &str, path: &Path) -> Option<f32> {
    match analyze::image_stats(path) {
        Ok(stats) => {
            println!("{label}: {}", path.display());
            println!("{label} size: {}x{} pixels", stats.width, stats.height);
            println!("{label} channels: {}", stats.channels);
            println!("{label} brightness: {:.2}", stats.brightness);
            Some(stats.brightness)
        }
        Err(err) => {
            println!("{label}: could not load {} ({err})", path.display());
            None
        }
    }
}

fn cmd_repeat(gov_id: &str, selfie: &str, runs: usize, config: &Config) -> Result<ExitCode> {
    let gov_id = ImageSource::from_user_input(gov_id);
    let selfie = ImageSource::from_user_input(selfie);
    let runs = runs.max(1);

    // Every run goes through the same shared extractor; the spread it prints
    // is the consistency the singleton exists to provide.
    let verifier = build_verifier(config)?;
    let mut scores = Vec::with_capacity(runs);
    for run in 1..=runs {
        let outcome = verifier.verify(&gov_id, &selfie);
        if !outcome.success {
            println!(
                "Run {run}: failed: {}",
                outcome.error.as_deref().unwrap_or("unknown error")
            );
            return Ok(ExitCode::FAILURE);
        }
        println!(
            "Run {run}: match score {:.2}%, verified {}",
            outcome.match_score * 100.0,
            if outcome.is_verified { "YES" } else { "NO" }
        );
        scores.push(outcome.match_score);
    }

    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    println!("Max spread across {runs} runs: {:.6}", max - min);
    Ok(ExitCode::SUCCESS)
}
