//! CLI entry point for the paperfetch tool.

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use paperfetch_core::pipeline::{Pipeline, PipelineConfig};
use paperfetch_core::{
    DocumentFetcher, Identifier, MetadataResolver, RunReporter, RunResult, WebDriverExtractor,
};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");
    info!("Paperfetch starting");

    std::fs::create_dir_all(&args.output).with_context(|| {
        format!("could not create output directory {}", args.output.display())
    })?;

    let reporter = RunReporter::create(&args.output)
        .context("could not initialize the run telemetry files")?;

    let config = PipelineConfig {
        output_dir: args.output.clone(),
        fallback_base_url: args.fallback_url.clone(),
        delay_between_items: Duration::from_secs(args.delay),
    };
    let extractor =
        WebDriverExtractor::new(&args.webdriver_url, &args.fallback_url).headless(args.headless);
    let pipeline = Pipeline::new(
        config,
        MetadataResolver::new(),
        DocumentFetcher::new(),
        Box::new(extractor),
        reporter,
    );

    let exit = if let Some(input_file) = &args.input_file {
        let identifiers = read_identifier_file(input_file)?;
        info!(count = identifiers.len(), "Starting batch processing");
        let results = run_batch(&pipeline, &identifiers, args.quiet).await;

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!(
            succeeded,
            failed = results.len() - succeeded,
            total = results.len(),
            "Batch processing complete"
        );
        // A batch run always completes all items; its exit code reports the
        // run itself, not individual outcomes.
        ExitCode::SUCCESS
    } else {
        let identifier = single_identifier(&args);
        let result = pipeline.run(&identifier).await;
        if result.is_success() {
            info!(
                path = %result.stored_path.as_deref().unwrap_or(Path::new("-")).display(),
                "Document retrieved"
            );
            ExitCode::SUCCESS
        } else {
            warn!(status = %result.status, message = %result.message, "Retrieval failed");
            ExitCode::FAILURE
        }
    };

    info!(
        log = %pipeline.reporter().log_path().display(),
        summary = %pipeline.reporter().summary_path().display(),
        "All processing finished"
    );
    Ok(exit)
}

/// The single identifier from the mutually-exclusive input flags. clap
/// guarantees exactly one is present when no input file was given.
fn single_identifier(args: &Args) -> Identifier {
    if let Some(doi) = &args.doi {
        Identifier::doi(doi)
    } else if let Some(title) = &args.title {
        Identifier::title(title)
    } else if let Some(url) = &args.url {
        Identifier::url(url)
    } else {
        unreachable!("clap requires one input argument")
    }
}

/// Reads a batch file: one DOI per line, blank lines skipped.
fn read_identifier_file(path: &Path) -> Result<Vec<Identifier>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("could not read input file {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Identifier::doi)
        .collect())
}

/// Runs the batch behind a spinner unless output is quiet. The pipeline owns
/// batch sequencing, delays, and per-item isolation; the spinner only shows
/// that the run is alive.
async fn run_batch(
    pipeline: &Pipeline,
    identifiers: &[Identifier],
    quiet: bool,
) -> Vec<RunResult> {
    if quiet {
        return pipeline.run_all(identifiers).await;
    }

    let spinner = ProgressBar::new_spinner().with_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("Processing {} identifiers", identifiers.len()));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let results = pipeline.run_all(identifiers).await;

    spinner.finish_with_message("done");
    results
}
