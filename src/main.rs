//! diffrisk - deterministic regression-risk scoring for code diffs
//!
//! Reads a unified diff from a file or stdin, scores it and prints the
//! report to stdout. Logs go to stderr.
//!
//! Exit codes:
//!   0 - Success (score at or below --fail-above, or no threshold set)
//!   1 - Input failure (unreadable or malformed diff, invalid config, checkpoint conflict)
//!   2 - Score above the --fail-above threshold

use anyhow::{Context, Result};
use diffrisk::cli::Args;
use diffrisk::config::{self, ConfigLayer};
use diffrisk::{report, Engine, ExitClass, RunOptions};
use std::io::Read;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(ExitClass::InputFailure.code());
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        print!("{}", config::default_toml());
        return Ok(());
    }

    init_logging(&args)?;

    info!("diffrisk v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(class) => std::process::exit(class.code()),
        Err(e) => {
            error!("Scoring failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(ExitClass::InputFailure.code());
        }
    }
}

/// Initialize logging based on verbosity settings. Logs never touch stdout.
fn init_logging(args: &Args) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level())
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Run the scoring workflow and classify the outcome.
async fn run(args: Args) -> Result<ExitClass> {
    let diff_text = read_diff(&args)?;

    let file_layer = config::load_file_layer(&args.repo, args.config.as_deref())?;
    let resolved = config::resolve(ConfigLayer::defaults(), file_layer, args.override_layer())?;
    info!("Configuration: {}", resolved.sources.join(" < "));

    let format = resolved.format;
    let engine = Engine::new(resolved)?;
    let analysis = engine
        .analyze(
            &diff_text,
            RunOptions {
                dry_run: args.dry_run,
            },
        )
        .await?;

    let output = report::render(&analysis.report, &analysis.changes, engine.config(), format)?;
    print!("{}", output);
    if !output.ends_with('\n') {
        println!();
    }

    let class = analysis.report.exit_class();
    if class == ExitClass::ThresholdExceeded {
        if let Some(threshold) = analysis.report.threshold {
            warn!(
                "Risk score {} is above the threshold of {}; failing (exit code 2)",
                analysis.report.score, threshold
            );
        }
    }
    Ok(class)
}

/// Read the diff from the given file or from stdin.
fn read_diff(args: &Args) -> Result<String> {
    match args.diff_path() {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read diff from {}", path.display())),
        None => {
            debug!("Reading diff from stdin");
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read diff from stdin")?;
            Ok(text)
        }
    }
}
