//! concurrency-tap entry point.

use std::path::PathBuf;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use concurrency_tap::PointStore;
use concurrency_tap_cli::config::{self, Overrides};
use concurrency_tap_cli::{export_only, run_session, ChromiumCapture, SessionSummary};

#[derive(Parser)]
#[command(
    name = "concurrency-tap",
    about = "Capture concurrency time series from a dashboard's network traffic",
    version
)]
struct Cli {
    /// Path to the SQLite point store.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Path of the CSV snapshot to write.
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    /// JSON config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Print the session summary as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the page, capture responses, and export a snapshot (default).
    Run {
        /// Page to load.
        #[arg(long)]
        url: Option<String>,

        /// Chromium executable.
        #[arg(long)]
        chromium: Option<PathBuf>,

        /// Listening time after the page loads, in milliseconds.
        #[arg(long)]
        settle_ms: Option<u64>,
    },

    /// Export the existing store without capturing.
    Export,

    /// Show what the store currently holds.
    Stats,

    /// Generate shell completion scripts.
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut overrides = Overrides {
        db: cli.db.clone(),
        snapshot: cli.snapshot.clone(),
        ..Overrides::default()
    };

    match cli.command.unwrap_or(Commands::Run {
        url: None,
        chromium: None,
        settle_ms: None,
    }) {
        Commands::Run {
            url,
            chromium,
            settle_ms,
        } => {
            overrides.url = url;
            overrides.chromium = chromium;
            overrides.settle_ms = settle_ms;
            let (settings, tap) = config::load(cli.config.as_deref(), &overrides)?;

            let backend = ChromiumCapture::new(settings.chromium_path.clone(), settings.user_agent.clone());
            let summary = run_session(backend, &settings, &tap).await?;
            print_summary(&summary, cli.json)?;
        }

        Commands::Export => {
            let (settings, tap) = config::load(cli.config.as_deref(), &overrides)?;
            let rows = export_only(&settings, &tap)?;
            println!("Wrote {rows} row(s) to {}", settings.snapshot_path.display());
        }

        Commands::Stats => {
            let (settings, _) = config::load(cli.config.as_deref(), &overrides)?;
            let store = PointStore::open(&settings.db_path)
                .with_context(|| format!("failed to open store: {}", settings.db_path.display()))?;
            println!("Store: {}", settings.db_path.display());
            println!("  Points: {}", store.count()?);
            if let Some((first, last)) = store.bounds()? {
                println!("  First timestamp: {first}");
                println!("  Last timestamp:  {last}");
            }
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "concurrency-tap", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn print_summary(summary: &SessionSummary, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    let stats = &summary.stats;
    if let Some(e) = &summary.transport_error {
        println!("Capture incomplete: {e}");
    }
    println!(
        "Inspected {} of {} response(s) from {} URL(s)",
        stats.responses_seen - stats.filtered_out,
        stats.responses_seen,
        summary.distinct_urls
    );
    println!(
        "  {} candidate(s): {} new, {} already stored, {} rejected",
        stats.candidates,
        stats.inserted,
        stats.duplicates,
        stats.rejected_missing + stats.rejected_not_numeric + stats.rejected_below_threshold
    );
    println!(
        "Snapshot {} has {} row(s)",
        summary.snapshot_path.display(),
        summary.snapshot_rows
    );
    Ok(())
}
