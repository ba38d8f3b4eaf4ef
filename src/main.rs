//  █████╗ ██╗    ███████╗██╗██╗     ██╗███╗   ██╗ ██████╗
// ██╔══██╗██║    ██╔════╝██║██║     ██║████╗  ██║██╔════╝
// ███████║██║    █████╗  ██║██║     ██║██╔██╗ ██║██║  ███╗
// ██╔══██║██║    ██╔══╝  ██║██║     ██║██║╚██╗██║██║   ██║
// ██║  ██║██║    ██║     ██║███████╗██║██║ ╚████║╚██████╔╝
// ╚═╝  ╚═╝╚═╝    ╚═╝     ╚═╝╚══════╝╚═╝╚═╝  ╚═══╝ ╚═════╝
//
// E N G I N E
//
// Reads a decade of SEC filings for thirty companies and counts every
// paragraph in which management said "machine learning" out loud.
// Rust + Tokio + Aho-Corasick + Rayon + SQLite, all to measure hype.

mod config;
mod error;
mod metrics;
mod models;
mod stages;
mod store;
mod text_extractor;
mod text_scanner;
mod universe;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::metrics::RunMetrics;
use crate::stages::{discovery, orchestrator};

#[derive(Debug, Parser)]
#[command(
    name = "ai-filing-engine",
    version,
    about = "Discover SEC filings, extract AI-related paragraphs, and aggregate them"
)]
struct Cli {
    /// Stage to run. Defaults to the full pipeline.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Query the registry and write the filing index
    Discover,
    /// Fetch every indexed filing and write the AI paragraph table
    Extract {
        /// Index file to read instead of the configured one
        #[arg(long)]
        index: Option<PathBuf>,
    },
    /// Replace the analytical store with the paragraph table
    Load {
        /// Paragraph table to load instead of the configured one
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Write summary tables for a year window
    Report {
        #[arg(long)]
        start: Option<i32>,
        #[arg(long)]
        end: Option<i32>,
    },
    /// Discover, extract, load and report, in that order
    Run,
}

fn print_banner() {
    let banner = r#"
    ╔══════════════════════════════════════════════════════════════╗
    ║                                                              ║
    ║        ⚡ AI FILING ENGINE ⚡                                ║
    ║                                                              ║
    ║   Registry:   data.sec.gov submissions, one polite call      ║
    ║               at a time                                      ║
    ║   Documents:  bounded worker pool + permanent disk cache     ║
    ║   Scanning:   Aho-Corasick over every paragraph, on rayon    ║
    ║   Storage:    SQLite, replaced wholesale on every load       ║
    ║                                                              ║
    ║   "They said machine learning 4,000 times. We counted."      ║
    ║                                                              ║
    ╚══════════════════════════════════════════════════════════════╝
    "#;
    println!("{}", banner);
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    if json {
        builder.json().init();
    } else {
        builder.with_ansi(true).init();
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env();

    init_tracing(config.log_json);
    if !config.log_json {
        print_banner();
    }

    info!(
        data_dir = %config.data_dir.display(),
        forms = ?config.forms,
        start_year = config.start_year,
        end_year = config.end_year,
        workers = config.max_workers,
        keywords = config.keywords.len(),
        "✅ Configuration loaded"
    );

    let metrics = Arc::new(RunMetrics::new());
    let command = cli.command.unwrap_or(Command::Run);

    if let Err(e) = execute(command, &config, metrics).await {
        error!(error = %format!("{e:#}"), "💀 Pipeline aborted");
        return Err(e);
    }
    Ok(())
}

async fn execute(command: Command, config: &Config, metrics: Arc<RunMetrics>) -> anyhow::Result<()> {
    match command {
        Command::Discover => {
            discovery::run(config, metrics)
                .await
                .context("discover stage failed")?;
        }
        Command::Extract { index } => {
            orchestrator::run(config, index.as_deref(), metrics)
                .await
                .context("extract stage failed")?;
        }
        Command::Load { csv } => {
            store::run_load(config, csv.as_deref(), &metrics).context("load stage failed")?;
        }
        Command::Report { start, end } => {
            store::run_report(config, start, end).context("report stage failed")?;
        }
        Command::Run => run_all(config, metrics).await?,
    }
    Ok(())
}

async fn run_all(config: &Config, metrics: Arc<RunMetrics>) -> anyhow::Result<()> {
    info!("🚀 Full run: discover -> extract -> load -> report");

    let index = discovery::run(config, metrics.clone())
        .await
        .context("discover stage failed")?;
    orchestrator::run(config, Some(&index), metrics.clone())
        .await
        .context("extract stage failed")?;
    store::run_load(config, None, &metrics).context("load stage failed")?;
    store::run_report(config, None, None).context("report stage failed")?;

    let metrics_path = config.processed_dir.join("run_metrics.json");
    match metrics.write_json(&metrics_path) {
        Ok(()) => info!(path = %metrics_path.display(), "📊 Run metrics written"),
        Err(e) => warn!(path = %metrics_path.display(), error = %e, "Failed to write run metrics"),
    }
    metrics.log_summary("run");

    info!("🏁 Full run complete");
    Ok(())
}
