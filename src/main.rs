//! # Batch Loader CLI (`batch-loader`)
//!
//! Ingests a batch of works described by a CSV or JSON file into the
//! repository through the configured deposit command.
//!
//! ## Usage
//!
//! ```bash
//! batch-loader --config ./config/batch-loader.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `batch-loader ingest <file>` | Deposit every work in a batch file |
//! | `batch-loader check <file>` | Validate a batch file without depositing |
//!
//! ## Examples
//!
//! ```bash
//! # Ingest a spreadsheet export, files relative to the CSV
//! batch-loader ingest works.csv
//!
//! # Ingest a JSON batch whose files are downloaded, with TIFF primaries
//! batch-loader ingest works.json --url --tiff --collection abc123
//!
//! # Resume after a partial run
//! batch-loader ingest ./retry_ingest.csv
//! ```
//!
//! Exit status is 0 when every item was deposited, 2 when some items were
//! written to the retry file, and 1 on a fatal error.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use batch_loader::check::run_check;
use batch_loader::config::{self, Config, LoggingConfig};
use batch_loader::deposit::CommandDepositor;
use batch_loader::derivative::ImageMagick;
use batch_loader::fetch::HttpFetcher;
use batch_loader::ingest::{Collaborators, IngestOptions, IngestPipeline, Interrupt, RunSummary};
use batch_loader::logging::init_logging;
use batch_loader::models::FileMode;
use batch_loader::report::ReportMode;
use batch_loader::source::SourceFormat;

/// Batch Loader: bulk ingest of digital-library works.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/batch-loader.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "batch-loader",
    about = "Batch Loader: bulk ingest of digital-library works with retry and resume",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/batch-loader.toml")]
    config: PathBuf,

    /// Report format on stdout. Defaults to `human` on a terminal and
    /// `json` otherwise.
    #[arg(long, global = true, value_enum)]
    report: Option<ReportMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deposit every work in a batch file.
    ///
    /// Items that fail are written to `retry_ingest.csv` (or `.json`) and
    /// the command to resume from it is printed.
    Ingest(IngestArgs),

    /// Validate a batch file without depositing anything.
    ///
    /// Prints the singular/repeating field split of a CSV header and the
    /// validation status of every item.
    Check {
        /// Batch file.
        file: PathBuf,

        /// Read the file as a JSON array regardless of its extension.
        #[arg(long)]
        json: bool,

        /// Items reference their primary file by `fulltext_url`.
        #[arg(long)]
        url: bool,
    },
}

#[derive(Args)]
struct IngestArgs {
    /// Batch file (CSV, or JSON with `--json` or a `.json` extension).
    file: PathBuf,

    /// Read the file as a JSON array regardless of its extension.
    #[arg(long)]
    json: bool,

    /// Download each item's primary file from `fulltext_url`.
    #[arg(long)]
    url: bool,

    /// Deposit a TIFF derivative as the primary file.
    #[arg(long)]
    tiff: bool,

    /// Work type tag; overrides `deposit.worktype`.
    #[arg(long)]
    worktype: Option<String>,

    /// Collection to add every work to.
    #[arg(long)]
    collection: Option<String>,

    /// Debug logging; keep scratch downloads and manifests.
    #[arg(long)]
    debug: bool,

    /// Normalize and resolve every item without depositing.
    #[arg(long)]
    dry_run: bool,
}

fn file_mode(url: bool) -> FileMode {
    if url {
        FileMode::Url
    } else {
        FileMode::Local
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let report_mode = cli.report.unwrap_or_else(ReportMode::default_for_tty);

    match cli.command {
        // Needs no config
        Commands::Check { file, json, url } => {
            let _guard = init_logging(&LoggingConfig::default(), false)?;
            let format = SourceFormat::detect(&file, json);
            let report = run_check(&file, format, file_mode(url))?;
            Ok(if report.invalid == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }
        Commands::Ingest(args) => {
            let cfg = config::load_config(&cli.config)?;
            let _guard = init_logging(&cfg.logging, args.debug)?;
            let summary = run_ingest(cfg, args, report_mode).await?;
            Ok(if summary.failed == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }
    }
}

async fn run_ingest(cfg: Config, args: IngestArgs, report_mode: ReportMode) -> anyhow::Result<RunSummary> {
    let interrupt = Interrupt::new();
    let on_signal = interrupt.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; stopping after the current item");
            on_signal.trigger();
        }
    });

    let format = SourceFormat::detect(&args.file, args.json);
    let options = IngestOptions {
        mode: file_mode(args.url),
        worktype: args
            .worktype
            .clone()
            .unwrap_or_else(|| cfg.deposit.worktype.clone()),
        collection: args.collection.clone(),
        tiff: args.tiff,
        dry_run: args.dry_run,
        keep_scratch: args.debug,
        retry_dir: cfg.retry.dir.clone(),
        invocation: std::env::args().collect(),
        source_arg: args.file.to_string_lossy().to_string(),
    };
    let reporter = report_mode.reporter();
    let file = args.file;
    let keep_manifests = args.debug;

    tracing::info!(file = %file.display(), ?format, "starting ingest");
    tokio::task::spawn_blocking(move || {
        // The blocking HTTP client must be created and dropped off the runtime.
        let fetcher = HttpFetcher::new(&cfg.fetch).context("Failed to build HTTP client")?;
        let depositor = CommandDepositor::new(&cfg.deposit, keep_manifests);
        let derivative = ImageMagick::new(cfg.derivative.program.clone());
        let collab = Collaborators {
            depositor: &depositor,
            fetcher: &fetcher,
            derivative: &derivative,
            reporter: reporter.as_ref(),
        };
        let mut pipeline = IngestPipeline::new(options, collab, interrupt);
        pipeline
            .run(&file, format)
            .with_context(|| format!("Ingest of {} failed", file.display()))
    })
    .await
    .context("Ingest task panicked")?
}
