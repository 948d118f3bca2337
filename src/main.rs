//! # Dayline CLI (`dayline`)
//!
//! The `dayline` binary initializes the database, loads therapy-device days,
//! imports oximetry and health-API files, and inspects the stored timeline.
//!
//! ## Usage
//!
//! ```bash
//! dayline --config ./config/dayline.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dayline init` | Create the SQLite database and run schema migrations |
//! | `dayline sources` | Show the import root and the registered decoders |
//! | `dayline load-days <file>` | Load device days from a JSON file |
//! | `dayline import` | Decode import files and reconcile them into stored days |
//! | `dayline show [date]` | Print one stored day |
//! | `dayline export` | Dump stored days as JSON |
//! | `dayline stats` | Database statistics |
//!
//! Logging is controlled with `RUST_LOG` and written to stderr.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::warn;

use dayline::import::CancelFlag;
use dayline::progress::ProgressMode;
use dayline::{config, export, ingest, migrate, show, sources, stats};

/// Dayline CLI: reconcile imported sleep-therapy sessions into one timeline
/// per day.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/dayline.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "dayline",
    about = "Dayline: reconcile therapy-device, oximetry, and health-API sessions into per-day timelines",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dayline.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it on an existing database is safe.
    Init,

    /// Show the filesystem import root and the registered decoders.
    Sources,

    /// Import files from the configured root and merge them into stored days.
    ///
    /// Only days that already exist are updated. The whole run is one
    /// transaction: on any failure nothing is written.
    Import {
        /// Consider batches ending on or after this date (YYYY-MM-DD),
        /// instead of resuming from the most recent imported day.
        #[arg(long)]
        since: Option<String>,

        /// Reconcile everything, then roll back instead of committing.
        #[arg(long)]
        dry_run: bool,

        /// Progress output on stderr: off, human, or json.
        /// Defaults to human when stderr is a terminal.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Load therapy-device days from a JSON file.
    ///
    /// Accepts a JSON array of days or the output of `dayline export`.
    LoadDays {
        /// Path to the JSON file.
        file: PathBuf,
    },

    /// Print one stored day (the most recent when no date is given).
    Show {
        /// Report date (YYYY-MM-DD).
        date: Option<String>,
    },

    /// Export stored days as JSON.
    Export {
        /// First report date to include (YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,

        /// Last report date to include (YYYY-MM-DD).
        #[arg(long)]
        until: Option<String>,

        /// Output file. Writes to stdout when omitted.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show database statistics.
    Stats,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            let registry = dayline::decoders::DecoderRegistry::with_builtins();
            sources::list_sources(&cfg, &registry)?;
        }
        Commands::Import {
            since,
            dry_run,
            progress,
        } => {
            let mode = match progress {
                Some(value) => ProgressMode::parse(&value)?,
                None => ProgressMode::default_for_tty(),
            };

            let cancel = CancelFlag::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, cancelling import");
                    on_interrupt.cancel();
                }
            });

            ingest::run_import(&cfg, since.as_deref(), dry_run, mode, cancel).await?;
        }
        Commands::LoadDays { file } => {
            ingest::run_load_days(&cfg, &file).await?;
        }
        Commands::Show { date } => {
            show::run_show(&cfg, date.as_deref()).await?;
        }
        Commands::Export {
            since,
            until,
            output,
        } => {
            export::run_export(&cfg, since.as_deref(), until.as_deref(), output.as_deref())
                .await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
