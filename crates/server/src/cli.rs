//! Command-line surface: the `serve` daemon plus one verb per fleet command.

use std::path::PathBuf;
use std::time::Duration;

use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::client::{ApiClient, CliError};
use crate::commands;

const DEFAULT_API_URL: &str = "http://127.0.0.1:7340";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Parser)]
#[command(name = "tamer", version, about = "Torrent fleet orchestration and automation")]
pub struct Cli {
    /// Daemon base URL
    #[arg(long, global = true, env = "TAMER_URL", default_value = DEFAULT_API_URL)]
    pub url: String,

    /// HTTP timeout for daemon requests, in seconds
    #[arg(
        long,
        global = true,
        env = "TAMER_HTTP_TIMEOUT_SECS",
        default_value_t = DEFAULT_TIMEOUT_SECS
    )]
    pub timeout: u64,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the daemon (HTTP API and background loops)
    Serve {
        #[arg(long, env = "TAMER_CONFIG", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Add a magnet link, URL or .torrent path
    Add {
        source: String,
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=7))]
        priority: Option<u8>,
        #[arg(long)]
        sequential: bool,
    },
    /// List the fleet
    List {
        /// queued, checking, downloading, seeding, paused or error
        #[arg(long)]
        status: Option<String>,
        /// Poll the engine instead of showing cached status
        #[arg(long)]
        refresh: bool,
    },
    Pause { id: u64 },
    Resume { id: u64 },
    Remove {
        id: u64,
        #[arg(long)]
        delete_data: bool,
    },
    /// Set torrent priority (0-7)
    Priority {
        id: u64,
        #[arg(allow_negative_numbers = true)]
        level: i64,
    },
    /// Set one file's priority (0-7)
    FilePriority {
        id: u64,
        file_index: usize,
        #[arg(allow_negative_numbers = true)]
        level: i64,
    },
    AddTrackers {
        id: u64,
        #[arg(required = true)]
        urls: Vec<String>,
    },
    RemoveTrackers {
        id: u64,
        #[arg(required = true)]
        urls: Vec<String>,
    },
    Sequential {
        id: u64,
        #[command(flatten)]
        toggle: Toggle,
    },
    SuperSeeding {
        id: u64,
        #[command(flatten)]
        toggle: Toggle,
    },
    ForceRecheck { id: u64 },
    /// Cap one torrent's download rate in KB/s (0 = unlimited)
    DownloadLimit { id: u64, kbps: u64 },
    /// Cap one torrent's upload rate in KB/s (0 = unlimited)
    UploadLimit { id: u64, kbps: u64 },
    /// Move a torrent's data to another directory
    Move { id: u64, path: String },
    /// Case-insensitive name search
    Search { query: String },
    /// Detailed view with files and peers
    Info { id: u64 },
    /// Fleet totals and today's rollup
    Stats,
    /// Write the .torrent metainfo to a file
    Export { id: u64, output: PathBuf },
    /// Refresh the fleet view until Ctrl+C
    Monitor {
        /// Refresh interval in seconds
        #[arg(long, default_value_t = 2)]
        interval: u64,
        /// Show the piece map of the first torrent
        #[arg(long)]
        pieces: bool,
        /// Show the peers of the first torrent
        #[arg(long)]
        peers: bool,
    },
}

#[derive(Debug, Clone, Copy, Args)]
#[group(required = true, multiple = false)]
pub struct Toggle {
    #[arg(long)]
    pub enable: bool,
    #[arg(long)]
    pub disable: bool,
}

impl Toggle {
    pub fn enabled(&self) -> bool {
        self.enable && !self.disable
    }
}

fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Parse arguments, run the command and return the process exit code.
pub async fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
        }
    };

    if let Command::Serve { config } = &cli.command {
        init_tracing("info,tower_http=debug");
        return match crate::serve::serve(config).await {
            Ok(()) => 0,
            Err(e) => {
                tracing::error!("Fatal error: {:#}", e);
                1
            }
        };
    }

    init_tracing("warn");
    match dispatch(cli).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {}", e);
            e.exit_code()
        }
    }
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let client = ApiClient::new(&cli.url, Duration::from_secs(cli.timeout))?;
    commands::execute(&client, cli.command, cli.json).await
}
