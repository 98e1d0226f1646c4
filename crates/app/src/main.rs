//! reading-log: track, log and review reading sessions from the terminal.

mod commands;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reading_core::Zone;
use reading_core::model::{BookId, SessionId};
use storage::{ApiConfig, HttpSessionRepository, InMemoryRepository, SessionRepository};
use tracing_subscriber::EnvFilter;

use commands::{AppContext, EntryArgs, TrackArgs, ViewArgs};

const DEFAULT_LOG_FILTER: &str = "reading_log=info,services=info,storage=warn";

#[derive(Parser)]
#[command(
    name = "reading-log",
    version,
    about = "Track reading sessions and review your reading history",
    long_about = "Times reading sessions against a reading-session API, records back-dated\n\
                  sessions, and summarises history per day, week and book.\n\
                  \n\
                  Examples:\n\
                    reading-log track --book 3                 # Stopwatch until Ctrl-C\n\
                    reading-log track --book 3 --countdown 20  # 20 minute countdown\n\
                    reading-log log --book 3 --start 2025-07-05T09:00 --end 2025-07-05T10:30 --pages 40\n\
                    reading-log history --group-by week --filter 30d\n\
                    reading-log stats --book 3\n\
                  \n\
                  Environment Variables:\n\
                    READING_API_BASE_URL    # API root (default http://127.0.0.1:8000)\n\
                    READING_API_TOKEN       # Token sent as `Authorization: Token <t>`\n\
                    READING_API_TIMEOUT_SECS  # Per-request timeout (default 30)\n\
                    RUST_LOG                # Log filter"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Reading-session API root
    #[arg(long, global = true, env = "READING_API_BASE_URL")]
    api_url: Option<String>,

    /// API token
    #[arg(long, global = true, env = "READING_API_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Wall-clock offset from UTC in minutes (default: this machine's zone)
    #[arg(long, global = true, allow_negative_numbers = true)]
    utc_offset: Option<i32>,

    /// Use a throwaway in-memory store instead of the API
    #[arg(long, global = true)]
    offline: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Time a reading session; Ctrl-C ends it
    Track(TrackArgs),
    /// Record a session that already happened
    Log(EntryArgs),
    /// List sessions page by page
    History(ViewArgs),
    /// Replace the fields of a session
    Edit {
        id: SessionId,
        #[command(flatten)]
        entry: EntryArgs,
    },
    /// Delete a session shown on the given page
    Delete {
        id: SessionId,
        #[command(flatten)]
        view: ViewArgs,
        /// Restore the session right after deleting it
        #[arg(long)]
        undo: bool,
    },
    /// Daily, weekly and per-book totals
    Stats {
        #[arg(long)]
        book: Option<BookId>,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn zone(utc_offset: Option<i32>) -> Result<Zone> {
    match utc_offset {
        Some(minutes) => Zone::from_offset_minutes(minutes)
            .with_context(|| format!("--utc-offset {minutes} is outside ±24h")),
        None => Ok(Zone::Local),
    }
}

fn api_config(cli: &Cli) -> ApiConfig {
    let defaults = ApiConfig::from_env();
    ApiConfig {
        base_url: cli.api_url.clone().unwrap_or(defaults.base_url),
        token: cli
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or(defaults.token),
        timeout: defaults.timeout,
    }
}

fn repository(offline: bool, config: ApiConfig) -> Result<Arc<dyn SessionRepository>> {
    if offline {
        tracing::info!("using in-memory session store");
        return Ok(Arc::new(InMemoryRepository::new()));
    }
    tracing::debug!(base_url = %config.base_url, "using reading-session api");
    let repo = HttpSessionRepository::new(config).context("Failed to build HTTP client")?;
    Ok(Arc::new(repo))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = api_config(&cli);
    let ctx = AppContext {
        zone: zone(cli.utc_offset)?,
        request_timeout: config.timeout,
        repo: repository(cli.offline, config)?,
    };

    match cli.command {
        Command::Track(args) => commands::track(&ctx, args).await,
        Command::Log(entry) => commands::log(&ctx, entry).await,
        Command::History(view) => commands::history(&ctx, view).await,
        Command::Edit { id, entry } => commands::edit(&ctx, id, entry).await,
        Command::Delete { id, view, undo } => commands::delete(&ctx, id, view, undo).await,
        Command::Stats { book } => commands::stats(&ctx, book).await,
    }
}
