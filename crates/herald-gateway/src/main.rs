use clap::{Parser, Subcommand};
use tracing::info;

use herald_core::config::HeraldConfig;

mod jobs;
mod router;
mod serve;

#[derive(Parser)]
#[command(name = "herald")]
#[command(author, version, about = "Cron-driven notification service for Telegram")]
struct Cli {
    /// Path to herald.toml (defaults to $HERALD_CONFIG, then ~/.herald/herald.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler, dispatcher and Telegram bot
    Serve,
    /// Edit the job catalog; a running server picks changes up on its next sync
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum JobsAction {
    /// List every job
    List,
    /// Create a job
    Add {
        /// Task name, e.g. `notify:send`
        #[arg(long)]
        name: String,
        /// Cron expression (5 or 6 fields)
        #[arg(long)]
        cron: String,
        /// JSON payload handed to the task
        #[arg(long)]
        payload: Option<String>,
        /// Task option as type=value; repeatable
        #[arg(long = "option", value_name = "TYPE=VALUE")]
        options: Vec<String>,
        /// Create the job disabled
        #[arg(long)]
        disabled: bool,
    },
    /// Enable a job
    Enable { id: String },
    /// Disable a job
    Disable { id: String },
    /// Delete a job
    Remove { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "herald_gateway=info,herald_scheduler=info,herald_dispatch=info".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // explicit --config > HERALD_CONFIG env > ~/.herald/herald.toml
    let config_path = cli.config.or_else(|| std::env::var("HERALD_CONFIG").ok());
    let config = HeraldConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        HeraldConfig::default()
    });

    match cli.command {
        Some(Commands::Serve) | None => {
            info!(version = env!("CARGO_PKG_VERSION"), "starting herald");
            serve::run(config).await
        }
        Some(Commands::Jobs { action }) => jobs::run(&config, action),
    }
}

/// Open the SQLite database, creating its directory and enabling WAL.
pub(crate) fn open_db(path: &str) -> anyhow::Result<rusqlite::Connection> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = rusqlite::Connection::open(path)?;
    db.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(db)
}
