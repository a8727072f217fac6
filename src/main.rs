//! pairgate CLI: pairing portal server, self-check, and terminal pairing.
//!
//! Subcommands:
//! - `start` (default): serve the HTTP and realtime pairing portal
//! - `check`: verify config, sessions directory, and listener port
//! - `pair`: pair one number interactively from the terminal

mod api;
mod gateway;
mod pair;
mod realtime;
mod selfcheck;

use clap::{Parser, Subcommand};
use pairgate_core::{config::Config, config::LoggingConfig, shellexpand};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "pairgate",
    version,
    about = "WhatsApp linked-device pairing portal"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, default_value = "config.toml", env = "PAIRGATE_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the pairing portal (default).
    Start,
    /// Run startup checks and exit.
    Check,
    /// Pair a phone number interactively.
    Pair {
        /// Phone number: 10-15 digits, no `+`.
        phone: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command.unwrap_or(Commands::Start) {
        Commands::Start => {
            let _guard = init_logging(&config.logging, &config.logging.level)?;
            gateway::Gateway::new(config).run().await
        }
        Commands::Check => {
            let _guard = init_logging(&config.logging, "warn")?;
            if selfcheck::run(&config).await {
                Ok(())
            } else {
                anyhow::bail!("self-check failed")
            }
        }
        Commands::Pair { phone } => {
            // Keep the terminal UI readable: only warnings unless RUST_LOG says otherwise.
            let _guard = init_logging(&config.logging, "warn")?;
            pair::pair_number(&config, &phone).await
        }
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `default_level`. When `logging.dir` is set, a daily
/// rolling file is written alongside stderr; the returned guard flushes it.
fn init_logging(
    config: &LoggingConfig,
    default_level: &str,
) -> anyhow::Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
    let stderr = fmt::layer().with_writer(std::io::stderr);

    if config.dir.is_empty() {
        tracing_subscriber::registry().with(filter).with(stderr).init();
        return Ok(None);
    }

    let dir = shellexpand(&config.dir);
    std::fs::create_dir_all(&dir)?;
    let appender = tracing_appender::rolling::daily(&dir, "pairgate.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .init();
    Ok(Some(guard))
}
