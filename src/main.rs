//! chat-relay - moderated streaming relay for OpenAI-compatible chat completions
//!
//! Loads `.env`, configuration and the banned word list, then serves the chat
//! endpoints. A missing or malformed word list stops startup.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_relay::config::Config;
use chat_relay::moderation::BannedStemSet;
use chat_relay::proxy::run_server;

#[derive(Parser)]
#[command(name = "chat-relay")]
#[command(about = "Moderated streaming relay for OpenAI-compatible chat completions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server
    Serve {
        /// Path to an optional TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override listen address (host:port)
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration and the banned word list, then exit
    Check {
        /// Path to an optional TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("chat_relay={},tower_http=info", level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Report the outcome of loading `.env`, once tracing is up.
fn log_dotenv(result: Result<PathBuf, dotenvy::Error>) {
    match result {
        Ok(path) => tracing::info!(path = %path.display(), "Loaded environment from .env"),
        Err(e) if e.not_found() => tracing::debug!("No .env file found"),
        Err(e) => tracing::warn!(error = %e, "Ignoring unreadable .env file"),
    }
}

fn load(config: Option<&PathBuf>) -> anyhow::Result<(Config, BannedStemSet)> {
    let config = Config::load(config.map(PathBuf::as_path)).context("Failed to load configuration")?;
    let banned = BannedStemSet::load(&config.moderation.banned_words_path)
        .context("Refusing to start without a valid banned word list")?;
    Ok((config, banned))
}

/// Peek at the log level before tracing is up, so config warnings are visible.
fn early_log_level(config: Option<&PathBuf>) -> String {
    config
        .and_then(|path| Config::load_with(Some(path.as_path()), |_| None).ok())
        .map(|c| c.logging.level)
        .unwrap_or_else(|| "info".to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let dotenv = dotenvy::dotenv();

    match cli.command {
        Commands::Serve { config, listen } => {
            init_tracing(&early_log_level(config.as_ref()));
            log_dotenv(dotenv);
            tracing::info!(config = ?config, "Loading configuration");

            let (config, banned) = load(config.as_ref())?;
            let listen_addr = match listen {
                Some(addr) => {
                    tracing::info!(listen = %addr, "Override listen address");
                    addr
                }
                None => config.server.listen_addr(),
            };

            run_server(config, banned, listen_addr).await
        }

        Commands::Check { config } => {
            init_tracing(&early_log_level(config.as_ref()));
            log_dotenv(dotenv);

            let (config, banned) = load(config.as_ref())?;
            println!("Configuration OK");
            println!("  listen:        {}", config.server.listen_addr());
            println!("  upstream:      {}", config.upstream.base_url);
            println!("  model:         {}", config.upstream.model);
            println!("  temperature:   {}", config.upstream.temperature);
            println!("  max tokens:    {}", config.upstream.max_tokens);
            println!(
                "  api key:       {}",
                if config.upstream.api_key.is_some() { "set" } else { "missing" }
            );
            println!("  flush policy:  {:?}", config.stream.flush_policy);
            println!(
                "  banned stems:  {} (from {})",
                banned.len(),
                config.moderation.banned_words_path.display()
            );
            Ok(())
        }
    }
}
