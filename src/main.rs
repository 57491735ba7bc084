mod gateway;

use clap::{Parser, Subcommand};
use courier_backend::{ClaudeCodeBackend, TaskRunner};
use courier_core::{
    config::{self, shellexpand},
    traits::{Backend, Transport},
};
use courier_state::{CursorStore, SessionStore};
use courier_transports::{TeamsTransport, TelegramTransport};
use gateway::{Gateway, TransportEntry};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "courier",
    version,
    about = "Courier — relay between chat transports and the claude CLI"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "courier.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay.
    Start,
    /// Check backend availability and transport configuration.
    Status,
    /// Send a one-shot prompt to the backend.
    Ask {
        /// The prompt to send.
        #[arg(trailing_var_arg = true)]
        message: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.courier.log_level)),
        )
        .init();

    // Refuse to run as root — the claude CLI rejects root for security.
    if unsafe { libc::geteuid() } == 0 {
        anyhow::bail!("courier must not run as root. Run it as a regular user service.");
    }

    match cli.command {
        Commands::Start => {
            let backend = ClaudeCodeBackend::from_config(
                cfg.backend.binary.clone(),
                cfg.backend.timeout_secs,
            );
            if !backend.is_available().await {
                anyhow::bail!(
                    "backend '{}' is not available. Is the claude CLI installed and in PATH?",
                    cfg.backend.binary
                );
            }

            let data_dir = PathBuf::from(shellexpand(&cfg.courier.data_dir));
            std::fs::create_dir_all(&data_dir)?;

            let sessions = Arc::new(SessionStore::open(data_dir.join("sessions.json"))?);
            let entries = build_transports(&cfg, &data_dir)?;

            let runner = TaskRunner::new(
                shellexpand(&cfg.tasks.runner_path),
                cfg.tasks.model.clone(),
                cfg.tasks.timeout_secs,
                data_dir.join("tasks"),
            );

            println!("Courier — starting relay...");
            let gw = Gateway::new(
                &cfg,
                entries,
                Arc::new(backend),
                Arc::new(runner),
                sessions,
            );
            gw.run().await?;
        }
        Commands::Status => {
            println!("Courier — Status Check\n");
            println!("Config: {}", cli.config);
            println!("Backend: {} (model {})", cfg.backend.binary, cfg.backend.model);
            println!();

            let available = ClaudeCodeBackend::check_cli(&cfg.backend.binary).await;
            println!(
                "  {}: {}",
                cfg.backend.binary,
                if available { "available" } else { "not found" }
            );
            println!();

            match cfg.transport.telegram {
                Some(ref tg) => println!(
                    "  telegram: {}",
                    if tg.enabled && !tg.bot_token.is_empty() {
                        "configured"
                    } else if tg.enabled {
                        "enabled but missing bot_token"
                    } else {
                        "disabled"
                    }
                ),
                None => println!("  telegram: not configured"),
            }
            match cfg.transport.teams {
                Some(ref teams) => {
                    let missing = teams.missing_credentials();
                    println!(
                        "  teams: {}",
                        if teams.enabled && missing.is_empty() {
                            "configured".to_string()
                        } else if teams.enabled {
                            format!("enabled but missing {}", missing.join(", "))
                        } else {
                            "disabled".to_string()
                        }
                    );
                }
                None => println!("  teams: not configured"),
            }
        }
        Commands::Ask { message } => {
            if message.is_empty() {
                anyhow::bail!("no message provided. Usage: courier ask <message>");
            }
            let prompt = message.join(" ");

            let backend = ClaudeCodeBackend::from_config(
                cfg.backend.binary.clone(),
                cfg.backend.timeout_secs,
            );
            if !backend.is_available().await {
                anyhow::bail!(
                    "backend '{}' is not available. Is the claude CLI installed and authenticated?",
                    cfg.backend.binary
                );
            }

            let turn = backend
                .invoke(&prompt, None, &cfg.backend.model, &cfg.backend.system_prompt)
                .await;
            println!("{}", turn.reply);
        }
    }

    Ok(())
}

/// Build the enabled transports with their cursor stores and pacing.
fn build_transports(
    cfg: &config::Config,
    data_dir: &std::path::Path,
) -> anyhow::Result<Vec<TransportEntry>> {
    let mut entries = Vec::new();

    if let Some(ref tg) = cfg.transport.telegram {
        if tg.enabled {
            if tg.bot_token.is_empty() {
                anyhow::bail!(
                    "Telegram is enabled but bot_token is empty. \
                     Set it in the config file or the TELEGRAM_BOT_TOKEN env var."
                );
            }
            let cursors = Arc::new(CursorStore::open(data_dir.join("telegram-cursor.json"))?);
            entries.push(TransportEntry {
                transport: Arc::new(TelegramTransport::new(tg.clone())) as Arc<dyn Transport>,
                cursors,
                // getUpdates long-polls, no extra pacing needed.
                pace: Duration::ZERO,
            });
        }
    }

    if let Some(ref teams) = cfg.transport.teams {
        if teams.enabled {
            let missing = teams.missing_credentials();
            if !missing.is_empty() {
                anyhow::bail!(
                    "Teams is enabled but credentials are missing: {}",
                    missing.join(", ")
                );
            }
            let cursors = Arc::new(CursorStore::open(data_dir.join("teams-cursor.json"))?);
            entries.push(TransportEntry {
                transport: Arc::new(TeamsTransport::new(teams.clone())) as Arc<dyn Transport>,
                cursors,
                pace: Duration::from_secs(teams.poll_interval_secs),
            });
        }
    }

    if entries.is_empty() {
        anyhow::bail!("No transports enabled. Enable at least one transport in the config file.");
    }

    Ok(entries)
}
