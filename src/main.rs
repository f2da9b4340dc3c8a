//! transfer-monitor command line front end

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use transfer_monitor::application::{PollerState, SessionController};
use transfer_monitor::domain::{SessionKind, StaticToken};
use transfer_monitor::infrastructure::logging::{init_logging_with_config, log_system_info};
use transfer_monitor::infrastructure::{ApiClient, AppConfig, ConfigManager, ConsoleSink};

#[derive(Parser, Debug)]
#[command(name = "transfer-monitor", version, about = "Follow remote download jobs from the terminal")]
struct Cli {
    /// Config file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override `api.base_url`
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Bearer token for the download service
    #[arg(long, global = true, env = "TRANSFER_MONITOR_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Override `logging.level`
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resume monitoring of a running job and follow it to the end
    Watch {
        /// Start a batch session even if the job is not active yet
        #[arg(long)]
        wait: bool,
    },
    /// Print the saved download state
    State,
    /// Cancel the running job
    Cancel,
    /// Resume the saved job and follow it
    Resume,
    /// Clear completed entries on the server
    Clear,
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let mut config = manager.load_config()?;

    if let Some(base_url) = &cli.base_url {
        config.api.base_url.clone_from(base_url);
    }
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    config.validate().context("Invalid configuration after command line overrides")?;
    Ok(config)
}

/// Block until the session ends or the user hits Ctrl-C
async fn follow(controller: &SessionController) -> Result<PollerState> {
    if !controller.status().await.poller.is_running() {
        info!("Nothing to follow");
        return Ok(controller.status().await.poller);
    }

    let state = tokio::select! {
        state = controller.wait_until_stopped() => state,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            warn!("Interrupted, stopping monitoring");
            controller.stop_monitoring("interrupted").await;
            controller.status().await.poller
        }
    };
    Ok(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging_with_config(config.logging.clone())?;
    log_system_info();

    let api = Arc::new(ApiClient::new(&config.api, Arc::new(StaticToken::new(cli.token.clone())))?);
    info!("🌐 Download service: {}", api.base_url());

    let sink = Arc::new(ConsoleSink::stdout(config.monitor.file_stall_threshold()));
    let controller = SessionController::new(api.clone(), sink, config.monitor.clone()).with_control(api);

    let final_state = match cli.command {
        Command::Watch { wait } => {
            let state = controller.resume_on_load().await;
            let running = controller.status().await.poller.is_running();
            if !running && wait {
                controller.start_monitoring(SessionKind::Batch).await;
            } else if !running {
                match state {
                    Some(state) if state.is_resumable() => println!(
                        "Saved session for {} can be resumed ({}/{} files), run `transfer-monitor resume`",
                        state.channel.as_deref().unwrap_or("?"),
                        state.completed_count,
                        state.total
                    ),
                    _ => println!("No active download"),
                }
            }
            follow(&controller).await?
        }
        Command::State => {
            let state = controller.download_state().await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
            return Ok(());
        }
        Command::Cancel => {
            controller.cancel_download().await?;
            return Ok(());
        }
        Command::Resume => {
            controller.resume_download().await?;
            follow(&controller).await?
        }
        Command::Clear => {
            controller.clear_completed_remote().await?;
            return Ok(());
        }
    };

    info!("Final poller state: {:?}", final_state);
    if let PollerState::FatalError { consecutive_errors } = final_state {
        bail!("Gave up after {consecutive_errors} consecutive failed polls");
    }
    Ok(())
}
