//! # winmap - window registry and controller
//!
//! Command line front end for the winmap library:
//! - `replay`: run a scenario against a headless desktop and print every
//!   published event as a JSON line
//! - `check-config`: validate the configuration and print the effective
//!   settings

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use winmap::{PublishedEvent, Scenario, WinmapConfig};

#[derive(Parser)]
#[command(name = "winmap")]
#[command(about = "Window registry and window-control core for a tiling window manager")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "~/.config/winmap/winmap.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario file against a headless desktop
    Replay {
        /// Scenario file (TOML)
        scenario: PathBuf,

        /// Keep the mapper alive after the script until SIGINT/SIGTERM
        #[arg(long)]
        hold: bool,
    },

    /// Load and validate the configuration, then print it
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = WinmapConfig::load(&cli.config);
    let debug = cli.debug || loaded.as_ref().map(|c| c.general.debug).unwrap_or(false);

    // Initialize logging
    if debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    info!("🪟 Starting winmap {}", winmap::VERSION);

    match cli.command {
        Commands::CheckConfig => {
            let config = loaded
                .with_context(|| format!("Configuration at {} is not usable", cli.config))?;
            print!("{}", toml::to_string_pretty(&config).context("Failed to serialize configuration")?);
            info!("✅ Configuration at {} is valid", cli.config);
            Ok(())
        }
        Commands::Replay { scenario, hold } => {
            let config = match loaded {
                Ok(config) => {
                    info!("✅ Configuration loaded from: {}", cli.config);
                    config
                }
                Err(e) => {
                    error!("❌ Failed to load configuration: {:#}", e);
                    info!("📝 Using default configuration");
                    WinmapConfig::default()
                }
            };
            replay(&config, &scenario, hold).await
        }
    }
}

async fn replay(config: &WinmapConfig, path: &Path, hold: bool) -> Result<()> {
    let scenario = Scenario::load(path)?;
    info!(
        "📄 Replaying {} ({} window(s), {} event(s))",
        path.display(),
        scenario.windows.len(),
        scenario.events.len()
    );

    let (tx, mut rx) = mpsc::unbounded_channel::<PublishedEvent>();
    let mut session = scenario.session(config, Box::new(tx))?;
    print_published(&mut rx)?;

    for event in &scenario.events {
        session.play(std::slice::from_ref(event));
        print_published(&mut rx)?;
    }

    if hold {
        info!("⏸️  Script finished; holding until SIGINT/SIGTERM");
        wait_for_shutdown_signal().await?;
    }

    let report = session.finish();
    print_published(&mut rx)?;
    info!(
        "👋 Replay done: {} tracked, {} restored, {} native call(s)",
        report.tracked, report.restored, report.native_calls
    );
    Ok(())
}

/// Writes every event published so far as one JSON line.
fn print_published(rx: &mut mpsc::UnboundedReceiver<PublishedEvent>) -> Result<()> {
    while let Ok(event) = rx.try_recv() {
        println!("{}", serde_json::to_string(&event).context("Failed to encode event")?);
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => info!("📨 Received SIGTERM - shutting down gracefully"),
        _ = sigint.recv() => info!("📨 Received SIGINT (Ctrl+C) - shutting down gracefully"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("📨 Received Ctrl+C - shutting down gracefully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["winmap", "check-config"]).unwrap();
        assert!(!cli.debug);
        assert_eq!(cli.config, "~/.config/winmap/winmap.toml");
        assert!(matches!(cli.command, Commands::CheckConfig));
    }

    #[test]
    fn test_cli_replay_flags() {
        let cli = Cli::try_parse_from([
            "winmap",
            "replay",
            "demo.toml",
            "--hold",
            "--debug",
            "--config",
            "/tmp/winmap.toml",
        ])
        .unwrap();
        assert!(cli.debug);
        assert_eq!(cli.config, "/tmp/winmap.toml");
        match cli.command {
            Commands::Replay { scenario, hold } => {
                assert_eq!(scenario, PathBuf::from("demo.toml"));
                assert!(hold);
            }
            Commands::CheckConfig => panic!("expected replay"),
        }
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["winmap"]).is_err());
    }
}
