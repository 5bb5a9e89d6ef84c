//! teleop - operator CLI
//!
//! Thin driving surface over the session controller: connects to the broker
//! from the config file, subscribes to the device status filter, and turns
//! stdin lines (`forward`/`left`/`right`/`stop`) into published commands.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use teleop::config::TeleopConfig;
use teleop::drive::DriveCommand;
use teleop::observability::init_default_logging;
use teleop::session::{ConnectResult, DisconnectReason, SessionController};
use teleop::SessionError;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

/// Tele-operate a remote device over MQTT
#[derive(Parser)]
#[command(name = "teleop")]
#[command(about = "Drive a remote device through an MQTT broker")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and drive the device interactively from stdin
    Run,
    /// Validate configuration
    Config {
        /// Show the resolved configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_default_logging();

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load configuration: {e}");
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_session(config).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("command failed: {e}");
        process::exit(1);
    }
}

fn load_configuration(config_path: &Option<PathBuf>) -> Result<TeleopConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("loading configuration from {}", path.display());
            Ok(TeleopConfig::load_from_file(path)?)
        }
        None => {
            for candidate in ["teleop.toml", "config/teleop.toml"] {
                let path = PathBuf::from(candidate);
                if path.exists() {
                    info!("loading configuration from {}", path.display());
                    return Ok(TeleopConfig::load_from_file(&path)?);
                }
            }
            Err("no configuration file found; pass one with -c/--config or create teleop.toml".into())
        }
    }
}

async fn run_session(config: TeleopConfig) -> Result<(), Box<dyn std::error::Error>> {
    let session = SessionController::new(&config.device.name, &config.session)?;

    session.on_connect(|result| match result {
        ConnectResult::Connected => info!("connected to broker"),
        ConnectResult::Failed(reason) => warn!("connection failed: {reason}"),
    })?;
    session.on_disconnect(|reason| match reason {
        DisconnectReason::Requested => info!("disconnected"),
        DisconnectReason::Link(reason) => warn!("connection lost: {reason}"),
    })?;
    session.on_message(&config.device.status_filter, |topic, payload, _qos| {
        // The device echoes the active command as the payload's first byte.
        match DriveCommand::from_payload(payload) {
            Some(command) => info!(%topic, state = %command, "device status"),
            None => info!(%topic, payload = %String::from_utf8_lossy(payload), "device status"),
        }
    })?;

    session.subscribe(&config.device.status_filter, session.default_qos())?;
    session.connect(&config.session.broker_url)?;

    if let Err(SessionError::ConnectTimeout) =
        session.wait_connected(Duration::from_secs(10)).await
    {
        // Keep going: commands queue while the session keeps retrying.
        warn!("broker not reachable yet, commands will be queued");
    }

    println!("commands: forward (f), left (l), right (r), stop (s), quit (q)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                if matches!(input, "quit" | "q" | "exit") {
                    break;
                }
                match DriveCommand::parse(input) {
                    Some(command) => {
                        session.publish(
                            &config.device.command_topic,
                            command.payload(),
                            session.default_qos(),
                            false,
                        )?;
                        info!(command = %command, "command sent");
                    }
                    None => println!("unknown command: {input}"),
                }
            }
        }
    }

    session.disconnect()?;
    let snapshot = session.metrics().snapshot();
    info!(
        published = snapshot.messages_published,
        received = snapshot.messages_received,
        reconnects = snapshot.unsolicited_drops,
        "session closed"
    );
    Ok(())
}

fn handle_config_command(
    config: TeleopConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    println!("configuration is valid");
    if show {
        println!("{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}
