//! push-session - connect a device to its push notification topics and log
//! everything that arrives

use clap::{Parser, Subcommand};
use push_session::config::PushConfig;
use push_session::credentials::derive_credential;
use push_session::observability::init_default_logging;
use push_session::session::{Dispatch, LoggingActions, Session, SessionState};
use push_session::transport::mqtt::MqttTransport;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::{
    signal,
    time::{sleep, Duration, Instant},
};
use tracing::{error, info, warn};

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["push-session.toml", "config/push-session.toml"];
const DISCONNECT_GRACE: Duration = Duration::from_secs(5);

/// Durable MQTT push notification session
#[derive(Parser)]
#[command(name = "push-session")]
#[command(about = "Durable MQTT push notification session with derived device credentials")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "PUSH_SESSION_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and log notifications until interrupted
    Run,
    /// Validate configuration
    Config {
        /// Print the resolved configuration and derived username
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_default_logging() {
        eprintln!("Failed to initialise logging: {e}");
    }

    info!("Starting push-session v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_session(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: Option<&PathBuf>,
) -> Result<PushConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(PushConfig::load_from_file(path)?);
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(PushConfig::load_from_file(&path)?);
        }
    }

    Err("no configuration file found; pass -c/--config or create push-session.toml".into())
}

async fn run_session(config: PushConfig) -> Result<(), Box<dyn std::error::Error>> {
    let device_id = config.device_id()?;
    let store = config.salt_store()?;
    info!(salt_store = %store.path().display(), "Deriving device credential");
    let credential = derive_credential(&device_id, &store)?;

    let session = Session::start(
        config.session_settings(),
        &credential,
        Arc::new(MqttTransport::new()),
        Arc::new(LoggingActions),
    )?;
    info!(client_id = session.client_id(), "Session started");

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
    }

    if session.disconnect() == Dispatch::Issued {
        wait_for_disconnect(&session).await;
    }
    Ok(())
}

async fn wait_for_disconnect(session: &Session<MqttTransport>) {
    let deadline = Instant::now() + DISCONNECT_GRACE;
    while session.state() == SessionState::Disconnecting {
        if Instant::now() >= deadline {
            warn!("Timed out waiting for the broker to acknowledge disconnect");
            return;
        }
        sleep(Duration::from_millis(50)).await;
    }
}

fn handle_config_command(
    config: &PushConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);

        match config.device_id() {
            Ok(device_id) => println!("Username: {device_id}"),
            Err(e) => println!("Username: unavailable ({e})"),
        }
    }

    info!("Configuration validation complete");
    Ok(())
}
