use chrono::Utc;
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use pico_link::config::{Config, ConfigLoader, LogFormat};
use pico_link::port::{system_lister, PortLister, PortResolver};
use pico_link::{callback, DeviceFacade, Debouncer};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "pico-link",
    version,
    about = "Talk to a Pico RFID/LED board over USB serial.",
    long_about = "Connects to a Raspberry Pi Pico running the RFID/LED firmware, falling back to a simulated board when none is reachable. Tag reads are printed as JSON lines on stdout; logs go to stderr."
)]
struct Args {
    /// Configuration file (default: PICO_LINK_CONFIG, ./pico-link.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use the simulated board even if hardware is present
    #[arg(long, global = true)]
    simulate: bool,

    /// Serial port to use instead of auto-detection
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print tag reads until interrupted (default)
    Monitor,
    /// Connect and print the device status as JSON
    Status,
    /// Show an indicator state (reading, processing, success, error, idle, off)
    Light {
        state: String,
        #[arg(short, long, default_value_t = 100)]
        brightness: u8,
    },
    /// List serial ports and show which one would be used
    Ports,
    /// Write a configuration file with default values
    InitConfig {
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

// --- Main Application Entry Point ---
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(Cmd::InitConfig { path, force }) = &args.command {
        return init_config(path, *force);
    }

    let config = load_config(&args)?;
    init_logging(&config, args.log_level.is_some());

    match args.command.unwrap_or(Cmd::Monitor) {
        Cmd::Monitor => run_monitor(config).await,
        Cmd::Status => run_status(config).await,
        Cmd::Light { state, brightness } => run_light(config, &state, brightness).await,
        Cmd::Ports => run_ports(&config),
        Cmd::InitConfig { .. } => Ok(()),
    }
}

fn load_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let loader = match args.config {
        Some(ref path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    let mut config = loader.into_config();

    if args.simulate {
        config.simulation.enabled = true;
    }
    if let Some(ref port) = args.port {
        config.device.port = port.clone();
    }
    if let Some(ref level) = args.log_level {
        config.logging.level = level.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Logs go to stderr so stdout stays machine-readable. `RUST_LOG` wins over
/// the configured level unless `--log-level` was given.
fn init_logging(config: &Config, level_from_cli: bool) {
    let configured = || EnvFilter::new(format!("pico_link={},warn", config.logging.level));
    let filter = if level_from_cli {
        configured()
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| configured())
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    let registry = tracing_subscriber::registry().with(filter);
    match config.logging.format {
        LogFormat::Json => registry.with(layer.json()).init(),
        LogFormat::Compact => registry.with(layer.compact()).init(),
        LogFormat::Pretty => registry.with(layer.pretty()).init(),
    }
}

async fn run_monitor(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let heartbeat = config.device.heartbeat_interval();
    let debouncer = Arc::new(Mutex::new(Debouncer::new(config.device.debounce_window())));
    let mut facade = DeviceFacade::new(config);

    if !facade.connect().await {
        return Err("could not connect to a live or simulated device".into());
    }
    if facade.is_simulated() {
        warn!("Running against the simulated board");
    }

    let on_tag = callback(move |tag| {
        if debouncer.lock().accept(tag) {
            println!("{}", json!({ "event": "rfid", "tag": tag, "at": Utc::now() }));
        }
        Ok(())
    });
    if !facade.start_monitoring(on_tag) {
        facade.disconnect().await;
        return Err("RFID monitoring could not be started".into());
    }
    facade.set_indicator("reading", 50).await;
    info!("Waiting for tags, press Ctrl+C to stop");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    if heartbeat.is_zero() {
        shutdown.await;
    } else {
        let mut ticker = tokio::time::interval(heartbeat);
        // First tick fires immediately; the handshake just refreshed status.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let response = facade.refresh_status().await;
                    if !response.is_ok() {
                        warn!("Heartbeat failed: {}", response.message().unwrap_or("unknown error"));
                    }
                }
            }
        }
    }

    facade.stop_monitoring().await;
    if facade.is_connected() {
        facade.set_indicator("off", 0).await;
    }
    facade.disconnect().await;
    Ok(())
}

async fn run_status(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut facade = DeviceFacade::new(config);
    let connected = facade.connect().await;
    println!("{}", serde_json::to_string_pretty(&facade.status())?);
    facade.disconnect().await;

    if connected {
        Ok(())
    } else {
        Err("not connected".into())
    }
}

async fn run_light(
    config: Config,
    state: &str,
    brightness: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut facade = DeviceFacade::new(config);
    if !facade.connect().await {
        return Err("could not connect to a live or simulated device".into());
    }

    let response = facade.set_indicator(state, brightness).await;
    facade.disconnect().await;

    match response.to_error() {
        Some(err) => Err(err.into()),
        None => {
            println!("{} at {}", state, brightness);
            Ok(())
        }
    }
}

fn run_ports(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let ports = system_lister().list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in &ports {
        println!("{}\t{}", port.port_name, port.description);
    }

    let resolver = PortResolver::from_config(&config.device.port, &config.discovery, system_lister());
    match resolver.resolve() {
        Ok(port) => println!("Selected: {}", port),
        Err(e) => println!("Selected: none ({})", e),
    }
    Ok(())
}

fn init_config(path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() && !force {
        return Err(format!("{} already exists (use --force to overwrite)", path.display()).into());
    }
    let loader = ConfigLoader {
        config_path: None,
        config: Config::default(),
    };
    loader.save_to(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Signal received, shutting down");
}
