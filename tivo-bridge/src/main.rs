//! tivo-bridge: HTTP bridge for TiVo set-top boxes.
//!
//! Keeps one remote-control connection per configured device and exposes
//! device state and commands over a small REST and SSE API.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{error, info};

mod config;
mod logging;
mod registry;
mod web;

use config::{CliOverrides, ConfigFile, DeviceEntry};
use registry::DeviceRegistry;
use web::WebBridge;

/// tivo-bridge - HTTP bridge for TiVo remote control
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Address for the web API to listen on
    #[arg(long)]
    web_listen: Option<SocketAddr>,

    /// Device to control, as ID=IP (repeatable)
    #[arg(short, long = "device", value_name = "ID=IP", value_parser = config::parse_device_arg)]
    devices: Vec<DeviceEntry>,

    /// Directory where log files are stored
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Number of days to keep log files
    #[arg(long)]
    log_retention_days: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load config file: explicit path > auto-detect > default
    let config_path = args.config.clone().or_else(|| {
        let default_path = PathBuf::from(config::DEFAULT_CONFIG_FILE);
        default_path.exists().then_some(default_path)
    });
    let file_config = match &config_path {
        Some(path) => match config::load_config(path) {
            Ok(c) => {
                eprintln!("Loaded config from: {}", path.display());
                c
            }
            Err(e) => {
                eprintln!("Failed to load config file: {}", e);
                return Err(e.into());
            }
        },
        None => ConfigFile::default(),
    };

    let settings = file_config.resolve(CliOverrides {
        web_listen: args.web_listen,
        log_dir: args.log_dir,
        log_retention_days: args.log_retention_days,
        devices: args.devices,
    })?;

    logging::init_logging(
        &settings.log_dir,
        settings.log_retention_days,
        args.verbose,
        settings.log_level.as_deref(),
    )?;

    info!("tivo-bridge starting...");
    info!("  Web listen address: {}", settings.web_listen);
    info!("  Device port: {}", settings.connection.port);

    let bridge = Arc::new(WebBridge::new());
    let registry = DeviceRegistry::spawn(&settings.devices, &settings.connection, bridge.clone());
    info!("Started {} device client(s)", registry.len());
    for client in registry.iter() {
        info!("  Device {}: {}", client.device(), client.addr());
    }

    let web_listen = settings.web_listen;
    tokio::spawn(async move {
        match web::start_web_server(web_listen, bridge).await {
            Ok(_) => info!("Web server stopped"),
            Err(e) => error!("Web server error: {}", e),
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    registry.shutdown().await;

    Ok(())
}
