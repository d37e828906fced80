//! Configuration file and command line merging.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use tivo_client::ConnectionConfig;
use tivo_protocol::TIVO_PORT;

pub const DEFAULT_CONFIG_FILE: &str = "tivo-bridge.toml";
const DEFAULT_WEB_LISTEN: &str = "0.0.0.0:8080";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_RETENTION_DAYS: u64 = 7;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid web_listen address {0:?}")]
    InvalidAddress(String),

    #[error("device entry {0:?} needs both a device id and an ip")]
    InvalidDevice(String),

    #[error("device {0:?} is configured more than once")]
    DuplicateDevice(String),

    #[error("no devices configured")]
    NoDevices,

    #[error("connection.{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

/// Configuration file format.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub connection: ConnectionSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default, rename = "device")]
    pub devices: Vec<DeviceEntry>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ServerSection {
    pub web_listen: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ConnectionSection {
    pub port: Option<u16>,
    pub connect_timeout_ms: Option<u64>,
    pub backoff_initial_ms: Option<u64>,
    pub backoff_max_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct LoggingSection {
    pub log_dir: Option<String>,
    pub retention_days: Option<u64>,
    pub level: Option<String>,
}

/// One `{device id, ip}` pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceEntry {
    pub device: String,
    pub ip: String,
}

impl DeviceEntry {
    pub fn connection_config(&self, settings: &ConnectionSettings) -> ConnectionConfig {
        ConnectionConfig {
            port: settings.port,
            connect_timeout: settings.connect_timeout,
            backoff_initial: settings.backoff_initial,
            backoff_max: settings.backoff_max,
            ..ConnectionConfig::new(self.device.clone(), self.ip.clone())
        }
    }
}

/// Parse a `--device id=ip` argument.
pub fn parse_device_arg(arg: &str) -> Result<DeviceEntry, String> {
    match arg.split_once('=') {
        Some((device, ip)) if !device.trim().is_empty() && !ip.trim().is_empty() => Ok(DeviceEntry {
            device: device.trim().to_string(),
            ip: ip.trim().to_string(),
        }),
        _ => Err(format!("expected ID=IP, got {:?}", arg)),
    }
}

/// Values given on the command line; each takes precedence over the file.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub web_listen: Option<SocketAddr>,
    pub log_dir: Option<PathBuf>,
    pub log_retention_days: Option<u64>,
    /// Appended to the file's device list.
    pub devices: Vec<DeviceEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub port: u16,
    pub connect_timeout: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: TIVO_PORT,
            connect_timeout: Duration::from_secs(10),
            backoff_initial: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
        }
    }
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub web_listen: SocketAddr,
    pub connection: ConnectionSettings,
    pub log_dir: PathBuf,
    pub log_retention_days: u64,
    pub log_level: Option<String>,
    pub devices: Vec<DeviceEntry>,
}

pub fn load_config(path: &Path) -> Result<ConfigFile, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> Result<ConfigFile, ConfigError> {
    Ok(toml::from_str(contents)?)
}

impl ConfigFile {
    /// Merge with command line values and validate.
    pub fn resolve(self, cli: CliOverrides) -> Result<Settings, ConfigError> {
        let web_listen = match cli.web_listen {
            Some(addr) => addr,
            None => {
                let raw = self.server.web_listen.as_deref().unwrap_or(DEFAULT_WEB_LISTEN);
                raw.parse()
                    .map_err(|_| ConfigError::InvalidAddress(raw.to_string()))?
            }
        };

        let defaults = ConnectionSettings::default();
        let connection = ConnectionSettings {
            port: self.connection.port.unwrap_or(defaults.port),
            connect_timeout: self
                .connection
                .connect_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.connect_timeout),
            backoff_initial: self
                .connection
                .backoff_initial_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_initial),
            backoff_max: self
                .connection
                .backoff_max_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_max),
        };

        validate_connection(&connection)?;

        let log_dir = cli.log_dir.unwrap_or_else(|| {
            PathBuf::from(self.logging.log_dir.as_deref().unwrap_or(DEFAULT_LOG_DIR))
        });
        let log_retention_days = cli
            .log_retention_days
            .or(self.logging.retention_days)
            .unwrap_or(DEFAULT_RETENTION_DAYS);

        let mut devices = self.devices;
        devices.extend(cli.devices);
        validate_devices(&devices)?;

        Ok(Settings {
            web_listen,
            connection,
            log_dir,
            log_retention_days,
            log_level: self.logging.level,
            devices,
        })
    }
}

fn validate_connection(connection: &ConnectionSettings) -> Result<(), ConfigError> {
    if connection.connect_timeout.is_zero() {
        return Err(ConfigError::ZeroDuration("connect_timeout_ms"));
    }
    if connection.backoff_initial.is_zero() {
        return Err(ConfigError::ZeroDuration("backoff_initial_ms"));
    }
    if connection.backoff_max.is_zero() {
        return Err(ConfigError::ZeroDuration("backoff_max_ms"));
    }
    Ok(())
}

fn validate_devices(devices: &[DeviceEntry]) -> Result<(), ConfigError> {
    if devices.is_empty() {
        return Err(ConfigError::NoDevices);
    }
    let mut seen = HashSet::new();
    for entry in devices {
        if entry.device.trim().is_empty() || entry.ip.trim().is_empty() {
            return Err(ConfigError::InvalidDevice(format!("{}={}", entry.device, entry.ip)));
        }
        if !seen.insert(entry.device.as_str()) {
            return Err(ConfigError::DuplicateDevice(entry.device.clone()));
        }
    }
    Ok(())
}
