//! Persistent remote-control client for TiVo devices.
//!
//! [`TivoClient::spawn`] opens a TCP session to a device's remote-control
//! port and keeps it alive. Lines from the device update a [`DeviceState`]
//! and are relayed to a [`Bridge`]; commands from callers are translated
//! into `IRCODE` key presses.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tivo_client::{ConnectionConfig, LogBridge, TivoClient};
//!
//! # async fn run() -> Result<(), tivo_client::ClientError> {
//! let config = ConnectionConfig::new("den", "192.168.1.20");
//! let client = TivoClient::spawn(config, Arc::new(LogBridge));
//! client.command("ircode", "MUTE").await?;
//! client.tune_live("0007", false).await?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod client;

pub use bridge::{Bridge, LogBridge};
pub use client::{
    Backoff, CommandTranslator, ConnectionConfig, ConnectionState, DeviceState, Mode, Outcome,
    ResponseInterpreter, TivoClient, Transition, WireWriter,
};
pub use tivo_protocol::{ClientError, ProtocolError};
