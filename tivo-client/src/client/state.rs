//! Per-device state reported by the protocol.

use serde::Serialize;

pub use tivo_protocol::Mode;

/// What the client currently knows about the device.
///
/// Owned by the connection task and only changed by the response
/// interpreter. It survives reconnects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceState {
    /// Viewing mode.
    pub mode: Mode,
    /// Zero-padded channel from the last `CH_STATUS` report.
    pub channel: Option<String>,
    /// Reason accompanying the last channel report.
    pub reason: Option<String>,
    /// Channel to tune once the device reports live TV.
    pub pending_channel_set: Option<String>,
}

impl DeviceState {
    /// Returns true when the device is on live TV.
    pub fn is_live(&self) -> bool {
        self.mode == Mode::LiveTv
    }
}

/// Socket lifecycle of a device connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}
