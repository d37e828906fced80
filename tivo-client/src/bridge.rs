//! Outbound integration seam.
//!
//! A bridge receives every raw line a device sends and is handed the client
//! handle that serves commands for that device. The HTTP bridge in
//! `tivo-bridge` is one implementation; tests use recording stubs.

use crate::client::TivoClient;

/// Receiver of device lines and owner of command routing.
pub trait Bridge: Send + Sync + 'static {
    /// Called for every line received from `device`, after it was interpreted.
    fn publish(&self, device: &str, line: &str);

    /// Called once per device when its client starts.
    fn on_command(&self, device: &str, handler: TivoClient);
}

/// Bridge that only logs device lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogBridge;

impl Bridge for LogBridge {
    fn publish(&self, device: &str, line: &str) {
        log::info!("[{}] {}", device, line);
    }

    fn on_command(&self, device: &str, handler: TivoClient) {
        log::debug!("[{}] Command handler registered for {}", device, handler.addr());
    }
}
