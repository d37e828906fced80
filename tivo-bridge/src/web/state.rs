//! Web server shared state.

use std::collections::{BTreeMap, VecDeque};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;

use tivo_client::{Bridge, TivoClient};

/// Number of received lines kept per device.
pub const LINE_HISTORY: usize = 100;

/// Capacity of the live event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One line received from a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineRecord {
    pub device: String,
    pub line: String,
    /// Unix time in milliseconds.
    pub received_at: i64,
}

#[derive(Debug, Default)]
struct DeviceSlot {
    client: Option<TivoClient>,
    history: VecDeque<LineRecord>,
}

/// [`Bridge`] exposing devices over HTTP.
///
/// Holds the command handler of every device, a bounded history of received
/// lines and a broadcast channel feeding server-sent events.
#[derive(Debug)]
pub struct WebBridge {
    devices: RwLock<BTreeMap<String, DeviceSlot>>,
    events: broadcast::Sender<LineRecord>,
}

impl WebBridge {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            devices: RwLock::new(BTreeMap::new()),
            events,
        }
    }

    /// Command handler for `device`, if one was registered.
    pub fn client(&self, device: &str) -> Option<TivoClient> {
        self.devices.read().get(device).and_then(|slot| slot.client.clone())
    }

    /// All registered handlers, ordered by device id.
    pub fn clients(&self) -> Vec<TivoClient> {
        self.devices
            .read()
            .values()
            .filter_map(|slot| slot.client.clone())
            .collect()
    }

    /// Recent lines for a registered device, oldest first.
    pub fn recent_lines(&self, device: &str) -> Option<Vec<LineRecord>> {
        let devices = self.devices.read();
        let slot = devices.get(device)?;
        slot.client.as_ref()?;
        Some(slot.history.iter().cloned().collect())
    }

    /// Receiver for lines from every device.
    pub fn subscribe(&self) -> broadcast::Receiver<LineRecord> {
        self.events.subscribe()
    }
}

impl Default for WebBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Bridge for WebBridge {
    fn publish(&self, device: &str, line: &str) {
        let record = LineRecord {
            device: device.to_string(),
            line: line.to_string(),
            received_at: chrono::Utc::now().timestamp_millis(),
        };

        {
            let mut devices = self.devices.write();
            let slot = devices.entry(device.to_string()).or_default();
            if slot.history.len() >= LINE_HISTORY {
                slot.history.pop_front();
            }
            slot.history.push_back(record.clone());
        }

        // No subscribers is fine.
        let _ = self.events.send(record);
    }

    fn on_command(&self, device: &str, handler: TivoClient) {
        log::debug!("[{}] Registered with web bridge", device);
        self.devices
            .write()
            .entry(device.to_string())
            .or_default()
            .client = Some(handler);
    }
}
