//! Per-process set of device clients.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;

use tivo_client::{Bridge, TivoClient};

use crate::config::{ConnectionSettings, DeviceEntry};

/// One running client per configured device.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    clients: BTreeMap<String, TivoClient>,
}

impl DeviceRegistry {
    /// Spawn a client for every entry. Entries are assumed validated, so
    /// device ids are unique.
    pub fn spawn(
        devices: &[DeviceEntry],
        settings: &ConnectionSettings,
        bridge: Arc<dyn Bridge>,
    ) -> Self {
        let mut clients = BTreeMap::new();
        for entry in devices {
            let client = TivoClient::spawn(entry.connection_config(settings), Arc::clone(&bridge));
            debug!("[{}] Client spawned", client.device());
            clients.insert(entry.device.clone(), client);
        }
        Self { clients }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TivoClient> {
        self.clients.values()
    }

    /// Stop every client.
    pub async fn shutdown(&self) {
        for client in self.clients.values() {
            client.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tivo_client::{ClientError, LogBridge};

    fn entry(device: &str) -> DeviceEntry {
        DeviceEntry {
            device: device.to_string(),
            ip: "127.0.0.1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_spawns_one_client_per_device() {
        let settings = ConnectionSettings {
            port: 9,
            ..Default::default()
        };
        let devices = [entry("den"), entry("attic")];
        let registry = DeviceRegistry::spawn(&devices, &settings, Arc::new(LogBridge));

        assert_eq!(registry.len(), 2);
        let ids: Vec<&str> = registry.iter().map(|c| c.device()).collect();
        assert_eq!(ids, vec!["attic", "den"]);
        assert!(registry.iter().all(|c| c.addr() == "127.0.0.1:9"));

        registry.shutdown().await;
        for client in registry.iter() {
            assert_eq!(client.ircode("MUTE").await, Err(ClientError::Closed));
        }
    }
}
