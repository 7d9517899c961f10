//! BLE Scanner Module
//!
//! Drives the transport's advertisement stream, drops unnamed and already
//! reported devices, and emits a [`ScanResult`] for every device the registry
//! recognizes.

use crate::domain::error::LinkError;
use crate::domain::models::{AdapterStatus, MessageSeverity, ScanResult};
use crate::infrastructure::bluetooth::events::EventSink;
use crate::infrastructure::bluetooth::registry::DeviceRegistry;
use crate::infrastructure::bluetooth::transport::Transport;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// BLE Scanner for discovering supported wearables
pub struct Scanner<T: Transport> {
    transport: Arc<T>,
    registry: Arc<DeviceRegistry>,
    events: EventSink,
    scan: Option<JoinHandle<()>>,
}

impl<T: Transport> Scanner<T> {
    /// Create a new scanner
    pub fn new(transport: Arc<T>, registry: Arc<DeviceRegistry>, events: EventSink) -> Self {
        Self {
            transport,
            registry,
            events,
            scan: None,
        }
    }

    /// Start scanning for devices
    ///
    /// `on_result` is invoked once per unique, named, resolvable device seen
    /// during this scan session.
    pub fn start_scanning<F>(&mut self, mut on_result: F) -> Result<(), LinkError>
    where
        F: FnMut(ScanResult) + Send + 'static,
    {
        if self.transport.adapter_status() != AdapterStatus::PoweredOn {
            warn!(
                "Cannot scan, adapter status is {:?}",
                self.transport.adapter_status()
            );
            return Err(LinkError::AdapterNotReady);
        }
        if self.is_scanning() {
            return Err(LinkError::ScanAlreadyActive);
        }

        let mut advertisements = self.transport.scan()?;
        info!("Started scanning");
        self.events.log("Scanning for devices...", MessageSeverity::Info);

        let registry = self.registry.clone();
        let task = tokio::spawn(async move {
            // Identities already reported in this session
            let mut seen = HashSet::new();

            while let Some(advertisement) = advertisements.recv().await {
                let name = match advertisement.name.as_deref() {
                    Some(name) if !name.is_empty() => name,
                    _ => continue,
                };
                if !seen.insert(advertisement.id) {
                    continue;
                }

                let Some(mut device) = registry.resolve(advertisement.id, name) else {
                    continue;
                };
                device.set_needs_authentication(true);

                info!(
                    "Found {} ({}) rssi {}",
                    device.name(),
                    device.id(),
                    advertisement.rssi
                );
                on_result(ScanResult {
                    device,
                    rssi: advertisement.rssi,
                    advertisement: advertisement.data,
                });
            }

            debug!("Advertisement stream ended");
        });

        self.scan = Some(task);
        Ok(())
    }

    /// Stop scanning. Returns once the advertisement subscription is released.
    pub async fn stop_scanning(&mut self) {
        if let Some(task) = self.scan.take() {
            info!("Stopping scan...");
            task.abort();
            let _ = task.await;
            self.events.log("Scan stopped.", MessageSeverity::Info);
        }
    }

    /// Check if currently scanning
    pub fn is_scanning(&self) -> bool {
        self.scan
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Scan for `duration` and return every unique device found.
    pub async fn scan_for_devices(
        &mut self,
        duration: Duration,
    ) -> Result<Vec<ScanResult>, LinkError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.start_scanning(move |result| {
            let _ = tx.send(result);
        })?;

        tokio::time::sleep(duration).await;
        self.stop_scanning().await;

        let mut results = Vec::new();
        while let Ok(result) = rx.try_recv() {
            results.push(result);
        }
        info!("Scan finished, {} device(s) found", results.len());
        Ok(results)
    }
}

impl<T: Transport> Drop for Scanner<T> {
    fn drop(&mut self) {
        if let Some(task) = self.scan.take() {
            task.abort();
        }
    }
}
