//! Bluetooth Service Module
//!
//! Main service that coordinates scanning, connection and settings for the
//! application layer.

use crate::domain::device::{ConnectionCallback, Device};
use crate::domain::error::LinkError;
use crate::domain::models::{AdapterStatus, DeviceInfo, ScanResult};
use crate::domain::settings::SettingsService;
use crate::infrastructure::bluetooth::{
    connection::{ConnectionConfig, ConnectionManager},
    events::EventSink,
    registry::DeviceRegistry,
    scanner::Scanner,
    transport::Transport,
};
use anyhow::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

/// Main Bluetooth service coordinating all BLE operations
pub struct BluetoothService<T: Transport> {
    scanner: Scanner<T>,
    connection: ConnectionManager<T>,
    settings: Arc<Mutex<SettingsService>>,
}

impl<T: Transport> BluetoothService<T> {
    /// Create a new Bluetooth service
    pub fn new(
        transport: Arc<T>,
        settings: Arc<Mutex<SettingsService>>,
        events: EventSink,
    ) -> Result<Self> {
        // Get configuration from settings
        let (registry, config) = {
            let settings = settings
                .lock()
                .map_err(|_| anyhow::anyhow!("Lock error"))?;
            let s = settings.get();
            let registry = DeviceRegistry::from_settings(s)?;
            let config = ConnectionConfig {
                auth_timeout: Duration::from_millis(s.auth_timeout_ms),
                ..Default::default()
            };
            (Arc::new(registry), config)
        };

        Ok(Self {
            scanner: Scanner::new(transport.clone(), registry.clone(), events.clone()),
            connection: ConnectionManager::new(transport, registry, config, events),
            settings,
        })
    }

    /// Start scanning for devices
    pub fn start_scan<F>(&mut self, on_result: F) -> Result<(), LinkError>
    where
        F: FnMut(ScanResult) + Send + 'static,
    {
        self.scanner.start_scanning(on_result)
    }

    /// Stop scanning
    pub async fn stop_scan(&mut self) {
        self.scanner.stop_scanning().await
    }

    pub fn is_scanning(&self) -> bool {
        self.scanner.is_scanning()
    }

    /// Scan for the configured duration and return the unique devices found
    pub async fn scan_for_devices(&mut self) -> Result<Vec<ScanResult>, LinkError> {
        let duration = self
            .settings
            .lock()
            .map(|s| s.get().scan_duration_secs)
            .unwrap_or(10);
        self.scanner
            .scan_for_devices(Duration::from_secs(duration))
            .await
    }

    /// Connect and authenticate a device. A device that becomes ready is
    /// persisted as the last connected device.
    pub async fn connect(
        &self,
        device: Device,
        callback: Option<ConnectionCallback>,
    ) -> Result<(), LinkError> {
        let id = device.id();
        self.connection.connect(device, callback).await?;

        match self.settings.lock() {
            Ok(mut settings) => {
                if let Err(e) = settings.remember_device(id) {
                    warn!("Failed to persist last connected device: {}", e);
                }
            }
            Err(_) => warn!("Settings lock poisoned, last device not saved"),
        }
        Ok(())
    }

    /// Disconnect from the current device
    ///
    /// Without `remember_device` the persisted last device is cleared even if
    /// the transport fails to drop the link, matching the emptied slot.
    pub async fn disconnect(&self, remember_device: bool) -> Result<(), LinkError> {
        let result = self.connection.disconnect(remember_device).await;

        if !remember_device {
            match self.settings.lock() {
                Ok(mut settings) => {
                    if let Err(e) = settings.forget_device() {
                        warn!("Failed to clear last connected device: {}", e);
                    }
                }
                Err(_) => warn!("Settings lock poisoned, last device not cleared"),
            }
        }
        result
    }

    /// Put the last connected device from settings back in the current slot
    /// as a remembered device, so an adapter power-on reconnects it.
    pub async fn restore_last_device(
        &self,
        callback: Option<ConnectionCallback>,
    ) -> Result<Option<DeviceInfo>, LinkError> {
        let last = self
            .settings
            .lock()
            .ok()
            .and_then(|s| s.get().last_connected_device);
        let Some(id) = last else {
            return Ok(None);
        };

        match self.connection.get_known_device(id).await? {
            Some(device) => {
                info!("Restored last connected device {}", id);
                let info = device.info();
                self.connection.remember(device, callback);
                Ok(Some(info))
            }
            None => {
                warn!("Last connected device {} is not known anymore", id);
                Ok(None)
            }
        }
    }

    /// Enable automatic disconnect/reconnect on adapter power changes
    pub fn start_listening_for_adapter_changes(&self) {
        self.connection.start_listening_for_adapter_changes();
    }

    pub fn on_adapter_changed<F>(&self, callback: F)
    where
        F: Fn(AdapterStatus) + Send + 'static,
    {
        self.connection.on_adapter_changed(callback);
    }

    pub fn when_adapter_ready<F>(&self, callback: F)
    where
        F: Fn() + Send + 'static,
    {
        self.connection.when_adapter_ready(callback);
    }

    /// The current (or remembered) device
    pub fn current_device(&self) -> Option<DeviceInfo> {
        self.connection.current_device()
    }

    pub fn connection(&self) -> &ConnectionManager<T> {
        &self.connection
    }
}
