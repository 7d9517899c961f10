//! Device Registry
//!
//! Resolves an advertised name to the driver of its device family.

use crate::domain::device::{Device, DeviceDriver};
use crate::domain::models::DeviceId;
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::mi_band3::{self, MiBand3Driver};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    drivers: Vec<Arc<dyn DeviceDriver>>,
}

impl DeviceRegistry {
    /// Registry of every built-in device family with its default secret
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        registry.register(Arc::new(MiBand3Driver::default()));
        registry
    }

    /// Built-in families, with secrets taken from the settings key table
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let secret = settings
            .secret_key(mi_band3::FAMILY)?
            .unwrap_or(mi_band3::DEFAULT_SECRET);

        let mut registry = Self::default();
        registry.register(Arc::new(MiBand3Driver::with_secret(secret)));
        Ok(registry)
    }

    /// Add a driver. Earlier registrations win when names overlap.
    pub fn register(&mut self, driver: Arc<dyn DeviceDriver>) {
        self.drivers.push(driver);
    }

    pub fn driver_for(&self, name: &str) -> Option<&Arc<dyn DeviceDriver>> {
        self.drivers.iter().find(|driver| driver.matches(name))
    }

    /// Build a device for an advertised name, or `None` for unknown names.
    pub fn resolve(&self, id: DeviceId, name: &str) -> Option<Device> {
        match self.driver_for(name) {
            Some(driver) => Some(Device::new(id, name, driver.clone())),
            None => {
                debug!("No driver for device {:?} ({})", name, id);
                None
            }
        }
    }
}
