//! Device aggregate
//!
//! A [`Device`] is a resolved peripheral: its identity, the driver of its
//! device family, its connection state and the resources (background tasks
//! holding subscriptions) that must be released together on disconnect.

use crate::domain::error::LinkError;
use crate::domain::models::{ConnectionState, DeviceId, DeviceInfo};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Invoked with the outcome of every connect attempt made for a device,
/// including automatic reconnects.
pub type ConnectionCallback = Arc<dyn Fn(&DeviceInfo, &Result<(), LinkError>) + Send + Sync>;

/// Wire constants and secret of a device family's challenge-response handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthProfile {
    /// Characteristic the handshake runs on
    pub characteristic: Uuid,
    /// Byte 0 of every valid inbound message
    pub response_tag: u8,
    /// Byte 2 of every valid inbound message
    pub success: u8,
    pub send_key: u8,
    pub request_random_number: u8,
    pub send_encrypted_number: u8,
    /// Second byte of outbound requests
    pub auth_flags: u8,
    pub secret: [u8; 16],
}

impl fmt::Debug for AuthProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthProfile")
            .field("characteristic", &self.characteristic)
            .field("response_tag", &self.response_tag)
            .field("auth_flags", &self.auth_flags)
            .finish_non_exhaustive()
    }
}

/// Behavior of one device family.
pub trait DeviceDriver: Send + Sync + fmt::Debug {
    /// Stable family name, also the key of the secret table in settings
    fn family(&self) -> &'static str;

    /// Whether an advertised name belongs to this family
    fn matches(&self, name: &str) -> bool;

    fn auth_profile(&self) -> &AuthProfile;
}

/// Background tasks owned by a device. Released all at once.
#[derive(Default)]
pub struct ResourceSet {
    tasks: Vec<JoinHandle<()>>,
}

impl ResourceSet {
    pub fn push(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Abort every task; their subscriptions are dropped with them.
    pub fn dispose(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    /// Abort every task and wait until each one is gone.
    pub async fn shutdown(mut self) {
        for task in std::mem::take(&mut self.tasks) {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for ResourceSet {
    fn drop(&mut self) {
        self.dispose();
    }
}

pub struct Device {
    id: DeviceId,
    name: String,
    driver: Arc<dyn DeviceDriver>,
    state: ConnectionState,
    needs_authentication: bool,
    connection_callback: Option<ConnectionCallback>,
    // Connect attempt that currently owns this device's state
    attempt: u64,
    resources: ResourceSet,
}

impl Device {
    pub fn new(id: DeviceId, name: impl Into<String>, driver: Arc<dyn DeviceDriver>) -> Self {
        Self {
            id,
            name: name.into(),
            driver,
            state: ConnectionState::Disconnected,
            needs_authentication: true,
            connection_callback: None,
            attempt: 0,
            resources: ResourceSet::default(),
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn family(&self) -> &'static str {
        self.driver.family()
    }

    pub fn driver(&self) -> &Arc<dyn DeviceDriver> {
        &self.driver
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    pub fn needs_authentication(&self) -> bool {
        self.needs_authentication
    }

    pub fn set_needs_authentication(&mut self, needs_authentication: bool) {
        self.needs_authentication = needs_authentication;
    }

    pub fn connection_callback(&self) -> Option<&ConnectionCallback> {
        self.connection_callback.as_ref()
    }

    pub(crate) fn set_connection_callback(&mut self, callback: Option<ConnectionCallback>) {
        self.connection_callback = callback;
    }

    pub(crate) fn attempt(&self) -> u64 {
        self.attempt
    }

    pub(crate) fn set_attempt(&mut self, attempt: u64) {
        self.attempt = attempt;
    }

    pub(crate) fn resources_mut(&mut self) -> &mut ResourceSet {
        &mut self.resources
    }

    pub fn info(&self) -> DeviceInfo {
        DeviceInfo {
            id: self.id,
            name: self.name.clone(),
            family: self.family(),
            state: self.state,
            needs_authentication: self.needs_authentication,
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("family", &self.family())
            .field("state", &self.state)
            .field("needs_authentication", &self.needs_authentication)
            .field("resources", &self.resources.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::mi_band3::MiBand3Driver;
    use std::time::Duration;

    #[tokio::test]
    async fn test_dispose_aborts_all_tasks() {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(1);
        let mut resources = ResourceSet::default();
        for _ in 0..2 {
            let tx = tx.clone();
            resources.push(tokio::spawn(async move {
                let _held = tx;
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }));
        }
        drop(tx);
        assert_eq!(resources.len(), 2);

        resources.dispose();
        assert!(resources.is_empty());
        // Every sender is dropped once both tasks are gone
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_new_device_needs_authentication() {
        let device = Device::new(
            DeviceId::new(Uuid::new_v4()),
            "Mi Band 3",
            Arc::new(MiBand3Driver::default()),
        );
        assert!(device.needs_authentication());
        assert_eq!(device.state(), ConnectionState::Disconnected);
        assert_eq!(device.info().family, "Mi Band 3");
    }
}
