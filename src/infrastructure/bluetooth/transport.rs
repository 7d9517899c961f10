//! Transport Port
//!
//! The narrow interface the engine drives the platform radio stack through.
//! Streams are plain unbounded receivers: dropping the receiver is how a
//! subscription is released.

use crate::domain::error::TransportError;
use crate::domain::models::{
    AdapterStatus, Advertisement, Characteristic, ConnectOptions, ConnectionEvent, DeviceId,
    KnownPeripheral, WriteMode,
};
use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A live subscription. Dropping it unsubscribes.
pub type Notifications<T> = mpsc::UnboundedReceiver<T>;

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Current adapter status as last reported by the platform
    fn adapter_status(&self) -> AdapterStatus;

    /// Subscribe to adapter status changes
    fn status_stream(&self) -> Notifications<AdapterStatus>;

    /// Start an advertisement scan
    fn scan(&self) -> Result<Notifications<Advertisement>, TransportError>;

    /// Request a connection. The returned stream reports the outcome and any
    /// later link loss.
    async fn connect(
        &self,
        id: DeviceId,
        options: ConnectOptions,
    ) -> Result<Notifications<ConnectionEvent>, TransportError>;

    /// Cancel the connection (or pending connection) to a device
    async fn disconnect(&self, id: DeviceId) -> Result<(), TransportError>;

    /// Locate a characteristic on a connected device
    async fn characteristic(
        &self,
        id: DeviceId,
        uuid: Uuid,
    ) -> Result<Option<Characteristic>, TransportError>;

    async fn write_characteristic(
        &self,
        characteristic: &Characteristic,
        bytes: &[u8],
        mode: WriteMode,
    ) -> Result<(), TransportError>;

    /// Enable notifications and stream the values
    async fn subscribe_characteristic(
        &self,
        characteristic: &Characteristic,
    ) -> Result<Notifications<Vec<u8>>, TransportError>;

    /// Look up a peripheral the platform already knows about
    async fn known_device(&self, id: DeviceId) -> Result<Option<KnownPeripheral>, TransportError>;
}
