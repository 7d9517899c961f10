use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::device::Device;

/// Opaque identity of a peripheral as reported by the platform radio stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub Uuid);

impl DeviceId {
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The all-zero identity never names a real device.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for DeviceId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// State of the local radio controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AdapterStatus {
    #[default]
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

/// A single advertisement observed by the transport while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub id: DeviceId,
    pub name: Option<String>,
    pub rssi: i16,
    pub data: Vec<u8>,
}

/// Discovery event emitted once per unique, named, resolvable device.
#[derive(Debug)]
pub struct ScanResult {
    pub device: Device,
    pub rssi: i16,
    pub advertisement: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Authenticating,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPriority {
    Balanced,
    High,
    LowPower,
}

/// Options handed to the transport's connect primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    pub auto_connect: bool,
    pub priority: ConnectionPriority,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            auto_connect: true,
            priority: ConnectionPriority::High,
        }
    }
}

/// Link-level events reported by the transport for one connect request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    WithResponse,
    WithoutResponse,
}

/// A GATT characteristic located on a connected device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Characteristic {
    pub device: DeviceId,
    pub uuid: Uuid,
}

/// A peripheral the platform already knows about (bonded or previously seen).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownPeripheral {
    pub id: DeviceId,
    pub name: String,
}

/// Read-only snapshot of the current device slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub family: &'static str,
    pub state: ConnectionState,
    pub needs_authentication: bool,
}

/// Events published for consumers outside the core (UI, data services).
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    AdapterStatus(AdapterStatus),
    ConnectionState(DeviceId, ConnectionState),
    LogMessage(StatusMessage),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}
