//! Device-communication engine for BLE fitness wearables.
//!
//! Discovers supported devices, connects them, runs the device family's
//! challenge-response handshake and keeps the connection alive across
//! adapter power changes. The platform radio stack is supplied by the caller
//! through the [`Transport`] port.

pub mod domain;
pub mod infrastructure;

pub use domain::device::{AuthProfile, ConnectionCallback, Device, DeviceDriver};
pub use domain::error::{LinkError, TransportError};
pub use domain::models::{
    AdapterStatus, Advertisement, ConnectionEvent, ConnectionState, DeviceId, DeviceInfo,
    LinkEvent, ScanResult,
};
pub use domain::settings::{Settings, SettingsService};
pub use infrastructure::bluetooth::connection::ConnectionManager;
pub use infrastructure::bluetooth::events::EventSink;
pub use infrastructure::bluetooth::registry::DeviceRegistry;
pub use infrastructure::bluetooth::scanner::Scanner;
pub use infrastructure::bluetooth::transport::Transport;
pub use infrastructure::bluetooth::BluetoothService;
