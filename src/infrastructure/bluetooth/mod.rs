//! Bluetooth Module
//!
//! Discovery, connection and authentication of supported wearables over a
//! platform-provided BLE transport.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    BluetoothService                     │
//! │  (Main coordinator - public API for the application)    │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼──────────────┐
//!         │             │              │
//!         ▼             ▼              ▼
//! ┌───────────┐  ┌─────────────┐  ┌──────────┐
//! │  Scanner  │  │ Connection  │  │ Registry │
//! │           │  │  Manager    │  │          │
//! │ - dedup   │  │ - slot      │  │ - name   │
//! │ - filter  │  │ - reconnect │  │   match  │
//! └─────┬─────┘  └──────┬──────┘  └──────────┘
//!       │               │
//!       │               ▼
//!       │        ┌────────────────┐   ┌──────────┐
//!       │        │ Authenticator  │──▶│ Protocol │
//!       │        └───────┬────────┘   └──────────┘
//!       ▼                ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                 Transport (platform port)               │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`transport`] - Port to the platform radio stack
//! - [`registry`] - Device family lookup by advertised name
//! - [`mi_band3`] - Mi Band 3 driver and wire constants
//! - [`protocol`] - Handshake message codec and key derivation
//! - [`scanner`] - Device discovery
//! - [`authentication`] - Challenge-response handshake
//! - [`connection`] - Current device slot, connect/disconnect, auto-reconnect
//! - [`service`] - Main service coordinator

pub mod authentication;
pub mod connection;
pub mod events;
pub mod mi_band3;
pub mod protocol;
pub mod registry;
pub mod scanner;
pub mod service;
pub mod transport;

#[cfg(test)]
pub(crate) mod fake;

// Re-export main service for convenience
pub use service::BluetoothService;
