//! Error taxonomy for the device-communication engine.

use thiserror::Error;

/// Failure reported by a [`Transport`](crate::infrastructure::bluetooth::transport::Transport)
/// implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),
    #[error("Write failed: {0}")]
    Write(String),
    #[error("Subscribe failed: {0}")]
    Subscribe(String),
    #[error("Scan failed: {0}")]
    Scan(String),
    #[error("Connection event stream closed")]
    StreamClosed,
    #[error("{0}")]
    Other(String),
}

/// Errors surfaced to callers of scan, connect and authenticate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Bluetooth adapter is not powered on")]
    AdapterNotReady,
    #[error("A scan is already active")]
    ScanAlreadyActive,
    #[error("Device does not expose the authentication characteristic")]
    DeviceNotSupported,
    #[error("Authentication rejected: {0}")]
    AuthenticationRejected(String),
    #[error("Authentication timed out after {0} ms")]
    AuthenticationTimedOut(u64),
    #[error("No current device")]
    NoCurrentDevice,
    #[error("Connection attempt was cancelled")]
    ConnectionCancelled,
    #[error("Transport failure: {0}")]
    TransportFailure(#[from] TransportError),
}

impl LinkError {
    pub(crate) fn rejected(reason: impl Into<String>) -> Self {
        Self::AuthenticationRejected(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_converts() {
        let err: LinkError = TransportError::Write("gatt busy".to_string()).into();
        assert_eq!(
            err,
            LinkError::TransportFailure(TransportError::Write("gatt busy".to_string()))
        );
        assert_eq!(err.to_string(), "Transport failure: Write failed: gatt busy");
    }
}
