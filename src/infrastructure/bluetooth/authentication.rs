//! Authentication Engine
//!
//! Runs the challenge-response handshake on the authentication characteristic
//! of one connected device:
//!
//! ```text
//! Idle ──subscribe + request number──▶ KeySent
//! KeySent ──send-key──▶ KeySent (request number again)
//! KeySent ──request-random-number──▶ RandomChallengeReceived
//!         ──write derived response──▶ EncryptedResponseSent
//! EncryptedResponseSent ──send-encrypted-number──▶ Authenticated
//! any ──invalid message / transport error / timeout──▶ Failed
//! ```
//!
//! Notifications are handled strictly one at a time, each including its
//! outbound write, in arrival order.

use crate::domain::device::AuthProfile;
use crate::domain::error::{LinkError, TransportError};
use crate::domain::models::{Characteristic, DeviceId, WriteMode};
use crate::infrastructure::bluetooth::protocol::{self, HandshakeCommand, HandshakeMessage};
use crate::infrastructure::bluetooth::transport::Transport;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Idle,
    KeySent,
    RandomChallengeReceived,
    EncryptedResponseSent,
    Authenticated,
    Failed,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// One handshake against one device
pub struct Authenticator<'a, T: Transport + ?Sized> {
    transport: &'a T,
    profile: &'a AuthProfile,
    device: DeviceId,
    state: AuthState,
}

impl<'a, T: Transport + ?Sized> Authenticator<'a, T> {
    pub fn new(transport: &'a T, profile: &'a AuthProfile, device: DeviceId) -> Self {
        Self {
            transport,
            profile,
            device,
            state: AuthState::Idle,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Run the handshake until the device confirms it or it fails.
    pub async fn authenticate(&mut self, timeout: Duration) -> Result<(), LinkError> {
        info!("Authenticating {}", self.device);

        let result = match tokio::time::timeout(timeout, self.run()).await {
            Ok(result) => result,
            Err(_) => Err(LinkError::AuthenticationTimedOut(millis(timeout))),
        };

        match &result {
            Ok(()) => info!("Authenticated {}", self.device),
            Err(e) => {
                warn!("Authentication of {} failed: {}", self.device, e);
                self.state = AuthState::Failed;
            }
        }
        result
    }

    async fn run(&mut self) -> Result<(), LinkError> {
        let characteristic = self
            .transport
            .characteristic(self.device, self.profile.characteristic)
            .await?
            .ok_or(LinkError::DeviceNotSupported)?;

        // Subscribe before the first request so no reply is missed
        let mut notifications = self
            .transport
            .subscribe_characteristic(&characteristic)
            .await?;

        self.request_authorization_number(&characteristic).await?;

        while let Some(bytes) = notifications.recv().await {
            self.handle_notification(&characteristic, &bytes).await?;
            if self.state == AuthState::Authenticated {
                return Ok(());
            }
        }

        Err(TransportError::StreamClosed.into())
    }

    async fn handle_notification(
        &mut self,
        characteristic: &Characteristic,
        bytes: &[u8],
    ) -> Result<(), LinkError> {
        let message = HandshakeMessage::decode(bytes)?;

        match message.validate(self.profile)? {
            HandshakeCommand::SendKey => {
                debug!("Device requested a new key exchange");
                self.request_authorization_number(characteristic).await
            }
            HandshakeCommand::RequestRandomNumber => {
                let challenge = message.challenge()?;
                self.state = AuthState::RandomChallengeReceived;
                debug!("Sending encrypted random number");
                let response = protocol::derive_response(self.profile, &challenge);
                self.write(characteristic, &response).await?;
                self.state = AuthState::EncryptedResponseSent;
                Ok(())
            }
            HandshakeCommand::SendEncryptedNumber => {
                self.state = AuthState::Authenticated;
                Ok(())
            }
        }
    }

    async fn request_authorization_number(
        &mut self,
        characteristic: &Characteristic,
    ) -> Result<(), LinkError> {
        debug!("Requesting authorization number");
        let request = protocol::request_authorization_number(self.profile);
        self.write(characteristic, &request).await?;
        self.state = AuthState::KeySent;
        Ok(())
    }

    async fn write(&self, characteristic: &Characteristic, bytes: &[u8]) -> Result<(), LinkError> {
        self.transport
            .write_characteristic(characteristic, bytes, WriteMode::WithoutResponse)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::AdapterStatus;
    use crate::infrastructure::bluetooth::fake::FakeTransport;
    use crate::infrastructure::bluetooth::mi_band3::{self, AUTH_CHAR_UUID};
    use uuid::Uuid;

    const TIMEOUT: Duration = Duration::from_secs(5);
    const REQUEST: [u8; 2] = [0x02, 0x08];

    fn challenge() -> [u8; 16] {
        core::array::from_fn(|i| i as u8 * 7)
    }

    fn random_number_message() -> Vec<u8> {
        let mut message = vec![0x10, 0x02, 0x01];
        message.extend_from_slice(&challenge());
        message
    }

    fn supported_transport() -> FakeTransport {
        FakeTransport::new(AdapterStatus::PoweredOn).with_characteristic(AUTH_CHAR_UUID)
    }

    #[tokio::test]
    async fn test_missing_characteristic_is_not_supported() {
        let transport = FakeTransport::new(AdapterStatus::PoweredOn);
        let profile = mi_band3::auth_profile(mi_band3::DEFAULT_SECRET);
        let mut auth = Authenticator::new(&transport, &profile, DeviceId::new(Uuid::new_v4()));

        assert_eq!(
            auth.authenticate(TIMEOUT).await,
            Err(LinkError::DeviceNotSupported)
        );
        assert_eq!(auth.state(), AuthState::Failed);
        assert!(transport.writes().is_empty());
    }

    #[tokio::test]
    async fn test_full_handshake() {
        let transport = supported_transport();
        let profile = mi_band3::auth_profile(mi_band3::DEFAULT_SECRET);
        let expected_response = protocol::derive_response(&profile, &challenge());

        let mut requests = 0;
        let expected = expected_response.clone();
        transport.respond_with(move |written| {
            if written == REQUEST {
                requests += 1;
                if requests == 1 {
                    vec![vec![0x10, 0x01, 0x01]]
                } else {
                    vec![random_number_message()]
                }
            } else if written == expected.as_slice() {
                vec![vec![0x10, 0x03, 0x01]]
            } else {
                Vec::new()
            }
        });

        let mut auth = Authenticator::new(&transport, &profile, DeviceId::new(Uuid::new_v4()));
        auth.authenticate(TIMEOUT).await.unwrap();

        assert_eq!(auth.state(), AuthState::Authenticated);
        assert_eq!(
            transport.writes(),
            vec![REQUEST.to_vec(), REQUEST.to_vec(), expected_response]
        );
        assert!(transport
            .state()
            .writes
            .iter()
            .all(|(_, _, mode)| *mode == WriteMode::WithoutResponse));
        assert!(transport.notifications_released());
    }

    #[tokio::test]
    async fn test_failed_status_rejects_without_further_writes() {
        let transport = supported_transport();
        transport.respond_with(|_| vec![vec![0x10, 0x01, 0x04], random_number_message()]);
        let profile = mi_band3::auth_profile(mi_band3::DEFAULT_SECRET);

        let mut auth = Authenticator::new(&transport, &profile, DeviceId::new(Uuid::new_v4()));
        let result = auth.authenticate(TIMEOUT).await;

        assert!(matches!(result, Err(LinkError::AuthenticationRejected(_))));
        assert_eq!(auth.state(), AuthState::Failed);
        assert_eq!(transport.writes(), vec![REQUEST.to_vec()]);
    }

    #[tokio::test]
    async fn test_wrong_response_type_rejects() {
        let transport = supported_transport();
        transport.respond_with(|_| vec![vec![0x20, 0x02, 0x01]]);
        let profile = mi_band3::auth_profile(mi_band3::DEFAULT_SECRET);

        let mut auth = Authenticator::new(&transport, &profile, DeviceId::new(Uuid::new_v4()));
        assert!(matches!(
            auth.authenticate(TIMEOUT).await,
            Err(LinkError::AuthenticationRejected(_))
        ));
    }

    #[tokio::test]
    async fn test_truncated_challenge_rejects() {
        let transport = supported_transport();
        transport.respond_with(|_| vec![vec![0x10, 0x02, 0x01, 0xAA, 0xBB]]);
        let profile = mi_band3::auth_profile(mi_band3::DEFAULT_SECRET);

        let mut auth = Authenticator::new(&transport, &profile, DeviceId::new(Uuid::new_v4()));
        assert!(matches!(
            auth.authenticate(TIMEOUT).await,
            Err(LinkError::AuthenticationRejected(_))
        ));
        assert_eq!(transport.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_write_failure_propagates() {
        let transport = supported_transport();
        transport.state().write_error = Some(TransportError::Write("gatt error".to_string()));
        let profile = mi_band3::auth_profile(mi_band3::DEFAULT_SECRET);

        let mut auth = Authenticator::new(&transport, &profile, DeviceId::new(Uuid::new_v4()));
        assert_eq!(
            auth.authenticate(TIMEOUT).await,
            Err(LinkError::TransportFailure(TransportError::Write(
                "gatt error".to_string()
            )))
        );
        assert_eq!(auth.state(), AuthState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_device_times_out() {
        let transport = supported_transport();
        let profile = mi_band3::auth_profile(mi_band3::DEFAULT_SECRET);

        let mut auth = Authenticator::new(&transport, &profile, DeviceId::new(Uuid::new_v4()));
        assert_eq!(
            auth.authenticate(Duration::from_millis(1500)).await,
            Err(LinkError::AuthenticationTimedOut(1500))
        );
        assert_eq!(auth.state(), AuthState::Failed);
    }

    #[test]
    fn test_timeout_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }
}
