//! Authentication Handshake Protocol
//!
//! Wire format of the challenge-response handshake and the key derivation
//! used to answer the device's random challenge.
//!
//! # Message Structure
//!
//! ```text
//! [0]     : Response type (must equal the family's auth response tag)
//! [1]     : Command tag
//!           send-key               -> request authorization number again
//!           request-random-number  -> payload holds the 16-byte challenge
//!           send-encrypted-number  -> handshake complete
//! [2]     : Status (must equal the family's success tag)
//! [3..]   : Payload
//! ```

use crate::domain::device::AuthProfile;
use crate::domain::error::LinkError;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use tracing::trace;

/// Length of the header every handshake message carries
pub const HEADER_LEN: usize = 3;

/// Length of the random challenge and of the secret
pub const CHALLENGE_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeCommand {
    SendKey,
    RequestRandomNumber,
    SendEncryptedNumber,
}

/// One inbound handshake notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeMessage {
    pub response_type: u8,
    pub command: u8,
    pub status: u8,
    pub payload: Vec<u8>,
}

impl HandshakeMessage {
    /// Split a raw notification into header and payload
    pub fn decode(bytes: &[u8]) -> Result<Self, LinkError> {
        if bytes.len() < HEADER_LEN {
            return Err(LinkError::rejected(format!(
                "message too short: {} bytes",
                bytes.len()
            )));
        }

        #[cfg(debug_assertions)]
        trace!("Raw handshake message: {:02X?}", bytes);

        Ok(Self {
            response_type: bytes[0],
            command: bytes[1],
            status: bytes[2],
            payload: bytes[HEADER_LEN..].to_vec(),
        })
    }

    /// Check the response type and status bytes, then map the command tag.
    pub fn validate(&self, profile: &AuthProfile) -> Result<HandshakeCommand, LinkError> {
        if self.response_type != profile.response_tag {
            return Err(LinkError::rejected(format!(
                "unexpected response type {:#04X}",
                self.response_type
            )));
        }
        if self.status != profile.success {
            return Err(LinkError::rejected(format!(
                "status {:#04X} for command {:#04X}",
                self.status, self.command
            )));
        }

        match self.command {
            c if c == profile.send_key => Ok(HandshakeCommand::SendKey),
            c if c == profile.request_random_number => Ok(HandshakeCommand::RequestRandomNumber),
            c if c == profile.send_encrypted_number => Ok(HandshakeCommand::SendEncryptedNumber),
            other => Err(LinkError::rejected(format!(
                "unknown command tag {:#04X}",
                other
            ))),
        }
    }

    /// The random challenge carried by a request-random-number message
    pub fn challenge(&self) -> Result<[u8; CHALLENGE_LEN], LinkError> {
        if self.payload.len() < CHALLENGE_LEN {
            return Err(LinkError::rejected(format!(
                "challenge too short: {} bytes",
                self.payload.len()
            )));
        }
        let mut challenge = [0u8; CHALLENGE_LEN];
        challenge.copy_from_slice(&self.payload[..CHALLENGE_LEN]);
        Ok(challenge)
    }
}

/// Outbound "request authorization number" command
pub fn request_authorization_number(profile: &AuthProfile) -> [u8; 2] {
    [profile.request_random_number, profile.auth_flags]
}

/// AES-128-ECB of a single block
pub fn encrypt_challenge(
    secret: &[u8; CHALLENGE_LEN],
    challenge: &[u8; CHALLENGE_LEN],
) -> [u8; CHALLENGE_LEN] {
    let cipher = Aes128::new(GenericArray::from_slice(secret));
    let mut block = GenericArray::clone_from_slice(challenge);
    cipher.encrypt_block(&mut block);

    let mut encrypted = [0u8; CHALLENGE_LEN];
    encrypted.copy_from_slice(&block);
    encrypted
}

/// Build the response to a random challenge: command header followed by the
/// challenge encrypted with the family secret.
pub fn derive_response(profile: &AuthProfile, challenge: &[u8; CHALLENGE_LEN]) -> Vec<u8> {
    let mut response = Vec::with_capacity(2 + CHALLENGE_LEN);
    response.push(profile.send_encrypted_number);
    response.push(profile.auth_flags);
    response.extend_from_slice(&encrypt_challenge(&profile.secret, challenge));
    response
}
