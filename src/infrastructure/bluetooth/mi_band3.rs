//! Mi Band 3 Device Family
//!
//! Name patterns, authentication characteristic and handshake constants of
//! the Mi Band 3 wearable.

use crate::domain::device::{AuthProfile, DeviceDriver};
use uuid::Uuid;

pub const FAMILY: &str = "Mi Band 3";

/// Advertised names, matched exactly
pub const DEVICE_NAMES: &[&str] = &["Mi Band 3", "Xiaomi Mi Band 3"];

/// Authentication characteristic UUID
pub const AUTH_CHAR_UUID: Uuid = Uuid::from_u128(0x00000009_0000_3512_2118_0009af100700);

pub const AUTH_RESPONSE: u8 = 0x10;
pub const AUTH_SEND_KEY: u8 = 0x01;
pub const AUTH_REQUEST_RANDOM_AUTH_NUMBER: u8 = 0x02;
pub const AUTH_SEND_ENCRYPTED_AUTH_NUMBER: u8 = 0x03;
pub const AUTH_SUCCESS: u8 = 0x01;
pub const AUTH_FLAGS: u8 = 0x08;

/// "0123456789@ABCDE"
pub const DEFAULT_SECRET: [u8; 16] = [
    0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x40, 0x41, 0x42, 0x43, 0x44, 0x45,
];

pub fn auth_profile(secret: [u8; 16]) -> AuthProfile {
    AuthProfile {
        characteristic: AUTH_CHAR_UUID,
        response_tag: AUTH_RESPONSE,
        success: AUTH_SUCCESS,
        send_key: AUTH_SEND_KEY,
        request_random_number: AUTH_REQUEST_RANDOM_AUTH_NUMBER,
        send_encrypted_number: AUTH_SEND_ENCRYPTED_AUTH_NUMBER,
        auth_flags: AUTH_FLAGS,
        secret,
    }
}

#[derive(Debug)]
pub struct MiBand3Driver {
    profile: AuthProfile,
}

impl MiBand3Driver {
    pub fn with_secret(secret: [u8; 16]) -> Self {
        Self {
            profile: auth_profile(secret),
        }
    }
}

impl Default for MiBand3Driver {
    fn default() -> Self {
        Self::with_secret(DEFAULT_SECRET)
    }
}

impl DeviceDriver for MiBand3Driver {
    fn family(&self) -> &'static str {
        FAMILY
    }

    fn matches(&self, name: &str) -> bool {
        DEVICE_NAMES.contains(&name)
    }

    fn auth_profile(&self) -> &AuthProfile {
        &self.profile
    }
}
