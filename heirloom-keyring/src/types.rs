//! Wire-facing DTOs for the key lifecycle surface.
//!
//! Public keys are base64-encoded in responses. Private key material
//! never appears here: [`crate::UnlockedKeys`] is deliberately not
//! serializable.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response to key creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedKeys {
    pub public_key: String,
}

/// Public key plus metadata; needs no password.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyInfo {
    pub public_key: String,
    pub version: u32,
    pub created_at: DateTime<Utc>,
}

/// Response to key rotation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotatedKeys {
    pub new_public_key: String,
    pub version: u32,
}

/// Passwordless status summary of a user's key material.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStatus {
    pub has_keys: bool,
    pub is_compromised: bool,
    pub is_locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<DateTime<Utc>>,
}

/// Base64-encodes a raw public key for the wire.
pub fn encode_public_key(public_key: &[u8; 32]) -> String {
    BASE64.encode(public_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_omits_absent_lock_expiry() {
        let status = KeyStatus {
            has_keys: true,
            is_compromised: false,
            is_locked: false,
            locked_until: None,
        };
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(
            json,
            r#"{"hasKeys":true,"isCompromised":false,"isLocked":false}"#
        );
    }

    #[test]
    fn public_key_encodes_as_base64() {
        let encoded = encode_public_key(&[0u8; 32]);
        assert_eq!(encoded.len(), 44);
        assert!(encoded.ends_with('='));
    }
}
