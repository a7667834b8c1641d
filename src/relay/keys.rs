//! Decoding of feed key material.
//!
//! Keys arrive from the admin surface either bech32-encoded (`nsec1...`,
//! `npub1...`) or as 64 hex characters.

use super::SignError;

const SECRET_HRP: &str = "nsec";
const PUBLIC_HRP: &str = "npub";

/// Decode a signing key into its 32 raw bytes.
pub fn decode_secret_key(raw: &str) -> Result<[u8; 32], SignError> {
    decode(raw, SECRET_HRP)
}

/// Decode a verifying key into its 32 raw (x-only) bytes.
pub fn decode_public_key(raw: &str) -> Result<[u8; 32], SignError> {
    decode(raw, PUBLIC_HRP)
}

/// Normalize a verifying key to lowercase hex, the form carried in messages.
pub fn public_key_hex(raw: &str) -> Result<String, SignError> {
    decode_public_key(raw).map(hex::encode)
}

fn decode(raw: &str, expected_hrp: &str) -> Result<[u8; 32], SignError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(SignError::InvalidKey("empty key".to_string()));
    }

    let bytes = if raw.len() == 64 && raw.chars().all(|c| c.is_ascii_hexdigit()) {
        hex::decode(raw).map_err(|e| SignError::InvalidKey(e.to_string()))?
    } else {
        let (hrp, data) =
            bech32::decode(raw).map_err(|e| SignError::InvalidKey(e.to_string()))?;
        let hrp = hrp.to_string();
        if hrp != expected_hrp {
            return Err(SignError::InvalidKey(format!(
                "expected {} key, got {}",
                expected_hrp, hrp
            )));
        }
        data
    };

    bytes
        .try_into()
        .map_err(|b: Vec<u8>| SignError::InvalidKey(format!("expected 32 bytes, got {}", b.len())))
}
