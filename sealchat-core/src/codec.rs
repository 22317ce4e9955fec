//! Text encoding for binary key, nonce and ciphertext fields.
//!
//! Standard padded base64, so cryptographic material survives JSON and
//! plain-text transport untouched. Decoding is strict: only canonical output
//! of [`encode`] is accepted.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::{Error, Result};

/// Encode raw bytes as wire text
pub fn encode(bytes: impl AsRef<[u8]>) -> String {
    STANDARD.encode(bytes)
}

/// Decode wire text back into raw bytes
pub fn decode(text: &str) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(text)?)
}

/// Decode wire text that must hold exactly `N` bytes (keys, nonces)
pub fn decode_array<const N: usize>(text: &str) -> Result<[u8; N]> {
    let bytes = decode(text)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| Error::InvalidKeyMaterial(format!("expected {} bytes, got {}", N, len)))
}
