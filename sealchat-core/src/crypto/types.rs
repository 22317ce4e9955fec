use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::codec;
use crate::error::{Error, Result};

/// Size of X25519 public and private keys in bytes
pub const KEY_SIZE: usize = 32;

/// Size of the XSalsa20 nonce in bytes
pub const NONCE_SIZE: usize = 24;

/// Poly1305 authenticator overhead added to every ciphertext
pub const TAG_SIZE: usize = 16;

/// An X25519 public key, readable by any authenticated peer
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; KEY_SIZE]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Parse the wire encoding
    pub fn from_encoded(text: &str) -> Result<Self> {
        codec::decode_array(text).map(Self)
    }

    pub fn to_encoded(&self) -> String {
        codec::encode(self.0)
    }

    /// Short fingerprint two users can compare out of band
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        hex::encode(&digest[..16])
            .as_bytes()
            .chunks(4)
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| Error::InvalidKeyMaterial("Invalid public key length".to_string()))?;
        Ok(Self(key))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_encoded())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_encoded())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_encoded(&text).map_err(serde::de::Error::custom)
    }
}

/// An X25519 private key. Wiped from memory on drop, never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey([u8; KEY_SIZE]);

impl PrivateKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    pub fn from_encoded(text: &str) -> Result<Self> {
        codec::decode_array(text).map(Self)
    }

    pub fn to_encoded(&self) -> String {
        codec::encode(self.0)
    }

    /// Derive the matching public key
    pub fn public_key(&self) -> PublicKey {
        let secret = x25519_dalek::StaticSecret::from(self.0);
        PublicKey(x25519_dalek::PublicKey::from(&secret).to_bytes())
    }
}

impl TryFrom<&[u8]> for PrivateKey {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| Error::InvalidKeyMaterial("Invalid private key length".to_string()))?;
        Ok(Self(key))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

/// Public/private key pair for one identity
#[derive(Clone)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// Single-use nonce for one message
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    pub fn from_encoded(text: &str) -> Result<Self> {
        codec::decode_array(text).map(Self)
    }

    pub fn to_encoded(&self) -> String {
        codec::encode(self.0)
    }
}

impl TryFrom<&[u8]> for Nonce {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        let nonce: [u8; NONCE_SIZE] = bytes
            .try_into()
            .map_err(|_| Error::InvalidKeyMaterial("Invalid nonce length".to_string()))?;
        Ok(Self(nonce))
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({})", self.to_encoded())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_encoding_round_trip() {
        let key = PublicKey::from_bytes([42u8; KEY_SIZE]);
        assert_eq!(PublicKey::from_encoded(&key.to_encoded()).unwrap(), key);
    }

    #[test]
    fn test_wrong_lengths_are_invalid_key_material() {
        assert!(matches!(
            PublicKey::try_from(&[0u8; 31][..]),
            Err(Error::InvalidKeyMaterial(_))
        ));
        assert!(matches!(
            PrivateKey::try_from(&[0u8; 33][..]),
            Err(Error::InvalidKeyMaterial(_))
        ));
        assert!(matches!(
            Nonce::try_from(&[0u8; 12][..]),
            Err(Error::InvalidKeyMaterial(_))
        ));
        assert!(matches!(
            Nonce::from_encoded(&codec::encode([0u8; 32])),
            Err(Error::InvalidKeyMaterial(_))
        ));
    }

    #[test]
    fn test_private_key_debug_is_redacted() {
        let key = PrivateKey::from_bytes([9u8; KEY_SIZE]);
        let printed = format!("{:?}", key);
        assert_eq!(printed, "PrivateKey(..)");
        assert!(!printed.contains(&key.to_encoded()));
    }

    #[test]
    fn test_public_key_serde_uses_wire_text() {
        let key = PublicKey::from_bytes([1u8; KEY_SIZE]);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key.to_encoded()));

        let parsed: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, key);

        assert!(serde_json::from_str::<PublicKey>("\"c2hvcnQ=\"").is_err());
    }

    #[test]
    fn test_fingerprint_shape() {
        let fingerprint = PublicKey::from_bytes([3u8; KEY_SIZE]).fingerprint();
        let groups: Vec<&str> = fingerprint.split(' ').collect();
        assert_eq!(groups.len(), 8);
        assert!(groups.iter().all(|g| g.len() == 4));
    }
}
