//! Authenticated public-key encryption (NaCl `box`).
//!
//! X25519 key agreement, XSalsa20 stream cipher, Poly1305 authenticator.
//! The box is symmetric in its key roles: a ciphertext produced with
//! `(recipient public, sender private)` opens with `(sender public,
//! recipient private)` and equally with the original pairing, because both
//! sides derive the same shared secret.

use crypto_box::aead::{generic_array::GenericArray, Aead};
use crypto_box::SalsaBox;
use rand::RngCore;

use super::types::{Nonce, PrivateKey, PublicKey, NONCE_SIZE, TAG_SIZE};
use crate::error::{Error, Result};

fn salsa_box(public_key: &PublicKey, private_key: &PrivateKey) -> SalsaBox {
    let public = crypto_box::PublicKey::from(*public_key.as_bytes());
    let secret = crypto_box::SecretKey::from(*private_key.as_bytes());
    SalsaBox::new(&public, &secret)
}

/// Generate a random 24-byte nonce. Never reuse one across messages.
pub fn generate_nonce() -> Nonce {
    let mut bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    Nonce::from_bytes(bytes)
}

/// Encrypt a payload for `recipient_public_key` as the owner of `sender_private_key`
///
/// Output is `payload.len() + TAG_SIZE` bytes.
pub fn encrypt(
    payload: &[u8],
    nonce: &Nonce,
    recipient_public_key: &PublicKey,
    sender_private_key: &PrivateKey,
) -> Result<Vec<u8>> {
    salsa_box(recipient_public_key, sender_private_key)
        .encrypt(GenericArray::from_slice(nonce.as_bytes()), payload)
        .map_err(|_| Error::Encryption)
}

/// Decrypt and verify a ciphertext
///
/// Any failure (bad tag, wrong keys, truncated input) is reported as the
/// same `AuthenticationFailed`; no partial plaintext is ever returned.
pub fn decrypt(
    ciphertext: &[u8],
    nonce: &Nonce,
    sender_public_key: &PublicKey,
    recipient_private_key: &PrivateKey,
) -> Result<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(Error::AuthenticationFailed);
    }

    salsa_box(sender_public_key, recipient_private_key)
        .decrypt(GenericArray::from_slice(nonce.as_bytes()), ciphertext)
        .map_err(|_| Error::AuthenticationFailed)
}

/// [`encrypt`] over raw byte slices, validating key and nonce lengths
pub fn encrypt_raw(
    payload: &[u8],
    nonce: &[u8],
    recipient_public_key: &[u8],
    sender_private_key: &[u8],
) -> Result<Vec<u8>> {
    let nonce = Nonce::try_from(nonce)?;
    let public_key = PublicKey::try_from(recipient_public_key)?;
    let private_key = PrivateKey::try_from(sender_private_key)?;
    encrypt(payload, &nonce, &public_key, &private_key)
}

/// [`decrypt`] over raw byte slices; malformed material fails authentication
pub fn decrypt_raw(
    ciphertext: &[u8],
    nonce: &[u8],
    sender_public_key: &[u8],
    recipient_private_key: &[u8],
) -> Result<Vec<u8>> {
    let (Ok(nonce), Ok(public_key), Ok(private_key)) = (
        Nonce::try_from(nonce),
        PublicKey::try_from(sender_public_key),
        PrivateKey::try_from(recipient_private_key),
    ) else {
        return Err(Error::AuthenticationFailed);
    };
    decrypt(ciphertext, &nonce, &public_key, &private_key)
}
