//! Key provisioning when an identity is created.

use tracing::info;

use crate::crypto::{KeyManager, PrivateKey, PublicKey};
use crate::error::{Error, Result};

/// Create the key pair for a new identity
///
/// The private key is stored locally and the public key is returned for
/// publication to the directory. An identity has at most one key pair;
/// enrolling an identity that already holds a private key is refused.
pub fn enroll(keys: &KeyManager, identity_id: &str) -> Result<PublicKey> {
    if keys.load(identity_id)?.is_some() {
        return Err(Error::Validation(format!(
            "Identity {} already has a private key",
            identity_id
        )));
    }

    let pair = keys.generate_key_pair();
    keys.save(identity_id, &pair.private_key)?;

    info!(identity_id, fingerprint = %pair.public_key.fingerprint(), "Identity enrolled");
    Ok(pair.public_key)
}

/// Take custody of a private key issued by the server at signup
///
/// The server hands the key out exactly once, so it is validated before it
/// replaces anything in local storage.
pub fn accept_issued_key(
    keys: &KeyManager,
    identity_id: &str,
    encoded_private_key: &str,
) -> Result<PublicKey> {
    let private_key = PrivateKey::from_encoded(encoded_private_key.trim())?;
    keys.save(identity_id, &private_key)?;

    let public_key = private_key.public_key();
    info!(identity_id, fingerprint = %public_key.fingerprint(), "Issued private key stored");
    Ok(public_key)
}
