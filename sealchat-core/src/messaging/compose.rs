use tracing::{debug, warn};

use crate::codec;
use crate::crypto::{engine, KeyManager, PublicKey, PublicKeyDirectory};
use crate::error::Result;
use crate::models::{Payload, SealedPayload, SendMessageInput, SendRequest, ValidateExt};

/// An outgoing message ready for the transport
#[derive(Debug, Clone)]
pub struct ComposedMessage {
    pub request: SendRequest,
    /// False when keys were missing and the message goes out as plaintext
    pub encrypted: bool,
}

/// Seals outgoing messages for one local identity
pub struct Composer<'a> {
    identity_id: &'a str,
    keys: &'a KeyManager,
    directory: &'a dyn PublicKeyDirectory,
}

impl<'a> Composer<'a> {
    pub fn new(
        identity_id: &'a str,
        keys: &'a KeyManager,
        directory: &'a dyn PublicKeyDirectory,
    ) -> Self {
        Self {
            identity_id,
            keys,
            directory,
        }
    }

    /// Validate and encrypt a message for its recipient
    ///
    /// Falls back to plaintext when the recipient has no public key or the
    /// local identity has no private key. Both fields share one fresh nonce.
    pub async fn compose(&self, input: &SendMessageInput) -> Result<ComposedMessage> {
        input.validate_input()?;

        let recipient_key = self.recipient_key(&input.receiver_id).await;
        let private_key = self.keys.load(self.identity_id)?;

        let (Some(recipient_key), Some(private_key)) = (recipient_key, private_key) else {
            warn!(
                receiver_id = %input.receiver_id,
                "Encryption keys unavailable, sending message unencrypted"
            );
            let payload = Payload::Plain {
                text: input.text.clone(),
                image: input.image.clone(),
            };
            return Ok(ComposedMessage {
                request: payload.into(),
                encrypted: false,
            });
        };

        let nonce = engine::generate_nonce();
        let seal = |field: &Option<String>| -> Result<Option<String>> {
            match field.as_deref().filter(|value| !value.is_empty()) {
                Some(value) => {
                    let ciphertext =
                        engine::encrypt(value.as_bytes(), &nonce, &recipient_key, &private_key)?;
                    Ok(Some(codec::encode(ciphertext)))
                }
                None => Ok(None),
            }
        };

        let payload = Payload::Sealed(SealedPayload {
            encrypted_text: seal(&input.text)?,
            encrypted_image: seal(&input.image)?,
            nonce: Some(nonce.to_encoded()),
        });

        debug!(receiver_id = %input.receiver_id, "Message encrypted");
        Ok(ComposedMessage {
            request: payload.into(),
            encrypted: true,
        })
    }

    async fn recipient_key(&self, receiver_id: &str) -> Option<PublicKey> {
        match self.directory.public_key(receiver_id).await {
            Ok(key) => key,
            Err(e) => {
                warn!(receiver_id, "Public key lookup failed: {}", e);
                None
            }
        }
    }
}
