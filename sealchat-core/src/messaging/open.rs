use std::collections::{HashMap, HashSet};

use futures_util::future::join_all;
use tracing::{debug, error, warn};

use super::{FieldOutcome, OpenedMessage};
use crate::codec;
use crate::crypto::{engine, KeyManager, Nonce, PrivateKey, PublicKey, PublicKeyDirectory};
use crate::error::{DecryptError, Error};
use crate::models::{Message, Payload};

/// Key material resolved once per call and shared read-only across messages
struct KeyContext {
    /// `Err` says why no encrypted field can be opened
    private_key: Result<PrivateKey, DecryptError>,
    peer_keys: HashMap<String, PublicKey>,
}

impl KeyContext {
    fn without_key(reason: DecryptError) -> Self {
        Self {
            private_key: Err(reason),
            peer_keys: HashMap::new(),
        }
    }
}

/// Opens stored messages from the point of view of one local identity
///
/// The same key pairing is used whether the local identity sent or received
/// a message: its own private key with the other party's public key.
pub struct DecryptionOrchestrator<'a> {
    identity_id: &'a str,
    keys: &'a KeyManager,
    directory: &'a dyn PublicKeyDirectory,
}

impl<'a> DecryptionOrchestrator<'a> {
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

    /// Open a single message
    ///
    /// Never fails: missing keys, failed authentication and a corrupted
    /// local private key are all reported per field.
    pub async fn open(&self, message: Message) -> OpenedMessage {
        let context = self.prepare(std::slice::from_ref(&message)).await;
        self.open_with(message, &context)
    }

    /// Open a batch of messages
    ///
    /// The private key is loaded once and each distinct counterpart is looked
    /// up once, concurrently. Output order matches input order, and plaintext
    /// messages pass through whatever state the local key is in.
    pub async fn open_batch(&self, messages: Vec<Message>) -> Vec<OpenedMessage> {
        let context = self.prepare(&messages).await;
        messages
            .into_iter()
            .map(|message| self.open_with(message, &context))
            .collect()
    }

    async fn prepare(&self, messages: &[Message]) -> KeyContext {
        let sealed: Vec<&Message> = messages.iter().filter(|m| m.is_encrypted()).collect();
        if sealed.is_empty() {
            return KeyContext::without_key(DecryptError::KeysUnavailable);
        }

        let private_key = match self.keys.load(self.identity_id) {
            Ok(Some(key)) => key,
            Ok(None) => {
                debug!(
                    identity_id = self.identity_id,
                    "No local private key, encrypted messages stay sealed"
                );
                return KeyContext::without_key(DecryptError::KeysUnavailable);
            }
            Err(e @ (Error::MalformedEncoding(_) | Error::InvalidKeyMaterial(_))) => {
                error!(identity_id = self.identity_id, "Stored private key is corrupted: {}", e);
                return KeyContext::without_key(DecryptError::LocalKeyCorrupted);
            }
            Err(e) => {
                warn!(identity_id = self.identity_id, "Failed to load private key: {}", e);
                return KeyContext::without_key(DecryptError::KeysUnavailable);
            }
        };

        let counterparts: HashSet<&str> = sealed
            .iter()
            .map(|m| m.counterpart_of(self.identity_id))
            .collect();

        let lookups = counterparts
            .into_iter()
            .map(|id| async move { (id, self.lookup(id).await) });

        let peer_keys = join_all(lookups)
            .await
            .into_iter()
            .filter_map(|(id, key)| key.map(|key| (id.to_string(), key)))
            .collect();

        KeyContext {
            private_key: Ok(private_key),
            peer_keys,
        }
    }

    async fn lookup(&self, identity_id: &str) -> Option<PublicKey> {
        match self.directory.public_key(identity_id).await {
            Ok(Some(key)) => Some(key),
            Ok(None) => {
                debug!(identity_id, "Counterpart has no public key");
                None
            }
            Err(e) => {
                warn!(identity_id, "Public key lookup failed: {}", e);
                None
            }
        }
    }

    fn open_with(&self, message: Message, context: &KeyContext) -> OpenedMessage {
        let sealed = match &message.payload {
            Payload::Plain { text, image } => {
                let (text, image) = (text.clone(), image.clone());
                return OpenedMessage::with_plaintext(message, text, image);
            }
            Payload::Sealed(sealed) => sealed,
        };

        let counterpart = message.counterpart_of(self.identity_id);
        let role = if message.is_sent_by(self.identity_id) {
            "sender"
        } else {
            "receiver"
        };
        debug!(
            message_id = message.id.as_deref().unwrap_or("-"),
            role,
            counterpart,
            "Opening encrypted message"
        );

        let material = match (
            context.private_key.as_ref(),
            context.peer_keys.get(counterpart),
            sealed.nonce.as_deref(),
        ) {
            (Err(reason), _, _) => Err(*reason),
            (Ok(private_key), Some(public_key), Some(nonce)) => Ok((public_key, private_key, nonce)),
            _ => Err(DecryptError::KeysUnavailable),
        };

        let attempt = |field: &Option<String>| {
            field.as_deref().map(|ciphertext| match material {
                Ok((public_key, private_key, nonce)) => {
                    open_field(ciphertext, nonce, public_key, private_key)
                }
                Err(reason) => Err(reason),
            })
        };

        let text = attempt(&sealed.encrypted_text);
        let image = attempt(&sealed.encrypted_image);

        OpenedMessage {
            message,
            text,
            image,
        }
    }
}

/// Decode and decrypt one field; malformed encodings fail authentication
fn open_field(
    ciphertext: &str,
    nonce: &str,
    public_key: &PublicKey,
    private_key: &PrivateKey,
) -> FieldOutcome {
    let nonce = Nonce::from_encoded(nonce).map_err(|_| DecryptError::AuthenticationFailed)?;
    let ciphertext = codec::decode(ciphertext).map_err(|_| DecryptError::AuthenticationFailed)?;

    engine::decrypt(&ciphertext, &nonce, public_key, private_key)
        .map_err(|_| DecryptError::AuthenticationFailed)
}
