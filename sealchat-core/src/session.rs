use std::sync::Arc;

use tracing::{info, warn};

use crate::crypto::{KeyExport, KeyManager, PublicKeyDirectory};
use crate::error::Result;
use crate::messaging::{Composer, DecryptionOrchestrator, OpenedMessage};
use crate::models::{Message, SendMessageInput};
use crate::transport::MessageTransport;

/// The authenticated local user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub id: String,
    pub display_name: String,
}

impl LocalIdentity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Everything a logged-in client needs to send and read messages
///
/// Created on login and consumed on logout. The stored private key outlives
/// the session.
pub struct Session {
    identity: LocalIdentity,
    keys: KeyManager,
    directory: Arc<dyn PublicKeyDirectory>,
    transport: Arc<dyn MessageTransport>,
}

impl Session {
    pub fn login(
        identity: LocalIdentity,
        keys: KeyManager,
        directory: Arc<dyn PublicKeyDirectory>,
        transport: Arc<dyn MessageTransport>,
    ) -> Self {
        if !keys.exists(&identity.id) {
            warn!(
                identity_id = %identity.id,
                "No private key on this device, encrypted messages will not be readable"
            );
        }
        info!(identity_id = %identity.id, "Session started");

        Self {
            identity,
            keys,
            directory,
            transport,
        }
    }

    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    pub fn keys(&self) -> &KeyManager {
        &self.keys
    }

    fn orchestrator(&self) -> DecryptionOrchestrator<'_> {
        DecryptionOrchestrator::new(&self.identity.id, &self.keys, self.directory.as_ref())
    }

    /// Open a message delivered to this session, e.g. a real-time push
    pub async fn open(&self, message: Message) -> OpenedMessage {
        self.orchestrator().open(message).await
    }

    pub async fn open_batch(&self, messages: Vec<Message>) -> Vec<OpenedMessage> {
        self.orchestrator().open_batch(messages).await
    }

    /// Fetch and open the conversation with `peer_id`
    pub async fn load_conversation(&self, peer_id: &str) -> Result<Vec<OpenedMessage>> {
        let messages = self.transport.conversation(peer_id).await?;
        Ok(self.open_batch(messages).await)
    }

    /// Encrypt (or fall back to plaintext), submit, and return the stored
    /// record displayed with the plaintext that was just typed
    pub async fn send(&self, input: SendMessageInput) -> Result<OpenedMessage> {
        let composed = Composer::new(&self.identity.id, &self.keys, self.directory.as_ref())
            .compose(&input)
            .await?;

        let stored = self
            .transport
            .submit(&input.receiver_id, &composed.request)
            .await?;

        info!(
            receiver_id = %input.receiver_id,
            encrypted = composed.encrypted,
            "Message sent"
        );
        Ok(OpenedMessage::with_plaintext(stored, input.text, input.image))
    }

    /// Backup file of this identity's private key
    pub fn export_private_key(&self) -> Result<KeyExport> {
        self.keys
            .export_to_file(&self.identity.id, &self.identity.display_name)
    }

    /// Restore this identity's private key from a backup file
    pub fn import_private_key(&self, file_contents: &[u8]) -> Result<()> {
        self.keys.import(file_contents, &self.identity.id)
    }

    pub fn logout(self) {
        info!(identity_id = %self.identity.id, "Session ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{MemoryDirectory, MemoryStore};
    use crate::transport::{MemoryMessageStore, MemoryTransport};

    #[tokio::test]
    async fn test_send_displays_local_plaintext() {
        let store = MemoryMessageStore::new();
        let session = Session::login(
            LocalIdentity::new("alice", "Alice Smith"),
            KeyManager::new(Arc::new(MemoryStore::new())),
            Arc::new(MemoryDirectory::new()),
            Arc::new(MemoryTransport::new(store.clone(), "alice")),
        );

        let sent = session
            .send(SendMessageInput::text("bob", "hello"))
            .await
            .unwrap();

        // Nobody has keys, so the message went out in the clear
        assert!(!sent.message.is_encrypted());
        assert_eq!(sent.display_text().as_deref(), Some("hello"));
        assert!(sent.message.id.is_some());
        session.logout();
    }

    #[tokio::test]
    async fn test_export_uses_display_name() {
        let keys = KeyManager::new(Arc::new(MemoryStore::new()));
        crate::account::enroll(&keys, "alice").unwrap();

        let session = Session::login(
            LocalIdentity::new("alice", "Alice  Smith"),
            keys,
            Arc::new(MemoryDirectory::new()),
            Arc::new(MemoryTransport::new(MemoryMessageStore::new(), "alice")),
        );

        let export = session.export_private_key().unwrap();
        assert_eq!(export.file_name, "Alice_Smith_private_key.txt");
    }
}
