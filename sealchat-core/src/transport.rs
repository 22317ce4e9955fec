//! Message store and delivery collaborators.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{Message, SendRequest};

/// Durable message storage with delivery to the receiver
///
/// The sender is the authenticated session behind the transport, so only the
/// receiver is named.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Store a message and return the record with its server-assigned id and timestamps
    async fn submit(&self, receiver_id: &str, request: &SendRequest) -> Result<Message>;

    /// Every message exchanged with `peer_id`, oldest first
    async fn conversation(&self, peer_id: &str) -> Result<Vec<Message>>;
}

/// Chat backend at `POST {base}/messages/send/{id}` and `GET {base}/messages/{id}`
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: url::Url,
    auth_token: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: url::Url, auth_token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            auth_token,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<url::Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.header(reqwest::header::COOKIE, format!("jwt={}", token)),
            None => request,
        }
    }
}

#[async_trait]
impl MessageTransport for HttpTransport {
    async fn submit(&self, receiver_id: &str, request: &SendRequest) -> Result<Message> {
        let url = self.endpoint(&["messages", "send", receiver_id])?;

        let message = self
            .authorize(self.client.post(url).json(request))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| Error::Transport(e.to_string()))?
            .json::<Message>()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        debug!(receiver_id, encrypted = message.is_encrypted(), "Message submitted");
        Ok(message)
    }

    async fn conversation(&self, peer_id: &str) -> Result<Vec<Message>> {
        let url = self.endpoint(&["messages", peer_id])?;

        self.authorize(self.client.get(url))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| Error::Transport(e.to_string()))?
            .json::<Vec<Message>>()
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }
}

/// In-process message store shared by several [`MemoryTransport`] sessions
#[derive(Default)]
pub struct MemoryMessageStore {
    messages: RwLock<Vec<Message>>,
    next_id: AtomicU64,
}

impl MemoryMessageStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every stored record, in insertion order
    pub fn messages(&self) -> Vec<Message> {
        self.messages
            .read()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    /// Replace a stored record by id; used to simulate corrupted storage
    pub fn replace(&self, message: Message) -> Result<()> {
        let mut messages = self
            .messages
            .write()
            .map_err(|e| Error::Transport(e.to_string()))?;

        let slot = messages
            .iter_mut()
            .find(|stored| stored.id.is_some() && stored.id == message.id)
            .ok_or_else(|| Error::Transport("message not found".to_string()))?;
        *slot = message;
        Ok(())
    }
}

/// Transport bound to one user of a [`MemoryMessageStore`]
pub struct MemoryTransport {
    store: Arc<MemoryMessageStore>,
    user_id: String,
}

impl MemoryTransport {
    pub fn new(store: Arc<MemoryMessageStore>, user_id: impl Into<String>) -> Self {
        Self {
            store,
            user_id: user_id.into(),
        }
    }
}

#[async_trait]
impl MessageTransport for MemoryTransport {
    async fn submit(&self, receiver_id: &str, request: &SendRequest) -> Result<Message> {
        let mut message =
            Message::from_submission(&self.user_id, receiver_id, request.clone(), Utc::now());
        let id = self.store.next_id.fetch_add(1, Ordering::Relaxed);
        message.id = Some(format!("{:024x}", id));

        self.store
            .messages
            .write()
            .map_err(|e| Error::Transport(e.to_string()))?
            .push(message.clone());
        Ok(message)
    }

    async fn conversation(&self, peer_id: &str) -> Result<Vec<Message>> {
        let me = self.user_id.as_str();
        let messages = self
            .store
            .messages
            .read()
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(messages
            .iter()
            .filter(|m| {
                (m.sender_id == me && m.receiver_id == peer_id)
                    || (m.sender_id == peer_id && m.receiver_id == me)
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_transport_conversation() {
        let store = MemoryMessageStore::new();
        let alice = MemoryTransport::new(store.clone(), "alice");
        let bob = MemoryTransport::new(store.clone(), "bob");
        let carol = MemoryTransport::new(store.clone(), "carol");

        let request = SendRequest {
            text: Some("hi".to_string()),
            ..Default::default()
        };
        let first = alice.submit("bob", &request).await.unwrap();
        bob.submit("alice", &request).await.unwrap();
        carol.submit("bob", &request).await.unwrap();

        assert!(first.id.is_some());
        assert!(first.created_at.is_some());

        let thread = bob.conversation("alice").await.unwrap();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0].id, first.id);
        assert_eq!(store.messages().len(), 3);
    }

    #[tokio::test]
    async fn test_replace_stored_message() {
        let store = MemoryMessageStore::new();
        let alice = MemoryTransport::new(store.clone(), "alice");
        let mut stored = alice
            .submit("bob", &SendRequest::default())
            .await
            .unwrap();

        stored.receiver_id = "carol".to_string();
        store.replace(stored).unwrap();
        assert_eq!(store.messages()[0].receiver_id, "carol");

        let missing = Message::from_submission("a", "b", SendRequest::default(), Utc::now());
        assert!(store.replace(missing).is_err());
    }

    #[test]
    fn test_http_endpoints() {
        let base = url::Url::parse("http://localhost:5001/api").unwrap();
        let transport = HttpTransport::new(base, None, Duration::from_secs(5)).unwrap();

        assert_eq!(
            transport.endpoint(&["messages", "send", "bob"]).unwrap().as_str(),
            "http://localhost:5001/api/messages/send/bob"
        );
        assert_eq!(
            transport.endpoint(&["messages", "bob"]).unwrap().as_str(),
            "http://localhost:5001/api/messages/bob"
        );
    }
}
