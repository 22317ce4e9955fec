use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::storage::PublicKeyCache;
use super::types::PublicKey;
use crate::error::{Error, Result};

/// Server-held mapping from identity id to public key
///
/// `Ok(None)` means the identity has no published key.
#[async_trait]
pub trait PublicKeyDirectory: Send + Sync {
    async fn public_key(&self, identity_id: &str) -> Result<Option<PublicKey>>;
}

/// Fixed directory, for tests and pre-warmed caches
#[derive(Default)]
pub struct MemoryDirectory {
    keys: RwLock<HashMap<String, PublicKey>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, identity_id: impl Into<String>, public_key: PublicKey) {
        if let Ok(mut keys) = self.keys.write() {
            keys.insert(identity_id.into(), public_key);
        }
    }
}

#[async_trait]
impl PublicKeyDirectory for MemoryDirectory {
    async fn public_key(&self, identity_id: &str) -> Result<Option<PublicKey>> {
        let keys = self
            .keys
            .read()
            .map_err(|e| Error::Directory(e.to_string()))?;
        Ok(keys.get(identity_id).copied())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicKeyResponse {
    public_key: String,
}

/// Directory served by the chat backend at `GET {base}/messages/publicKey/{id}`
pub struct HttpDirectory {
    client: reqwest::Client,
    base_url: url::Url,
    auth_token: Option<String>,
}

impl HttpDirectory {
    pub fn new(base_url: url::Url, auth_token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Directory(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            auth_token,
        })
    }

    fn endpoint(&self, identity_id: &str) -> Result<url::Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(["messages", "publicKey", identity_id]);
        Ok(url)
    }
}

#[async_trait]
impl PublicKeyDirectory for HttpDirectory {
    async fn public_key(&self, identity_id: &str) -> Result<Option<PublicKey>> {
        let mut request = self.client.get(self.endpoint(identity_id)?);
        if let Some(token) = &self.auth_token {
            request = request.header(reqwest::header::COOKIE, format!("jwt={}", token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Directory(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(identity_id, "No public key published");
            return Ok(None);
        }

        let body: PublicKeyResponse = response
            .error_for_status()
            .map_err(|e| Error::Directory(e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::Directory(e.to_string()))?;

        PublicKey::from_encoded(&body.public_key).map(Some)
    }
}

/// Serves keys from the local SQLite cache, falling back to `upstream`
pub struct CachedDirectory {
    upstream: Arc<dyn PublicKeyDirectory>,
    cache: PublicKeyCache,
}

impl CachedDirectory {
    pub fn new(upstream: Arc<dyn PublicKeyDirectory>, cache: PublicKeyCache) -> Self {
        Self { upstream, cache }
    }

    pub fn cache(&self) -> &PublicKeyCache {
        &self.cache
    }
}

#[async_trait]
impl PublicKeyDirectory for CachedDirectory {
    async fn public_key(&self, identity_id: &str) -> Result<Option<PublicKey>> {
        match self.cache.load(identity_id) {
            Ok(Some(key)) => return Ok(Some(key)),
            Ok(None) => {}
            Err(e) => warn!(identity_id, "Ignoring unreadable cached key: {}", e),
        }

        let fetched = self.upstream.public_key(identity_id).await?;
        if let Some(key) = &fetched {
            if let Err(e) = self.cache.store(identity_id, key) {
                warn!(identity_id, "Failed to cache public key: {}", e);
            }
        }
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDirectory {
        inner: MemoryDirectory,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PublicKeyDirectory for CountingDirectory {
        async fn public_key(&self, identity_id: &str) -> Result<Option<PublicKey>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.public_key(identity_id).await
        }
    }

    #[tokio::test]
    async fn test_memory_directory() {
        let directory = MemoryDirectory::new();
        let key = PublicKey::from_bytes([8u8; 32]);
        directory.insert("bob", key);

        assert_eq!(directory.public_key("bob").await.unwrap(), Some(key));
        assert_eq!(directory.public_key("carol").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cached_directory_hits_upstream_once() {
        let key = PublicKey::from_bytes([4u8; 32]);
        let upstream = Arc::new(CountingDirectory {
            inner: MemoryDirectory::new(),
            calls: AtomicUsize::new(0),
        });
        upstream.inner.insert("bob", key);

        let directory =
            CachedDirectory::new(upstream.clone(), PublicKeyCache::open_in_memory().unwrap());

        assert_eq!(directory.public_key("bob").await.unwrap(), Some(key));
        assert_eq!(directory.public_key("bob").await.unwrap(), Some(key));
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);

        // Misses are not cached
        assert_eq!(directory.public_key("carol").await.unwrap(), None);
        assert_eq!(directory.public_key("carol").await.unwrap(), None);
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_http_endpoint_path() {
        let base = url::Url::parse("http://localhost:5001/api/").unwrap();
        let directory = HttpDirectory::new(base, None, Duration::from_secs(5)).unwrap();
        assert_eq!(
            directory.endpoint("abc123").unwrap().as_str(),
            "http://localhost:5001/api/messages/publicKey/abc123"
        );

        let base = url::Url::parse("http://localhost:5001/api").unwrap();
        let directory = HttpDirectory::new(base, None, Duration::from_secs(5)).unwrap();
        assert_eq!(
            directory.endpoint("a b").unwrap().as_str(),
            "http://localhost:5001/api/messages/publicKey/a%20b"
        );
    }
}
