use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use garde::Validate;
use tracing::debug;

use crate::crypto::{
    CachedDirectory, FileStore, HttpDirectory, KeyManager, KeyValueStore, KeyringStore,
    MemoryStore, PublicKeyCache, PublicKeyDirectory,
};
use crate::error::{Error, Result};
use crate::transport::{HttpTransport, MessageTransport};

const DEFAULT_SERVER_URL: &str = "http://localhost:5001/api";
const DEFAULT_KEY_DIR: &str = ".sealchat/keys";
const DEFAULT_KEYRING_SERVICE: &str = "sealchat";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Where private keys are kept on this device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStoreKind {
    Keyring,
    File,
    Memory,
}

impl FromStr for KeyStoreKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyring" => Ok(Self::Keyring),
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            other => Err(Error::Config(format!("unknown key store '{}'", other))),
        }
    }
}

fn http_url(value: &url::Url, _: &()) -> garde::Result {
    if matches!(value.scheme(), "http" | "https") && !value.cannot_be_a_base() {
        Ok(())
    } else {
        Err(garde::Error::new("must be an http(s) base URL"))
    }
}

/// Client configuration read from the environment
#[derive(Debug, Clone, Validate)]
#[garde(context(()))]
pub struct Config {
    #[garde(custom(http_url))]
    pub server_url: url::Url,
    #[garde(skip)]
    pub key_store: KeyStoreKind,
    #[garde(skip)]
    pub key_dir: PathBuf,
    #[garde(length(min = 1, max = 255))]
    pub keyring_service: String,
    #[garde(skip)]
    pub auth_token: Option<String>,
    #[garde(range(min = 1, max = 300))]
    pub http_timeout_secs: u64,
    #[garde(skip)]
    pub key_cache_db: Option<PathBuf>,
}

impl Config {
    /// Load `.env` if present, then read `SEALCHAT_*` variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source; empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let server_url = var("SEALCHAT_SERVER_URL").unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        let server_url = url::Url::parse(&server_url)
            .map_err(|e| Error::Config(format!("SEALCHAT_SERVER_URL: {}", e)))?;

        let key_store = match var("SEALCHAT_KEY_STORE") {
            Some(value) => value.parse()?,
            None => KeyStoreKind::File,
        };

        let http_timeout_secs = match var("SEALCHAT_HTTP_TIMEOUT_SECS") {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("SEALCHAT_HTTP_TIMEOUT_SECS: {}", e)))?,
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        let config = Self {
            server_url,
            key_store,
            key_dir: var("SEALCHAT_KEY_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_KEY_DIR)),
            keyring_service: var("SEALCHAT_KEYRING_SERVICE")
                .unwrap_or_else(|| DEFAULT_KEYRING_SERVICE.to_string()),
            auth_token: var("SEALCHAT_AUTH_TOKEN"),
            http_timeout_secs,
            key_cache_db: var("SEALCHAT_KEY_CACHE_DB").map(PathBuf::from),
        };

        config
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;

        debug!(
            server_url = %config.server_url,
            key_store = ?config.key_store,
            "Configuration loaded"
        );
        Ok(config)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn key_store(&self) -> Arc<dyn KeyValueStore> {
        match self.key_store {
            KeyStoreKind::Keyring => Arc::new(KeyringStore::new(self.keyring_service.clone())),
            KeyStoreKind::File => Arc::new(FileStore::new(self.key_dir.clone())),
            KeyStoreKind::Memory => Arc::new(MemoryStore::new()),
        }
    }

    pub fn key_manager(&self) -> KeyManager {
        KeyManager::new(self.key_store())
    }

    /// HTTP directory, behind the SQLite cache when one is configured
    pub fn directory(&self) -> Result<Arc<dyn PublicKeyDirectory>> {
        let http = Arc::new(HttpDirectory::new(
            self.server_url.clone(),
            self.auth_token.clone(),
            self.http_timeout(),
        )?);

        match &self.key_cache_db {
            Some(path) => Ok(Arc::new(CachedDirectory::new(http, PublicKeyCache::open(path)?))),
            None => Ok(http),
        }
    }

    pub fn transport(&self) -> Result<Arc<dyn MessageTransport>> {
        Ok(Arc::new(HttpTransport::new(
            self.server_url.clone(),
            self.auth_token.clone(),
            self.http_timeout(),
        )?))
    }
}
