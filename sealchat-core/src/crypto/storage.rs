use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use keyring::Entry;
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use super::types::PublicKey;
use crate::error::{Error, Result};

const AVAILABILITY_KEY: &str = "__storage_test__";

/// Client-local, namespaced key-value store holding encoded private keys
///
/// Callers check [`KeyValueStore::is_available`] first; an unavailable store
/// is a recoverable condition.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
    fn is_available(&self) -> bool;
}

/// Process-local store, mostly for tests and ephemeral sessions
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
    disabled: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that reports itself unavailable and refuses every operation
    pub fn unavailable() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            disabled: true,
        }
    }

    fn check(&self) -> Result<()> {
        if self.disabled {
            return Err(Error::StorageUnavailable("memory store disabled".to_string()));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        let entries = self.entries.read().map_err(|e| Error::Storage(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check()?;
        self.entries
            .write()
            .map_err(|e| Error::Storage(e.to_string()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.check()?;
        self.entries
            .write()
            .map_err(|e| Error::Storage(e.to_string()))?
            .remove(key);
        Ok(())
    }

    fn is_available(&self) -> bool {
        !self.disabled
    }
}

/// OS keyring (Windows Credential Manager, macOS Keychain, Linux Secret Service)
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key)
            .map_err(|e| Error::Storage(format!("Failed to create keyring entry: {}", e)))
    }
}

impl KeyValueStore for KeyringStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Error::Storage(format!("Failed to read keyring entry: {}", e))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| Error::Storage(format!("Failed to write keyring entry: {}", e)))
    }

    fn delete(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()), // Already deleted
            Err(e) => Err(Error::Storage(format!("Failed to delete keyring entry: {}", e))),
        }
    }

    /// A read of a key that never exists; nothing is written
    fn is_available(&self) -> bool {
        self.entry(AVAILABILITY_KEY)
            .map(|entry| lookup_succeeded(&entry.get_password()))
            .unwrap_or(false)
    }
}

/// A keyring that answers a lookup, even with "no entry", is usable
fn lookup_succeeded(result: &keyring::Result<String>) -> bool {
    matches!(result, Ok(_) | Err(keyring::Error::NoEntry))
}

/// One file per key inside a private directory
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len());
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' || byte == b'.' {
                name.push(byte as char);
            } else {
                name.push_str(&format!("%{:02X}", byte));
            }
        }
        self.dir.join(name)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Storage(format!("Failed to read {}: {}", key, e))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| Error::StorageUnavailable(format!("{}: {}", self.dir.display(), e)))?;

        // Temp file is created 0600 and renamed over the target
        let mut file = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| Error::Storage(e.to_string()))?;
        file.write_all(value.as_bytes())
            .map_err(|e| Error::Storage(e.to_string()))?;
        file.persist(self.path_for(key))
            .map_err(|e| Error::Storage(format!("Failed to write {}: {}", key, e)))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("Failed to delete {}: {}", key, e))),
        }
    }

    fn is_available(&self) -> bool {
        fs::create_dir_all(&self.dir).is_ok() && tempfile::NamedTempFile::new_in(&self.dir).is_ok()
    }
}

/// SQLite cache of peer public keys fetched from the directory
///
/// Keys are never rotated, so a cached entry stays valid.
pub struct PublicKeyCache {
    conn: Mutex<Connection>,
}

impl PublicKeyCache {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS public_keys (
                user_id TEXT PRIMARY KEY,
                public_key BLOB NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| Error::Storage(e.to_string()))
    }

    /// Store or refresh a peer public key
    pub fn store(&self, user_id: &str, public_key: &PublicKey) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();

        self.conn()?.execute(
            "INSERT INTO public_keys (user_id, public_key, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
             public_key = ?2, updated_at = ?4",
            (user_id, &public_key.as_bytes()[..], now, now),
        )?;
        debug!(user_id, "Cached peer public key");
        Ok(())
    }

    /// Load a cached peer public key
    pub fn load(&self, user_id: &str) -> Result<Option<PublicKey>> {
        let bytes: Option<Vec<u8>> = self
            .conn()?
            .query_row(
                "SELECT public_key FROM public_keys WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )
            .optional()?;

        bytes.map(|b| PublicKey::try_from(b.as_slice())).transpose()
    }

    /// Every cached entry, for warming an in-memory directory
    pub fn load_all(&self) -> Result<Vec<(String, PublicKey)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT user_id, public_key FROM public_keys")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?
            .filter_map(|r| r.ok())
            .filter_map(|(user_id, bytes)| {
                PublicKey::try_from(bytes.as_slice())
                    .ok()
                    .map(|key| (user_id, key))
            })
            .collect();

        Ok(rows)
    }

    pub fn forget(&self, user_id: &str) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM public_keys WHERE user_id = ?1", [user_id])?;
        Ok(())
    }
}
