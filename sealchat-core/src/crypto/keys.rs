use std::sync::Arc;

use tracing::{info, warn};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use super::storage::KeyValueStore;
use super::types::{KeyPair, PrivateKey, PublicKey};
use crate::error::{Error, Result};

/// Namespace prefix for stored private keys
pub const PRIVATE_KEY_PREFIX: &str = "e2ee_private_key_";

/// Generate a new X25519 key pair from the OS CSPRNG
pub fn generate_key_pair() -> KeyPair {
    let private_key = StaticSecret::random_from_rng(rand::rngs::OsRng);
    let public_key = X25519Public::from(&private_key);

    KeyPair {
        public_key: PublicKey::from_bytes(public_key.to_bytes()),
        private_key: PrivateKey::from_bytes(private_key.to_bytes()),
    }
}

/// A private key backup ready to be written out or downloaded
#[derive(Debug, Clone)]
pub struct KeyExport {
    pub file_name: String,
    pub contents: Vec<u8>,
}

/// Custody of the local identity's private key
///
/// The stored value is the codec-encoded key text; export hands that text
/// out verbatim so a backup restores byte-for-byte.
#[derive(Clone)]
pub struct KeyManager {
    store: Arc<dyn KeyValueStore>,
}

impl KeyManager {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn storage_key(identity_id: &str) -> Result<String> {
        if identity_id.is_empty() {
            return Err(Error::Validation("Identity id cannot be empty".to_string()));
        }
        Ok(format!("{}{}", PRIVATE_KEY_PREFIX, identity_id))
    }

    pub fn generate_key_pair(&self) -> KeyPair {
        generate_key_pair()
    }

    /// Persist the private key for an identity, replacing any previous one
    pub fn save(&self, identity_id: &str, private_key: &PrivateKey) -> Result<()> {
        self.save_encoded(identity_id, &private_key.to_encoded())
    }

    fn save_encoded(&self, identity_id: &str, encoded: &str) -> Result<()> {
        let key = Self::storage_key(identity_id)?;
        if !self.store.is_available() {
            return Err(Error::StorageUnavailable(
                "Key storage is not available".to_string(),
            ));
        }

        self.store.set(&key, encoded)?;
        info!(identity_id, "Private key saved");
        Ok(())
    }

    /// The raw stored key text, or `None` if nothing is stored
    pub fn load_encoded(&self, identity_id: &str) -> Result<Option<String>> {
        let key = Self::storage_key(identity_id)?;
        if !self.store.is_available() {
            warn!(identity_id, "Key storage unavailable, treating private key as absent");
            return Ok(None);
        }

        self.store.get(&key)
    }

    /// Load the private key for an identity
    ///
    /// Missing keys are `Ok(None)`; a stored value that does not decode to a
    /// key is reported as corrupted state.
    pub fn load(&self, identity_id: &str) -> Result<Option<PrivateKey>> {
        self.load_encoded(identity_id)?
            .map(|text| PrivateKey::from_encoded(&text))
            .transpose()
    }

    /// Delete the stored private key. Idempotent.
    pub fn remove(&self, identity_id: &str) -> Result<()> {
        let key = Self::storage_key(identity_id)?;
        if !self.store.is_available() {
            return Err(Error::StorageUnavailable(
                "Key storage is not available".to_string(),
            ));
        }

        self.store.delete(&key)?;
        info!(identity_id, "Private key removed");
        Ok(())
    }

    pub fn exists(&self, identity_id: &str) -> bool {
        matches!(self.load(identity_id), Ok(Some(_)))
    }

    /// Derive the public half of the stored key
    pub fn public_key(&self, identity_id: &str) -> Result<Option<PublicKey>> {
        Ok(self.load(identity_id)?.map(|key| key.public_key()))
    }

    /// Produce a backup file of the stored key text
    pub fn export_to_file(&self, identity_id: &str, suggested_name: &str) -> Result<KeyExport> {
        let encoded = self
            .load_encoded(identity_id)?
            .ok_or_else(|| Error::NoKeyFound(identity_id.to_string()))?;

        info!(identity_id, "Private key exported");
        Ok(KeyExport {
            file_name: export_file_name(suggested_name),
            contents: encoded.into_bytes(),
        })
    }

    /// Restore a key from backup file contents, overwriting any existing key
    pub fn import(&self, file_contents: &[u8], identity_id: &str) -> Result<()> {
        let text = std::str::from_utf8(file_contents)
            .map_err(|e| Error::InvalidKeyFile(format!("not UTF-8 text: {}", e)))?
            .trim();

        PrivateKey::from_encoded(text)
            .map_err(|e| Error::InvalidKeyFile(format!("not a private key: {}", e)))?;

        if self.exists(identity_id) {
            warn!(identity_id, "Overwriting existing private key with imported key");
        }
        self.save_encoded(identity_id, text)
    }
}

/// `<name with whitespace runs as "_">_private_key.txt`
fn export_file_name(suggested_name: &str) -> String {
    // Each whitespace run, leading and trailing ones included, becomes one `_`
    let mut chars: Vec<Option<char>> = suggested_name
        .chars()
        .map(|c| (!c.is_whitespace()).then_some(c))
        .collect();
    chars.dedup_by(|a, b| a.is_none() && b.is_none());

    let stem: String = chars.into_iter().map(|c| c.unwrap_or('_')).collect();
    format!("{}_private_key.txt", stem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::storage::MemoryStore;

    fn manager() -> KeyManager {
        KeyManager::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_generated_pairs_are_consistent_and_distinct() {
        let first = generate_key_pair();
        let second = generate_key_pair();

        assert_eq!(first.private_key.public_key(), first.public_key);
        assert_ne!(first.public_key, second.public_key);
        assert_ne!(first.private_key, second.private_key);
    }

    #[test]
    fn test_save_load_remove() {
        let keys = manager();
        let pair = keys.generate_key_pair();

        assert!(!keys.exists("alice"));
        assert_eq!(keys.load("alice").unwrap(), None);

        keys.save("alice", &pair.private_key).unwrap();
        assert!(keys.exists("alice"));
        assert_eq!(keys.load("alice").unwrap(), Some(pair.private_key.clone()));
        assert_eq!(keys.public_key("alice").unwrap(), Some(pair.public_key));

        keys.remove("alice").unwrap();
        keys.remove("alice").unwrap();
        assert!(!keys.exists("alice"));
    }

    #[test]
    fn test_save_overwrites() {
        let keys = manager();
        let first = generate_key_pair();
        let second = generate_key_pair();

        keys.save("alice", &first.private_key).unwrap();
        keys.save("alice", &second.private_key).unwrap();
        assert_eq!(keys.load("alice").unwrap(), Some(second.private_key));
    }

    #[test]
    fn test_keys_are_scoped_per_identity() {
        let keys = manager();
        let pair = generate_key_pair();

        keys.save("alice", &pair.private_key).unwrap();
        assert!(keys.exists("alice"));
        assert!(!keys.exists("bob"));
    }

    #[test]
    fn test_unavailable_store_reads_as_absent() {
        let keys = KeyManager::new(Arc::new(MemoryStore::unavailable()));
        assert_eq!(keys.load("alice").unwrap(), None);
        assert!(!keys.exists("alice"));

        let pair = generate_key_pair();
        assert!(matches!(
            keys.save("alice", &pair.private_key),
            Err(Error::StorageUnavailable(_))
        ));
    }

    #[test]
    fn test_empty_identity_rejected() {
        let keys = manager();
        let pair = generate_key_pair();

        assert!(matches!(keys.save("", &pair.private_key), Err(Error::Validation(_))));
        assert!(matches!(keys.load(""), Err(Error::Validation(_))));
        assert!(matches!(keys.remove(""), Err(Error::Validation(_))));
        assert!(!keys.exists(""));
    }

    #[test]
    fn test_corrupted_stored_key_is_reported() {
        let store = Arc::new(MemoryStore::new());
        store.set("e2ee_private_key_alice", "%%% not base64").unwrap();
        let keys = KeyManager::new(store.clone());
        assert!(matches!(keys.load("alice"), Err(Error::MalformedEncoding(_))));

        store.set("e2ee_private_key_alice", "c2hvcnQ=").unwrap();
        assert!(matches!(keys.load("alice"), Err(Error::InvalidKeyMaterial(_))));
    }

    #[test]
    fn test_export_without_key() {
        let keys = manager();
        let result = keys.export_to_file("alice", "Alice");
        assert!(matches!(result, Err(Error::NoKeyFound(id)) if id == "alice"));
    }

    #[test]
    fn test_export_import_round_trip() {
        let keys = manager();
        let pair = generate_key_pair();
        keys.save("alice", &pair.private_key).unwrap();

        let export = keys.export_to_file("alice", "Alice  Liddell").unwrap();
        assert_eq!(export.file_name, "Alice_Liddell_private_key.txt");
        assert_eq!(export.contents, pair.private_key.to_encoded().into_bytes());

        keys.import(&export.contents, "alice-new-device").unwrap();
        assert_eq!(keys.load("alice-new-device").unwrap(), Some(pair.private_key));
        assert_eq!(
            keys.load_encoded("alice-new-device").unwrap().unwrap().as_bytes(),
            export.contents.as_slice()
        );
    }

    #[test]
    fn test_import_tolerates_trailing_newline() {
        let keys = manager();
        let pair = generate_key_pair();
        let contents = format!("{}\n", pair.private_key.to_encoded());

        keys.import(contents.as_bytes(), "alice").unwrap();
        assert_eq!(keys.load("alice").unwrap(), Some(pair.private_key));
    }

    #[test]
    fn test_import_rejects_bad_files() {
        let keys = manager();
        let pair = generate_key_pair();
        keys.save("alice", &pair.private_key).unwrap();

        let result = keys.import(&[0xff, 0xfe, 0x00], "alice");
        assert!(matches!(result, Err(Error::InvalidKeyFile(_))));

        let result = keys.import(b"definitely not a key", "alice");
        assert!(matches!(result, Err(Error::InvalidKeyFile(_))));

        // The existing key survives a rejected import
        assert_eq!(keys.load("alice").unwrap(), Some(pair.private_key));
    }

    #[test]
    fn test_import_overwrites_existing_key() {
        let keys = manager();
        let old = generate_key_pair();
        let new = generate_key_pair();
        keys.save("alice", &old.private_key).unwrap();

        keys.import(new.private_key.to_encoded().as_bytes(), "alice").unwrap();
        assert_eq!(keys.load("alice").unwrap(), Some(new.private_key));
    }

    #[test]
    fn test_export_file_name() {
        assert_eq!(export_file_name("Bob"), "Bob_private_key.txt");
        assert_eq!(export_file_name("Bob  the\tBuilder"), "Bob_the_Builder_private_key.txt");
        assert_eq!(export_file_name(" Bob "), "_Bob__private_key.txt");
        assert_eq!(export_file_name("bob__jr"), "bob__jr_private_key.txt");
    }
}
