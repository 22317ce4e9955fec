//! Key material, key custody and the authenticated-encryption primitive.

pub mod directory;
pub mod engine;
pub mod keys;
pub mod storage;
mod types;

pub use directory::{CachedDirectory, HttpDirectory, MemoryDirectory, PublicKeyDirectory};
pub use engine::{decrypt, encrypt, generate_nonce};
pub use keys::{generate_key_pair, KeyExport, KeyManager};
pub use storage::{FileStore, KeyValueStore, KeyringStore, MemoryStore, PublicKeyCache};
pub use types::{KeyPair, Nonce, PrivateKey, PublicKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
