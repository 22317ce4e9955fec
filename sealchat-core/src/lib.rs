//! Sealchat E2EE Core Library
//!
//! End-to-end encryption for direct messages: key custody, NaCl box
//! encryption, and best-effort opening of stored messages.

pub mod account;
pub mod codec;
pub mod config;
pub mod crypto;
mod error;
pub mod messaging;
pub mod models;
mod session;
pub mod transport;

pub use config::{Config, KeyStoreKind};
pub use crypto::{KeyManager, KeyPair, Nonce, PrivateKey, PublicKey, PublicKeyDirectory};
pub use error::{DecryptError, Error, Result};
pub use messaging::{
    DecryptionOrchestrator, OpenedMessage, CORRUPTED_KEY_PLACEHOLDER, UNDECRYPTABLE_PLACEHOLDER,
};
pub use models::{Message, Payload, SealedPayload, SendMessageInput, SendRequest};
pub use session::{LocalIdentity, Session};
pub use transport::MessageTransport;
