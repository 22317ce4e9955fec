use thiserror::Error;

/// Errors surfaced by the encryption core.
///
/// `AuthenticationFailed` and `KeysUnavailable` are expected, recoverable
/// conditions. `MalformedEncoding`, `InvalidKeyMaterial` and `InvalidKeyFile`
/// point at corrupted local state or a bad import and must be shown to the
/// user as such, not as "cannot decrypt".
#[derive(Debug, Error)]
pub enum Error {
    #[error("Malformed encoding: {0}")]
    MalformedEncoding(#[from] base64::DecodeError),

    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("No private key found for identity {0}")]
    NoKeyFound(String),

    #[error("Invalid key file: {0}")]
    InvalidKeyFile(String),

    #[error("Encryption keys unavailable")]
    KeysUnavailable,

    #[error("Key storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Key storage error: {0}")]
    Storage(String),

    #[error("Directory lookup failed: {0}")]
    Directory(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Encryption failed")]
    Encryption,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a single encrypted field has no plaintext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecryptError {
    /// The counterpart public key, the local private key or the nonce was
    /// missing, so decryption was never attempted.
    #[error("Encryption keys unavailable")]
    KeysUnavailable,

    /// Decryption was attempted and the authenticator did not verify.
    #[error("Unable to decrypt")]
    AuthenticationFailed,

    /// The stored private key does not decode; only re-importing a key
    /// fixes this.
    #[error("Stored private key is corrupted")]
    LocalKeyCorrupted,
}

impl From<DecryptError> for Error {
    fn from(err: DecryptError) -> Self {
        match err {
            DecryptError::KeysUnavailable => Error::KeysUnavailable,
            DecryptError::AuthenticationFailed => Error::AuthenticationFailed,
            DecryptError::LocalKeyCorrupted => {
                Error::InvalidKeyMaterial("Stored private key is corrupted".to_string())
            }
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl Error {
    /// True for conditions the message pipeline absorbs instead of reporting.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::AuthenticationFailed | Error::KeysUnavailable)
    }
}
