//! Per-message key selection: opening stored messages and sealing outgoing ones.

mod compose;
mod open;

pub use compose::{ComposedMessage, Composer};
pub use open::DecryptionOrchestrator;

use std::borrow::Cow;

use crate::error::DecryptError;
use crate::models::Message;

/// Shown in place of a field that was attempted and failed to decrypt
pub const UNDECRYPTABLE_PLACEHOLDER: &str = "[Encrypted message - unable to decrypt]";

/// Shown in place of an encrypted field while the local private key is corrupted
pub const CORRUPTED_KEY_PLACEHOLDER: &str =
    "[Encrypted message - private key on this device is corrupted, re-import your key]";

/// Plaintext of one field, or why there is none
pub type FieldOutcome = Result<Vec<u8>, DecryptError>;

/// A stored message together with its locally computed display fields
///
/// `None` means the message has no such field. The display fields are never
/// sent back to the server.
#[derive(Debug, Clone)]
pub struct OpenedMessage {
    pub message: Message,
    pub text: Option<FieldOutcome>,
    pub image: Option<FieldOutcome>,
}

impl OpenedMessage {
    /// Pass a message through with its plaintext already known
    pub(crate) fn with_plaintext(
        message: Message,
        text: Option<String>,
        image: Option<String>,
    ) -> Self {
        Self {
            message,
            text: text.map(|t| Ok(t.into_bytes())),
            image: image.map(|i| Ok(i.into_bytes())),
        }
    }

    pub fn display_text(&self) -> Option<Cow<'_, str>> {
        display(self.text.as_ref())
    }

    pub fn display_image(&self) -> Option<Cow<'_, str>> {
        display(self.image.as_ref())
    }

    /// Every present field has plaintext
    pub fn is_readable(&self) -> bool {
        [&self.text, &self.image]
            .into_iter()
            .flatten()
            .all(|outcome| outcome.is_ok())
    }
}

fn display(outcome: Option<&FieldOutcome>) -> Option<Cow<'_, str>> {
    match outcome? {
        Ok(bytes) => Some(String::from_utf8_lossy(bytes)),
        Err(DecryptError::AuthenticationFailed) => Some(Cow::Borrowed(UNDECRYPTABLE_PLACEHOLDER)),
        Err(DecryptError::LocalKeyCorrupted) => Some(Cow::Borrowed(CORRUPTED_KEY_PLACEHOLDER)),
        Err(DecryptError::KeysUnavailable) => None,
    }
}
