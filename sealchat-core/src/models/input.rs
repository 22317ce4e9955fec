//! Outgoing message input, validated with garde before anything is encrypted.

use garde::Validate;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Validation constants
const MAX_USER_ID_LENGTH: usize = 128;
const MAX_TEXT_LENGTH: usize = 10_000;
const MAX_IMAGE_LENGTH: usize = 10 * 1024 * 1024;

/// A message needs text, an image, or both
fn has_content(text: &Option<String>) -> impl FnOnce(&Option<String>, &()) -> garde::Result + '_ {
    move |image, _| {
        let filled = |field: &Option<String>| field.as_deref().is_some_and(|v| !v.is_empty());
        if filled(text) || filled(image) {
            Ok(())
        } else {
            Err(garde::Error::new("Message must contain text or an image"))
        }
    }
}

/// Input for composing a direct message
#[derive(Debug, Clone, Deserialize, Validate)]
#[garde(context(()))]
#[serde(rename_all = "camelCase")]
pub struct SendMessageInput {
    #[garde(length(min = 1, max = MAX_USER_ID_LENGTH))]
    pub receiver_id: String,
    #[garde(length(max = MAX_TEXT_LENGTH))]
    pub text: Option<String>,
    /// Image reference or data URL; encrypted as opaque bytes like text
    #[garde(length(max = MAX_IMAGE_LENGTH), custom(has_content(&self.text)))]
    pub image: Option<String>,
}

impl SendMessageInput {
    pub fn text(receiver_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            receiver_id: receiver_id.into(),
            text: Some(text.into()),
            image: None,
        }
    }
}

/// Helper trait to convert garde validation errors into the crate error
pub trait ValidateExt {
    fn validate_input(&self) -> Result<()>;
}

impl<T: Validate<Context = ()>> ValidateExt for T {
    fn validate_input(&self) -> Result<()> {
        self.validate().map_err(|e| Error::Validation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_text_message() {
        assert!(SendMessageInput::text("bob", "hello").validate_input().is_ok());
    }

    #[test]
    fn test_image_only_message() {
        let input = SendMessageInput {
            receiver_id: "bob".to_string(),
            text: None,
            image: Some("data:image/png;base64,iVBORw0KGgo=".to_string()),
        };
        assert!(input.validate_input().is_ok());
    }

    #[test]
    fn test_empty_message_rejected() {
        let input = SendMessageInput {
            receiver_id: "bob".to_string(),
            text: Some(String::new()),
            image: None,
        };
        let result = input.validate_input();
        assert!(matches!(result, Err(Error::Validation(msg)) if msg.contains("text or an image")));
    }

    #[test]
    fn test_receiver_bounds() {
        assert!(SendMessageInput::text("", "hi").validate_input().is_err());
        assert!(SendMessageInput::text("b".repeat(MAX_USER_ID_LENGTH), "hi")
            .validate_input()
            .is_ok());
        assert!(SendMessageInput::text("b".repeat(MAX_USER_ID_LENGTH + 1), "hi")
            .validate_input()
            .is_err());
    }

    #[test]
    fn test_text_too_long() {
        let input = SendMessageInput::text("bob", "x".repeat(MAX_TEXT_LENGTH + 1));
        assert!(input.validate_input().is_err());
    }

    #[test]
    fn test_deserialize_from_frontend_format() {
        let json = r#"{"receiverId":"bob","text":"hi"}"#;
        let input: SendMessageInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.receiver_id, "bob");
        assert_eq!(input.text.as_deref(), Some("hi"));
        assert_eq!(input.image, None);
    }
}
