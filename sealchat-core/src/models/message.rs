use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Encrypted fields of a message, still in wire encoding
///
/// Fields stay encoded until someone tries to open them, so a single
/// malformed value cannot make the whole record unreadable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SealedPayload {
    pub nonce: Option<String>,
    pub encrypted_text: Option<String>,
    pub encrypted_image: Option<String>,
}

/// Message body: legacy plaintext or an encrypted payload set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Plain {
        text: Option<String>,
        image: Option<String>,
    },
    Sealed(SealedPayload),
}

impl Payload {
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Payload::Sealed(_))
    }
}

/// A stored direct message as returned by the message store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireMessage", into = "WireMessage")]
pub struct Message {
    pub id: Option<String>,
    pub sender_id: String,
    pub receiver_id: String,
    pub payload: Payload,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_encrypted(&self) -> bool {
        self.payload.is_encrypted()
    }

    /// True if `identity_id` wrote this message
    pub fn is_sent_by(&self, identity_id: &str) -> bool {
        self.sender_id == identity_id
    }

    /// The other party of the conversation, seen from `identity_id`
    pub fn counterpart_of(&self, identity_id: &str) -> &str {
        if self.is_sent_by(identity_id) {
            &self.receiver_id
        } else {
            &self.sender_id
        }
    }

    /// Build the stored record for a send request the way the store does:
    /// the message is encrypted iff it carries an encrypted field, and an
    /// encrypted message keeps no plaintext.
    pub fn from_submission(
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        request: SendRequest,
        now: DateTime<Utc>,
    ) -> Self {
        let is_encrypted = request.encrypted_text.is_some() || request.encrypted_image.is_some();

        let payload = if is_encrypted {
            Payload::Sealed(SealedPayload {
                nonce: request.nonce,
                encrypted_text: request.encrypted_text,
                encrypted_image: request.encrypted_image,
            })
        } else {
            Payload::Plain {
                text: request.text,
                image: request.image,
            }
        };

        Self {
            id: None,
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            payload,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }
}

/// Body of a send request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl From<Payload> for SendRequest {
    fn from(payload: Payload) -> Self {
        match payload {
            Payload::Plain { text, image } => SendRequest {
                text,
                image,
                ..Default::default()
            },
            Payload::Sealed(sealed) => SendRequest {
                encrypted_text: sealed.encrypted_text,
                encrypted_image: sealed.encrypted_image,
                nonce: sealed.nonce,
                ..Default::default()
            },
        }
    }
}

/// Flat JSON shape of a stored message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    sender_id: String,
    receiver_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encrypted_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encrypted_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nonce: Option<String>,
    #[serde(default)]
    is_encrypted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

impl From<WireMessage> for Message {
    fn from(wire: WireMessage) -> Self {
        // Plaintext fields of an encrypted record are ignored
        let payload = if wire.is_encrypted {
            Payload::Sealed(SealedPayload {
                nonce: wire.nonce,
                encrypted_text: wire.encrypted_text,
                encrypted_image: wire.encrypted_image,
            })
        } else {
            Payload::Plain {
                text: wire.text,
                image: wire.image,
            }
        };

        Message {
            id: wire.id,
            sender_id: wire.sender_id,
            receiver_id: wire.receiver_id,
            payload,
            created_at: wire.created_at,
            updated_at: wire.updated_at,
        }
    }
}

impl From<Message> for WireMessage {
    fn from(message: Message) -> Self {
        let mut wire = WireMessage {
            id: message.id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            created_at: message.created_at,
            updated_at: message.updated_at,
            ..Default::default()
        };

        match message.payload {
            Payload::Plain { text, image } => {
                wire.text = text;
                wire.image = image;
            }
            Payload::Sealed(sealed) => {
                wire.is_encrypted = true;
                wire.nonce = sealed.nonce;
                wire.encrypted_text = sealed.encrypted_text;
                wire.encrypted_image = sealed.encrypted_image;
            }
        }
        wire
    }
}
