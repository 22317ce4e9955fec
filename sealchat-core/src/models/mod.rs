pub mod input;
mod message;

pub use input::{SendMessageInput, ValidateExt};
pub use message::{Message, Payload, SealedPayload, SendRequest};
