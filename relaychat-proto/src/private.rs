//! Private (point-to-point) binary envelopes.
//!
//! A private envelope carries ciphertext produced by the external crypto
//! provider together with routing metadata. It is postcard-encoded and sent
//! as a single WebSocket binary frame. The relay echoes the envelope back
//! to the sender with `error` set when delivery or encryption failed on
//! the server side.

use serde::{Deserialize, Serialize};

use crate::codec::CodecError;

/// Action tag for a private chat envelope.
pub const ACTION_CHAT: &str = "chat";

/// Nested private message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateMessage {
    /// Identity of the sender.
    pub username: String,
    /// Identity of the recipient.
    pub target: String,
    /// Ciphertext bytes.
    pub content: Vec<u8>,
    /// Original file name for file transfers; empty for text messages.
    pub file_name: String,
}

impl PrivateMessage {
    /// Returns `true` if this message carries a file rather than text.
    #[must_use]
    pub const fn is_file(&self) -> bool {
        !self.file_name.is_empty()
    }
}

/// Private envelope as it appears on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateEnvelope {
    /// Action tag; always [`ACTION_CHAT`] for chat traffic.
    pub action: String,
    /// Processing error reported by the relay (empty = success).
    pub error: String,
    /// The nested message, if any.
    pub message: Option<PrivateMessage>,
}

impl PrivateEnvelope {
    /// Wrap a message in a `chat` envelope with no error.
    #[must_use]
    pub fn chat(message: PrivateMessage) -> Self {
        Self {
            action: ACTION_CHAT.to_string(),
            error: String::new(),
            message: Some(message),
        }
    }

    /// Returns the trimmed, lower-cased action tag.
    #[must_use]
    pub fn normalized_action(&self) -> String {
        self.action.trim().to_lowercase()
    }
}

/// Encodes a [`PrivateEnvelope`] into bytes using postcard.
///
/// # Errors
///
/// Returns `CodecError::Binary` if the envelope cannot be serialized.
pub fn encode(envelope: &PrivateEnvelope) -> Result<Vec<u8>, CodecError> {
    Ok(postcard::to_allocvec(envelope)?)
}

/// Decodes a [`PrivateEnvelope`] from bytes using postcard.
///
/// # Errors
///
/// Returns `CodecError::Binary` if the bytes cannot be deserialized.
pub fn decode(bytes: &[u8]) -> Result<PrivateEnvelope, CodecError> {
    Ok(postcard::from_bytes(bytes)?)
}
