//! Broadcast (global chat) text frames.
//!
//! Wire shape, one JSON object per WebSocket text frame:
//!
//! ```json
//! {"action":"chat","message":{"username":"alice","content":"hi all"}}
//! {"action":"identify","username":"alice"}
//! {"action":"identify","error":""}
//! ```
//!
//! The server also emits device-registry actions (`add`, `remove`,
//! `toggle`); those decode as [`GlobalAction::Other`] and are ignored by
//! clients.

use serde::{Deserialize, Serialize};

use crate::codec::CodecError;

/// Action tag for a broadcast chat message.
pub const ACTION_CHAT: &str = "chat";

/// Action tag for identity registration requests and replies.
pub const ACTION_IDENTIFY: &str = "identify";

/// Sender and content of a broadcast chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatBody {
    /// Identity of the sender.
    pub username: String,
    /// Plaintext content.
    pub content: String,
}

/// Raw broadcast frame as it appears on the wire.
///
/// All fields other than `action` are optional so that unknown or
/// partially populated server frames still decode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalFrame {
    /// Action tag (`chat`, `identify`, ...).
    #[serde(default)]
    pub action: String,
    /// Chat payload, present when `action == "chat"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<ChatBody>,
    /// Identity being registered, present on outbound `identify`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Registration error, present on inbound `identify` (empty = success).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Classified view of a [`GlobalFrame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalAction {
    /// A broadcast chat message.
    Chat(ChatBody),
    /// Reply to an identity registration; `error` is empty on success.
    Identify {
        /// Registration error reported by the server.
        error: String,
    },
    /// Any other action; carries the tag for logging.
    Other(String),
}

impl GlobalFrame {
    /// Build an outbound broadcast chat frame.
    #[must_use]
    pub fn chat(username: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            action: ACTION_CHAT.to_string(),
            message: Some(ChatBody {
                username: username.into(),
                content: content.into(),
            }),
            ..Self::default()
        }
    }

    /// Build an outbound identity registration frame.
    #[must_use]
    pub fn identify(username: impl Into<String>) -> Self {
        Self {
            action: ACTION_IDENTIFY.to_string(),
            username: Some(username.into()),
            ..Self::default()
        }
    }

    /// Classify this frame by its action tag.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MissingField`] if the action tag is empty, or
    /// if a `chat` frame carries no message body.
    pub fn classify(self) -> Result<GlobalAction, CodecError> {
        match self.action.trim() {
            "" => Err(CodecError::MissingField("action")),
            ACTION_CHAT => self
                .message
                .map(GlobalAction::Chat)
                .ok_or(CodecError::MissingField("message")),
            ACTION_IDENTIFY => Ok(GlobalAction::Identify {
                error: self.error.unwrap_or_default(),
            }),
            other => Ok(GlobalAction::Other(other.to_string())),
        }
    }
}

/// Encodes a [`GlobalFrame`] as a JSON string.
///
/// # Errors
///
/// Returns `CodecError::Json` if serialization fails.
pub fn encode(frame: &GlobalFrame) -> Result<String, CodecError> {
    Ok(serde_json::to_string(frame)?)
}

/// Decodes a [`GlobalFrame`] from a JSON string.
///
/// # Errors
///
/// Returns `CodecError::Json` if the text is not a JSON object of the
/// expected shape.
pub fn decode(text: &str) -> Result<GlobalFrame, CodecError> {
    Ok(serde_json::from_str(text)?)
}
