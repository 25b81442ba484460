//! Error type shared by the text and binary codecs.

/// Error type for frame encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text frame is not a valid JSON object of the expected shape.
    #[error("text frame error: {0}")]
    Json(String),

    /// The binary envelope could not be serialized or deserialized.
    #[error("binary frame error: {0}")]
    Binary(String),

    /// A field required by the frame's action is absent or empty.
    #[error("frame is missing required field `{0}`")]
    MissingField(&'static str),
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

impl From<postcard::Error> for CodecError {
    fn from(e: postcard::Error) -> Self {
        Self::Binary(e.to_string())
    }
}
