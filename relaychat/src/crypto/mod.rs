//! Boundary to the external end-to-end encryption provider.
//!
//! The provider is opaque: it owns key material, peer directories and its
//! own connection to a key server. The client only ever hands it plaintext
//! and gets ciphertext back (and the reverse). No other layer sees
//! plaintext of a private message.
//!
//! Calls are blocking and may be slow, so the pipeline never calls
//! [`CryptoProvider::encrypt`] or [`CryptoProvider::decrypt`] directly; it
//! submits them to the [`WorkerPool`](crate::orchestrator::WorkerPool).

pub mod stub;

/// Errors reported by a [`CryptoProvider`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// The provider has no live connection to its key server.
    #[error("crypto provider is not connected")]
    NotConnected,

    /// The provider does not know the recipient.
    #[error("invalid target '{0}'")]
    InvalidTarget(String),

    /// Encryption was attempted and failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption was attempted and failed.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// The provider is in an unrecoverable state; the session must end.
    #[error("crypto provider connection lost: {0}")]
    ConnectionLost(String),
}

impl CryptoError {
    /// Returns `true` if this error ends the chat session.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::NotConnected | Self::ConnectionLost(_))
    }
}

/// Capability set of the encryption provider.
///
/// Lifecycle calls report success as a `bool`; the provider logs its own
/// failure details. Implementations must be safe to call from several
/// worker threads at once.
pub trait CryptoProvider: Send + Sync + 'static {
    /// Load provider state. Must be called once before anything else.
    fn initialize(&self) -> bool;

    /// Authenticate `identity` against the provider's key server.
    fn login(&self, identity: &str, password: &str) -> bool;

    /// Open the provider's connection to its key server.
    fn connect(&self) -> bool;

    /// Close the provider's connection to its key server.
    fn disconnect(&self) -> bool;

    /// Release all provider state.
    fn shutdown(&self);

    /// Encrypt `plaintext` for `target`.
    ///
    /// `correlation_id` is the outbound message id, used by the provider
    /// only for its own diagnostics.
    ///
    /// # Errors
    ///
    /// [`CryptoError::NotConnected`], [`CryptoError::InvalidTarget`] or
    /// [`CryptoError::EncryptionFailed`] (or a fatal
    /// [`CryptoError::ConnectionLost`]).
    fn encrypt(
        &self,
        plaintext: &[u8],
        target: &str,
        correlation_id: u64,
    ) -> Result<Vec<u8>, CryptoError>;

    /// Decrypt `ciphertext` received as inbound blob `correlation_id`.
    ///
    /// # Errors
    ///
    /// [`CryptoError::DecryptionFailed`], or a connection error.
    fn decrypt(&self, ciphertext: &[u8], correlation_id: u64) -> Result<Vec<u8>, CryptoError>;
}
