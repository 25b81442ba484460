//! In-process stand-in for the encryption provider.
//!
//! Uses repeating-key XOR. This is **not** secure; it exists so the client
//! can run end to end without a native provider, and so tests can script
//! provider behavior (unknown recipients, latency, failures).

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::{CryptoError, CryptoProvider};

const STUB_KEY: [u8; 32] = [
    0x5A, 0x17, 0xC3, 0x88, 0x21, 0x9E, 0x4D, 0xF0, 0x0B, 0x66, 0xA1, 0x3C, 0xD7, 0x72, 0xE9, 0x14,
    0x8F, 0x2A, 0xB5, 0x50, 0xCB, 0x06, 0x91, 0x7D, 0x38, 0xE3, 0x4E, 0xA9, 0x12, 0xFD, 0x64, 0xC7,
];

fn xor_with_key(data: &[u8]) -> Vec<u8> {
    data.iter()
        .enumerate()
        .map(|(i, byte)| byte ^ STUB_KEY[i % STUB_KEY.len()])
        .collect()
}

/// Scriptable XOR provider.
pub struct StubProvider {
    connected: AtomicBool,
    identity: Mutex<Option<String>>,
    rejected_targets: HashSet<String>,
    delay: Duration,
    fail_decrypt: bool,
    empty_ciphertext: bool,
    connection_lost: bool,
    encrypt_calls: AtomicU64,
    decrypt_calls: AtomicU64,
}

impl StubProvider {
    /// Connected provider with no scripted failures.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start scripting a provider.
    #[must_use]
    pub fn builder() -> StubProviderBuilder {
        StubProviderBuilder::default()
    }

    /// Identity passed to the last successful [`CryptoProvider::login`].
    #[must_use]
    pub fn identity(&self) -> Option<String> {
        self.identity.lock().clone()
    }

    /// Number of `encrypt` calls received.
    #[must_use]
    pub fn encrypt_calls(&self) -> u64 {
        self.encrypt_calls.load(Ordering::SeqCst)
    }

    /// Number of `decrypt` calls received.
    #[must_use]
    pub fn decrypt_calls(&self) -> u64 {
        self.decrypt_calls.load(Ordering::SeqCst)
    }

    fn simulate_latency(&self) {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
    }

    fn check_connection(&self) -> Result<(), CryptoError> {
        if self.connection_lost {
            return Err(CryptoError::ConnectionLost("key server unreachable".into()));
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(CryptoError::NotConnected);
        }
        Ok(())
    }
}

impl Default for StubProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CryptoProvider for StubProvider {
    fn initialize(&self) -> bool {
        tracing::debug!("stub crypto provider initialized");
        true
    }

    fn login(&self, identity: &str, _password: &str) -> bool {
        if identity.is_empty() {
            return false;
        }
        *self.identity.lock() = Some(identity.to_string());
        true
    }

    fn connect(&self) -> bool {
        self.connected.store(true, Ordering::SeqCst);
        true
    }

    fn disconnect(&self) -> bool {
        self.connected.store(false, Ordering::SeqCst);
        true
    }

    fn shutdown(&self) {
        self.identity.lock().take();
    }

    fn encrypt(
        &self,
        plaintext: &[u8],
        target: &str,
        correlation_id: u64,
    ) -> Result<Vec<u8>, CryptoError> {
        self.encrypt_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency();
        self.check_connection()?;
        if self.rejected_targets.contains(target) {
            return Err(CryptoError::InvalidTarget(target.to_string()));
        }
        if self.empty_ciphertext {
            return Ok(Vec::new());
        }
        tracing::trace!(correlation_id, target, "stub encrypt");
        Ok(xor_with_key(plaintext))
    }

    fn decrypt(&self, ciphertext: &[u8], correlation_id: u64) -> Result<Vec<u8>, CryptoError> {
        self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency();
        self.check_connection()?;
        if self.fail_decrypt {
            return Err(CryptoError::DecryptionFailed(format!(
                "blob {correlation_id} rejected"
            )));
        }
        // XOR is its own inverse.
        Ok(xor_with_key(ciphertext))
    }
}

/// Builder for [`StubProvider`].
#[derive(Default)]
pub struct StubProviderBuilder {
    disconnected: bool,
    rejected_targets: HashSet<String>,
    delay: Duration,
    fail_decrypt: bool,
    empty_ciphertext: bool,
    connection_lost: bool,
}

impl StubProviderBuilder {
    /// Whether the provider starts connected (default `true`).
    #[must_use]
    pub const fn connected(mut self, connected: bool) -> Self {
        self.disconnected = !connected;
        self
    }

    /// Make `encrypt` fail with [`CryptoError::InvalidTarget`] for `target`.
    #[must_use]
    pub fn reject_target(mut self, target: impl Into<String>) -> Self {
        self.rejected_targets.insert(target.into());
        self
    }

    /// Sleep this long inside every `encrypt`/`decrypt` call.
    #[must_use]
    pub const fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make every `decrypt` fail.
    #[must_use]
    pub const fn fail_decrypt(mut self) -> Self {
        self.fail_decrypt = true;
        self
    }

    /// Make every `encrypt` return an empty ciphertext.
    #[must_use]
    pub const fn empty_ciphertext(mut self) -> Self {
        self.empty_ciphertext = true;
        self
    }

    /// Make every `encrypt`/`decrypt` report a lost connection.
    #[must_use]
    pub const fn connection_lost(mut self) -> Self {
        self.connection_lost = true;
        self
    }

    /// Finish scripting.
    #[must_use]
    pub fn build(self) -> StubProvider {
        StubProvider {
            connected: AtomicBool::new(!self.disconnected),
            identity: Mutex::new(None),
            rejected_targets: self.rejected_targets,
            delay: self.delay,
            fail_decrypt: self.fail_decrypt,
            empty_ciphertext: self.empty_ciphertext,
            connection_lost: self.connection_lost,
            encrypt_calls: AtomicU64::new(0),
            decrypt_calls: AtomicU64::new(0),
        }
    }
}
