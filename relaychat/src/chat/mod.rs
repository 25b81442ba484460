//! Message pipeline: console commands in, frames out; frames in, notices out.
//!
//! [`Pipeline`] owns everything a chat session shares between its tasks:
//! the cache hierarchy, the crypto worker pool, the counters and the
//! session-end signal. Outbound work is split into a synchronous prepare
//! step run on the input loop (validate, assign an id, pre-record the
//! notice) and an async delivery step spawned onto the runtime (encrypt,
//! frame, send). Inbound frames are classified inline and processed in
//! spawned tasks.

pub mod command;
pub mod counters;
pub mod notice;
pub mod receive;
pub mod send;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use relaychat_proto::codec::CodecError;

use crate::cache::hierarchy::{CacheCapacities, CacheHierarchy};
use crate::console::Console;
use crate::crypto::{CryptoError, CryptoProvider};
use crate::files::SharedDir;
use crate::orchestrator::{BoundedWait, DEFAULT_POOL_SIZE, TaskError, WorkerPool};
use crate::transport::{Transport, TransportError};

use counters::Counters;

/// Errors that end a single outbound message.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The file to send could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// File path as given by the user.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The provider rejected the encryption.
    #[error("message #{message_id}: {source}")]
    Crypto {
        /// Outbound message id.
        message_id: u64,
        /// Provider error.
        source: CryptoError,
    },

    /// Encryption did not finish within the bounded wait.
    #[error("message #{message_id}: encryption did not complete within {waited:?}")]
    Timeout {
        /// Outbound message id.
        message_id: u64,
        /// Time spent waiting.
        waited: Duration,
    },

    /// The provider returned no ciphertext for a non-empty plaintext.
    #[error("message #{message_id}: provider returned an empty ciphertext")]
    EmptyCiphertext {
        /// Outbound message id.
        message_id: u64,
    },

    /// The worker running the encryption failed.
    #[error("message #{message_id}: {source}")]
    Worker {
        /// Outbound message id.
        message_id: u64,
        /// Pool error.
        source: TaskError,
    },

    /// The frame could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The frame could not be sent.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl SendError {
    fn from_task(message_id: u64, err: TaskError) -> Self {
        match err {
            TaskError::Timeout { waited, .. } => Self::Timeout { message_id, waited },
            TaskError::Crypto(source) => Self::Crypto { message_id, source },
            source => Self::Worker { message_id, source },
        }
    }

    /// Returns `true` if this error ends the chat session.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Crypto { source, .. } if source.is_fatal())
    }
}

/// Errors that end processing of a single inbound frame.
#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
    /// The frame could not be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A required field was absent or empty.
    #[error("malformed frame: missing {0}")]
    Malformed(&'static str),

    /// The server flagged the frame with an error.
    #[error("server reported error {0:?}")]
    Rejected(String),

    /// Decryption failed or timed out.
    #[error("blob #{blob_id}: {source}")]
    Decrypt {
        /// Inbound blob id.
        blob_id: u64,
        /// Pool or provider error.
        source: TaskError,
    },
}

/// Why a chat session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The user typed `&quit`.
    Quit,
    /// Console input reached end of file.
    InputClosed,
    /// The chat server connection closed.
    Disconnected,
    /// The crypto provider reported an unrecoverable error.
    Fatal(String),
    /// The server refused our identity.
    DuplicateIdentity(String),
}

impl SessionEnd {
    /// Returns `true` for endings caused by an error.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::Disconnected | Self::Fatal(_) | Self::DuplicateIdentity(_)
        )
    }
}

/// What the input loop should do after a console line.
#[derive(Debug)]
pub enum Flow {
    /// Nothing left running for this line.
    Continue,
    /// Delivery continues in the background.
    Pending(JoinHandle<()>),
    /// End the session.
    Quit,
}

/// Tunables for [`Pipeline::new`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Cache capacities.
    pub capacities: CacheCapacities,
    /// Crypto worker pool size.
    pub pool_size: usize,
    /// Bounded wait applied to every crypto task.
    pub wait: BoundedWait,
    /// Root directory for received files.
    pub shared_dir: PathBuf,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            capacities: CacheCapacities::default(),
            pool_size: DEFAULT_POOL_SIZE,
            wait: BoundedWait::default(),
            shared_dir: PathBuf::from("shared"),
        }
    }
}

/// Shared state of one chat session.
pub struct Pipeline<C: CryptoProvider, T: Transport> {
    /// Local identity, as registered with the server and the provider.
    identity: String,
    crypto: Arc<C>,
    transport: Arc<T>,
    caches: CacheHierarchy,
    pool: WorkerPool,
    wait: BoundedWait,
    counters: Counters,
    console: Console,
    shared: SharedDir,
    session: watch::Sender<Option<SessionEnd>>,
}

impl<C: CryptoProvider, T: Transport> Pipeline<C, T> {
    /// Build a pipeline for `identity`.
    pub fn new(
        identity: impl Into<String>,
        crypto: Arc<C>,
        transport: Arc<T>,
        console: Console,
        options: PipelineOptions,
    ) -> Arc<Self> {
        let identity = identity.into();
        let caches = CacheHierarchy::new(&identity, options.capacities, console.clone());
        let (session, _) = watch::channel(None);
        Arc::new(Self {
            identity,
            crypto,
            transport,
            caches,
            pool: WorkerPool::new(options.pool_size),
            wait: options.wait,
            counters: Counters::new(),
            console,
            shared: SharedDir::new(options.shared_dir),
            session,
        })
    }

    /// Local identity.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Cache hierarchy.
    #[must_use]
    pub const fn caches(&self) -> &CacheHierarchy {
        &self.caches
    }

    /// Message counters.
    #[must_use]
    pub const fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Console all user-visible lines go to.
    #[must_use]
    pub const fn console(&self) -> &Console {
        &self.console
    }

    /// Received-file storage.
    #[must_use]
    pub const fn shared_dir(&self) -> &SharedDir {
        &self.shared
    }

    /// The chat server connection.
    #[must_use]
    pub const fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Watch for the end of the session. The value stays `None` while the
    /// session runs.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<SessionEnd>> {
        self.session.subscribe()
    }

    /// How the session ended, if it has.
    #[must_use]
    pub fn session_end(&self) -> Option<SessionEnd> {
        self.session.borrow().clone()
    }

    /// Record why the session ends. Only the first reason is kept.
    pub fn end_session(&self, reason: SessionEnd) {
        let changed = self.session.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason.clone());
            true
        });
        if changed {
            tracing::info!(?reason, "session ending");
        }
    }

    /// Best-effort teardown: close the connection, stop accepting crypto
    /// work, then disconnect and shut down the provider.
    pub async fn shutdown(&self) {
        self.end_session(SessionEnd::Quit);
        self.transport.close().await;
        self.pool.close();

        let crypto = Arc::clone(&self.crypto);
        let result = tokio::task::spawn_blocking(move || {
            let disconnected = crypto.disconnect();
            crypto.shutdown();
            disconnected
        })
        .await;
        match result {
            Ok(true) => tracing::info!("crypto provider shut down"),
            Ok(false) => tracing::warn!("crypto provider disconnect reported failure"),
            Err(e) => tracing::error!(error = %e, "crypto provider shutdown panicked"),
        }
    }
}
