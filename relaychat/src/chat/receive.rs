//! Inbound frame handling for [`Pipeline`].
//!
//! Classification runs on the caller (the receive loop) and only decides
//! which task to spawn; decoding failures are counted and dropped there.
//! Decryption and cache writes happen in the spawned task.

use std::sync::Arc;

use chrono::Local;
use tokio::task::JoinHandle;

use relaychat_proto::global::{self, ChatBody, GlobalAction};
use relaychat_proto::private::{self, PrivateMessage};

use crate::cache::MessageSink;
use crate::cache::hierarchy::BROADCAST_ALIAS;
use crate::crypto::CryptoProvider;
use crate::files;
use crate::orchestrator::TaskError;
use crate::transport::{Frame, Transport};

use super::counters::{Category, Direction, Stage};
use super::notice::{self, Side};
use super::{Pipeline, ReceiveError, SessionEnd};

impl<C: CryptoProvider, T: Transport> Pipeline<C, T> {
    /// Classify one inbound frame and spawn whatever processing it needs.
    ///
    /// Returns the processing task, if one was spawned.
    pub fn receive_frame(self: &Arc<Self>, frame: Frame) -> Option<JoinHandle<()>> {
        match frame {
            Frame::Text(text) => self.receive_text(&text),
            Frame::Binary(bytes) => self.receive_binary(&bytes),
        }
    }

    fn receive_text(self: &Arc<Self>, text: &str) -> Option<JoinHandle<()>> {
        let blob_id = self.counters.next_blob_id();
        let action = match global::decode(text).and_then(global::GlobalFrame::classify) {
            Ok(action) => action,
            Err(e) => {
                let err = ReceiveError::from(e);
                tracing::warn!(blob_id, error = %err, "dropping malformed text frame");
                self.counters.record_outcome(Direction::Received, Category::Packets, false);
                return None;
            }
        };

        match action {
            GlobalAction::Chat(body) => {
                self.counters.increment(Direction::Received, Category::Global, Stage::Initiated);
                let this = Arc::clone(self);
                Some(tokio::spawn(async move {
                    this.process_global(blob_id, body);
                }))
            }
            GlobalAction::Identify { error } if error.is_empty() => {
                tracing::info!(identity = %self.identity, "registered with chat server");
                self.counters.record_outcome(Direction::Received, Category::Packets, true);
                None
            }
            GlobalAction::Identify { error } => {
                tracing::error!(identity = %self.identity, %error, "chat server refused identity");
                self.console.line("!! Username is already taken. Please rejoin with another one");
                self.counters.record_outcome(Direction::Received, Category::Packets, false);
                self.end_session(SessionEnd::DuplicateIdentity(error));
                None
            }
            GlobalAction::Other(action) => {
                tracing::debug!(blob_id, %action, "ignoring text frame with unknown action");
                None
            }
        }
    }

    fn process_global(&self, blob_id: u64, body: ChatBody) {
        if body.username == self.identity {
            tracing::debug!(blob_id, "own global message echoed back, ignoring");
            return;
        }
        tracing::info!(blob_id, sender = %body.username, "global message received");
        self.caches.shared().save_message(
            BROADCAST_ALIAS,
            &notice::global(&body.content, Side::Incoming),
            true,
        );
        self.console.prompt();
        self.counters.record_outcome(Direction::Received, Category::Global, true);
    }

    fn receive_binary(self: &Arc<Self>, bytes: &[u8]) -> Option<JoinHandle<()>> {
        let blob_id = self.counters.next_blob_id();
        tracing::debug!(blob_id, len = bytes.len(), "processing binary frame");

        let envelope = match private::decode(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                let err = ReceiveError::from(e);
                tracing::warn!(blob_id, error = %err, "dropping malformed binary frame");
                self.counters.record_outcome(Direction::Received, Category::Packets, false);
                return None;
            }
        };

        let action = envelope.normalized_action();
        if action.is_empty() {
            let err = ReceiveError::Malformed("action");
            tracing::error!(blob_id, error = %err, "dropping binary frame");
            self.counters.record_outcome(Direction::Received, Category::Packets, false);
            return None;
        }
        if action != private::ACTION_CHAT {
            tracing::debug!(blob_id, %action, "ignoring binary frame with unknown action");
            return None;
        }

        let category = envelope
            .message
            .as_ref()
            .map_or(Category::PrivateText, |m| Category::private(m.is_file()));
        if !envelope.error.is_empty() {
            let err = ReceiveError::Rejected(envelope.error);
            tracing::error!(blob_id, error = %err, "server rejected private message");
            self.counters.record_outcome(Direction::Received, category, false);
            return None;
        }
        let Some(message) = envelope.message else {
            let err = ReceiveError::Malformed("message");
            tracing::error!(blob_id, error = %err, "dropping binary frame");
            self.counters.record_outcome(Direction::Received, Category::Packets, false);
            return None;
        };

        self.counters.increment(Direction::Received, category, Stage::Initiated);
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            this.process_private(blob_id, message).await;
        }))
    }

    async fn process_private(&self, blob_id: u64, message: PrivateMessage) {
        if message.username == self.identity {
            tracing::debug!(blob_id, "own private message echoed back, ignoring");
            return;
        }
        let sender = message.username.clone();
        let category = Category::private(message.is_file());
        tracing::info!(blob_id, %sender, file = message.is_file(), "private message received");

        let plaintext = match self.decrypt(blob_id, &message.content).await {
            Ok(plaintext) => plaintext,
            Err(e) => {
                if let ReceiveError::Decrypt {
                    source: TaskError::Crypto(crypto),
                    ..
                } = &e
                    && crypto.is_fatal()
                {
                    self.console.line(&format!("!! Unrecoverable crypto provider error: {crypto}"));
                    self.end_session(SessionEnd::Fatal(crypto.to_string()));
                }
                tracing::warn!(blob_id, %sender, error = %e, "private message dropped");
                self.counters.record_outcome(Direction::Received, category, false);
                return;
            }
        };

        let notice = if message.is_file() {
            let name = files::display_name(&message.file_name);
            match self
                .shared
                .store_received(
                    &sender,
                    &message.file_name,
                    &message.content,
                    &plaintext,
                    Local::now(),
                )
                .await
            {
                Ok(stored) => tracing::info!(
                    blob_id,
                    encrypted = %stored.encrypted.display(),
                    decrypted = %stored.decrypted.display(),
                    "received file written"
                ),
                Err(e) => tracing::error!(blob_id, error = %e, "failed to write received file"),
            }
            notice::private_file(&name, &sender, Side::Incoming)
        } else {
            notice::private_text(&String::from_utf8_lossy(&plaintext), &sender, Side::Incoming)
        };

        self.caches.private().save_message(&sender, &notice, true);
        self.console.prompt();
        self.counters.record_outcome(Direction::Received, category, true);
    }

    async fn decrypt(&self, blob_id: u64, ciphertext: &[u8]) -> Result<Vec<u8>, ReceiveError> {
        let crypto = Arc::clone(&self.crypto);
        let ciphertext = ciphertext.to_vec();
        let handle = self
            .pool
            .submit(move || crypto.decrypt(&ciphertext, blob_id));
        self.wait
            .wait(handle)
            .await
            .map_err(|source| ReceiveError::Decrypt { blob_id, source })
    }
}
