//! Outbound paths and console command dispatch for [`Pipeline`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;

use relaychat_proto::global::{self, GlobalFrame};
use relaychat_proto::private::{self, PrivateEnvelope, PrivateMessage};

use crate::cache::MessageSink;
use crate::cache::hierarchy::BROADCAST_ALIAS;
use crate::crypto::{CryptoError, CryptoProvider};
use crate::files;
use crate::transport::Transport;

use super::command::{self, Command, CommandError, Control, HELP_LINES};
use super::counters::{Category, Direction, Stage};
use super::notice::{self, Side};
use super::{Flow, Pipeline, SendError};

/// Plaintext source of a private message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Inline text.
    Text(String),
    /// File read at delivery time.
    File {
        /// Path as typed by the user.
        path: PathBuf,
    },
}

impl Payload {
    const fn is_file(&self) -> bool {
        matches!(self, Self::File { .. })
    }
}

/// A validated private message that has been assigned an id and
/// pre-recorded in the private cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateRequest {
    /// Outbound message id.
    pub message_id: u64,
    /// Recipient.
    pub target: String,
    /// What to encrypt.
    pub payload: Payload,
}

impl PrivateRequest {
    const fn category(&self) -> Category {
        Category::private(self.payload.is_file())
    }
}

impl<C: CryptoProvider, T: Transport> Pipeline<C, T> {
    /// Handle one console line.
    ///
    /// User errors are printed to the console; they never end the session.
    pub fn handle_input(self: &Arc<Self>, line: &str) -> Flow {
        match command::parse(line) {
            Ok(None) => Flow::Continue,
            Ok(Some(command)) => self.dispatch(command),
            Err(e) => {
                tracing::info!(error = %e, "rejected console input");
                self.console.line(&e.to_string());
                Flow::Continue
            }
        }
    }

    fn dispatch(self: &Arc<Self>, command: Command) -> Flow {
        match command {
            Command::PrivateText { target, text } => {
                self.submit_private(&target, Payload::Text(text))
            }
            Command::PrivateFile { target, path } => self.submit_private(
                &target,
                Payload::File {
                    path: PathBuf::from(path),
                },
            ),
            Command::Control(control) => self.control(control),
            Command::History(contact) => {
                self.print_history(contact.as_deref());
                Flow::Continue
            }
            Command::Global(text) => {
                tracing::info!("sending global message");
                let this = Arc::clone(self);
                Flow::Pending(tokio::spawn(async move {
                    this.send_global(&text).await;
                }))
            }
        }
    }

    fn control(&self, control: Control) -> Flow {
        match control {
            Control::Quit => return Flow::Quit,
            Control::Help => {
                for line in HELP_LINES {
                    self.console.line(line);
                }
            }
            Control::Stats => {
                for line in self.counters.snapshot().lines() {
                    self.console.line(&line);
                }
            }
            Control::Unknown(other) => {
                tracing::info!(command = %other, "unknown console command");
                self.console.line(&format!("!! Unknown command: {other}"));
            }
        }
        Flow::Continue
    }

    fn submit_private(self: &Arc<Self>, target: &str, payload: Payload) -> Flow {
        match self.prepare_private(target, payload) {
            Ok(request) => Flow::Pending(self.spawn_private(request)),
            Err(e) => {
                tracing::warn!(target, error = %e, "private message rejected");
                self.console.line(&e.to_string());
                Flow::Continue
            }
        }
    }

    /// Validate a private message, assign its id and pre-record the
    /// outgoing notice.
    ///
    /// Nothing is recorded or counted when validation fails.
    ///
    /// # Errors
    ///
    /// [`CommandError::FileNotFound`] for an unreadable file,
    /// [`CommandError::SelfMessage`] / [`CommandError::SelfFile`] when
    /// `target` is the local identity.
    pub fn prepare_private(
        &self,
        target: &str,
        payload: Payload,
    ) -> Result<PrivateRequest, CommandError> {
        if let Payload::File { path } = &payload
            && !is_readable_file(path)
        {
            return Err(CommandError::FileNotFound(path.display().to_string()));
        }
        if target == self.identity {
            return Err(match &payload {
                Payload::Text(_) => CommandError::SelfMessage,
                Payload::File { path } => CommandError::SelfFile(path.display().to_string()),
            });
        }

        let message_id = self.counters.next_message_id();
        let category = Category::private(payload.is_file());
        self.counters.increment(Direction::Sent, category, Stage::Initiated);

        let notice = match &payload {
            Payload::Text(text) => notice::private_text(text, target, Side::Outgoing),
            Payload::File { path } => {
                notice::private_file(&path.display().to_string(), target, Side::Outgoing)
            }
        };
        self.caches.private().save_message(target, &notice, true);

        tracing::info!(message_id, target, file = payload.is_file(), "private message accepted");
        Ok(PrivateRequest {
            message_id,
            target: target.to_string(),
            payload,
        })
    }

    /// Deliver a prepared private message in the background.
    pub fn spawn_private(self: &Arc<Self>, request: PrivateRequest) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.send_private(&request).await;
        })
    }

    /// Encrypt, frame and send a prepared private message, then record
    /// exactly one outcome for it.
    ///
    /// Returns `true` if the frame was handed to the transport.
    pub async fn send_private(&self, request: &PrivateRequest) -> bool {
        let category = request.category();
        match self.deliver_private(request).await {
            Ok(()) => {
                self.counters.record_outcome(Direction::Sent, category, true);
                tracing::info!(
                    message_id = request.message_id,
                    target = %request.target,
                    "private message dispatched"
                );
                true
            }
            Err(e) => {
                self.counters.record_outcome(Direction::Sent, category, false);
                self.report_send_failure(request, &e);
                false
            }
        }
    }

    async fn deliver_private(&self, request: &PrivateRequest) -> Result<(), SendError> {
        let message_id = request.message_id;
        let (plaintext, file_name) = match &request.payload {
            Payload::Text(text) => (text.as_bytes().to_vec(), String::new()),
            Payload::File { path } => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|source| SendError::Read {
                        path: path.clone(),
                        source,
                    })?;
                (bytes, files::display_name(&path.to_string_lossy()))
            }
        };

        let plaintext_len = plaintext.len();
        let crypto = Arc::clone(&self.crypto);
        let target = request.target.clone();
        let handle = self
            .pool
            .submit(move || crypto.encrypt(&plaintext, &target, message_id));
        tracing::debug!(message_id, task_id = handle.id(), "encryption submitted");

        let ciphertext = self
            .wait
            .wait(handle)
            .await
            .map_err(|e| SendError::from_task(message_id, e))?;
        if ciphertext.is_empty() && plaintext_len > 0 {
            return Err(SendError::EmptyCiphertext { message_id });
        }

        let envelope = PrivateEnvelope::chat(PrivateMessage {
            username: self.identity.clone(),
            target: request.target.clone(),
            content: ciphertext,
            file_name,
        });
        let bytes = private::encode(&envelope)?;
        self.transport.send_binary(&bytes).await?;
        Ok(())
    }

    fn report_send_failure(&self, request: &PrivateRequest, err: &SendError) {
        let message_id = request.message_id;
        let target = &request.target;
        match err {
            SendError::Crypto {
                source: CryptoError::InvalidTarget(_),
                ..
            } => {
                tracing::warn!(message_id, %target, "invalid private message target");
                self.console.line(&format!("!! Invalid private message target {target}"));
            }
            SendError::Timeout { waited, .. } => {
                tracing::warn!(
                    message_id,
                    %target,
                    ?waited,
                    "private message encryption timed out"
                );
                self.console.line(&format!(
                    "!! Private message to {target} could not be encrypted in time"
                ));
            }
            e if e.is_fatal() => {
                tracing::error!(
                    message_id,
                    %target,
                    error = %e,
                    "unrecoverable crypto provider error"
                );
                self.console.line(&format!("!! Unrecoverable crypto provider error: {e}"));
                self.end_session(super::SessionEnd::Fatal(e.to_string()));
            }
            e => {
                tracing::warn!(message_id, %target, error = %e, "private message failed");
                self.console.line(&format!("!! Private message to {target} failed: {e}"));
            }
        }
    }

    /// Send a broadcast chat message and record it in the shared cache.
    ///
    /// Returns `true` if the frame was handed to the transport.
    pub async fn send_global(&self, text: &str) -> bool {
        let message_id = self.counters.next_message_id();
        self.counters.increment(Direction::Sent, Category::Global, Stage::Initiated);

        let result = match global::encode(&GlobalFrame::chat(&self.identity, text)) {
            Ok(json) => self
                .transport
                .send_text(&json)
                .await
                .map_err(SendError::from),
            Err(e) => Err(SendError::from(e)),
        };

        match result {
            Ok(()) => {
                self.caches.shared().save_message(
                    BROADCAST_ALIAS,
                    &notice::global(text, Side::Outgoing),
                    false,
                );
                self.counters.record_outcome(Direction::Sent, Category::Global, true);
                tracing::info!(message_id, "global message dispatched");
                true
            }
            Err(e) => {
                self.counters.record_outcome(Direction::Sent, Category::Global, false);
                tracing::warn!(message_id, error = %e, "global message failed");
                self.console.line(&format!("!! Global message failed: {e}"));
                false
            }
        }
    }

    /// Announce the local identity to the chat server.
    ///
    /// # Errors
    ///
    /// [`SendError`] if the frame cannot be encoded or sent.
    pub async fn register(&self) -> Result<(), SendError> {
        let json = global::encode(&GlobalFrame::identify(&self.identity))?;
        self.transport.send_text(&json).await?;
        tracing::info!(identity = %self.identity, "registration sent");
        Ok(())
    }

    /// Print the shared history (`None`) or the private history with a
    /// contact.
    pub fn print_history(&self, contact: Option<&str>) {
        let Some(contact) = contact else {
            self.console.blank();
            let messages = self
                .caches
                .shared()
                .messages(BROADCAST_ALIAS)
                .unwrap_or_default();
            if messages.is_empty() {
                self.console.line("- The shared chat history is empty.");
            }
            for message in messages {
                self.console.line(&message);
            }
            return;
        };

        let Some(messages) = self.caches.private().messages(contact) else {
            tracing::info!(contact, "history requested for unknown contact");
            self.console.line("Error: contact does not exist");
            return;
        };
        self.console.blank();
        if messages.is_empty() {
            self.console.line(&format!("- The chat history with {contact} is empty"));
        }
        for message in messages {
            self.console.line(&message);
        }
    }
}

fn is_readable_file(path: &Path) -> bool {
    path.is_file() && std::fs::File::open(path).is_ok()
}
