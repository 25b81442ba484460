//! Session loops: transport frames into the pipeline, console lines into
//! the pipeline.
//!
//! ```text
//! stdin ──reader thread──> run_input_loop ──┐
//!                                          ├──> Pipeline ──> caches / console
//! transport ──frames──> run_receive_loop
//! ```
//!
//! Both loops stop once the pipeline's session-end signal is set.

use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::chat::{Flow, Pipeline, SessionEnd};
use crate::crypto::CryptoProvider;
use crate::transport::{Transport, TransportError};

/// How long the input loop waits for in-flight deliveries when it exits.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Spawn [`run_receive_loop`] on the runtime.
pub fn spawn_receive_loop<C: CryptoProvider, T: Transport>(
    pipeline: &Arc<Pipeline<C, T>>,
) -> JoinHandle<()> {
    tokio::spawn(run_receive_loop(Arc::clone(pipeline)))
}

/// Feed every inbound frame to the pipeline until the connection closes
/// or the session ends.
pub async fn run_receive_loop<C: CryptoProvider, T: Transport>(pipeline: Arc<Pipeline<C, T>>) {
    let mut session = pipeline.subscribe();
    loop {
        tokio::select! {
            frame = pipeline.transport().recv() => match frame {
                Ok(frame) => {
                    // Processing continues in the spawned task.
                    let _ = pipeline.receive_frame(frame);
                }
                Err(TransportError::ConnectionClosed) => {
                    tracing::info!("chat server connection closed");
                    pipeline.end_session(SessionEnd::Disconnected);
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "receive error");
                    pipeline.end_session(SessionEnd::Disconnected);
                    break;
                }
            },
            _ = session.wait_for(Option::is_some) => break,
        }
    }
    tracing::debug!("receive loop exiting");
}

/// Lines buffered between the reader thread and the input loop.
pub const INPUT_BUFFER: usize = 64;

/// Read lines from `reader` on a dedicated OS thread and forward them over
/// a channel.
///
/// Blocking reads never run on the runtime, so a session that ends while
/// the reader is still waiting for input does not hold up shutdown. The
/// thread stops at end of input, on a read error, or once the receiver is
/// dropped.
pub fn spawn_line_reader<R>(reader: R) -> mpsc::Receiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(INPUT_BUFFER);
    let spawned = std::thread::Builder::new()
        .name("console-input".into())
        .spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "console read failed");
                        break;
                    }
                }
            }
            tracing::debug!("console reader exiting");
        });
    if let Err(e) = spawned {
        // The channel closes with the dropped sender; the loop sees end of input.
        tracing::error!(error = %e, "could not start console reader");
    }
    rx
}

/// Hand console lines to the pipeline until `&quit`, end of input, or the
/// session ends for another reason.
///
/// Deliveries still in flight when the loop exits get up to
/// [`DRAIN_TIMEOUT`] to finish.
pub async fn run_input_loop<C, T>(
    pipeline: &Arc<Pipeline<C, T>>,
    mut lines: mpsc::Receiver<String>,
) -> SessionEnd
where
    C: CryptoProvider,
    T: Transport,
{
    let mut session = pipeline.subscribe();
    let mut pending: Vec<JoinHandle<()>> = Vec::new();

    let end = loop {
        pending.retain(|handle| !handle.is_finished());
        pipeline.console().prompt();

        tokio::select! {
            line = lines.recv() => match line {
                Some(line) => match pipeline.handle_input(&line) {
                    Flow::Continue => {}
                    Flow::Pending(handle) => pending.push(handle),
                    Flow::Quit => break SessionEnd::Quit,
                },
                None => break SessionEnd::InputClosed,
            },
            ended = session.wait_for(Option::is_some) => {
                break ended
                    .ok()
                    .and_then(|end| end.clone())
                    .unwrap_or(SessionEnd::Disconnected);
            }
        }
    };

    if !pending.is_empty()
        && tokio::time::timeout(DRAIN_TIMEOUT, join_all(pending))
            .await
            .is_err()
    {
        tracing::warn!("in-flight messages still pending at exit");
    }
    pipeline.end_session(end.clone());
    end
}
