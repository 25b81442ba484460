//! WebSocket connection to the chat server.
//!
//! The server exposes one endpoint, `ws://<host>:<port>/server/actions`.
//! Text frames carry broadcast JSON; binary frames carry private envelopes.
//! A background reader task forwards both into a channel so `recv` never
//! holds the socket.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::{Frame, Transport, TransportError};

type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Path of the chat server's action endpoint.
pub const ACTIONS_PATH: &str = "/server/actions";

/// Default timeout for connecting to the chat server.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default capacity of the inbound frame channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Connection options for [`WebSocketTransport::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// How long to wait for the WebSocket handshake.
    pub timeout: Duration,
    /// Inbound frames buffered before the reader applies backpressure.
    pub channel_capacity: usize,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CONNECT_TIMEOUT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Build the action endpoint URL for `host:port`.
///
/// # Errors
///
/// [`TransportError::InvalidUrl`] if the host does not form a valid URL.
pub fn actions_url(host: &str, port: u16) -> Result<Url, TransportError> {
    let raw = format!("ws://{host}:{port}{ACTIONS_PATH}");
    Url::parse(&raw).map_err(|e| TransportError::InvalidUrl(format!("{raw}: {e}")))
}

/// Chat server connection over WebSocket.
pub struct WebSocketTransport {
    url: Url,
    ws_sender: Arc<Mutex<WsSender>>,
    incoming: Mutex<mpsc::Receiver<Frame>>,
    connected: Arc<AtomicBool>,
    _reader_handle: tokio::task::JoinHandle<()>,
}

impl WebSocketTransport {
    /// Connect to the chat server at `url`.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Timeout`] if the handshake takes longer than
    ///   `options.timeout`.
    /// - [`TransportError::Unreachable`] if the server refuses the connection.
    /// - [`TransportError::Io`] for any other handshake failure.
    pub async fn connect(url: Url, options: ConnectOptions) -> Result<Self, TransportError> {
        let (ws_stream, _response) =
            tokio::time::timeout(options.timeout, connect_async(url.as_str()))
                .await
                .map_err(|_| {
                    tracing::warn!(%url, "chat server connect timed out");
                    TransportError::Timeout
                })?
                .map_err(|e| {
                    tracing::warn!(%url, error = %e, "chat server connect failed");
                    map_ws_connect_error(&url, e)
                })?;

        let (ws_sender, ws_reader) = ws_stream.split();
        let (tx, rx) = mpsc::channel(options.channel_capacity.max(1));
        let connected = Arc::new(AtomicBool::new(true));
        let reader_handle = tokio::spawn(reader_loop(ws_reader, tx, Arc::clone(&connected)));

        tracing::info!(%url, "connected to chat server");
        Ok(Self {
            url,
            ws_sender: Arc::new(Mutex::new(ws_sender)),
            incoming: Mutex::new(rx),
            connected,
            _reader_handle: reader_handle,
        })
    }

    /// The URL this transport is connected to.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    async fn send_message(&self, message: Message) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(TransportError::ConnectionClosed);
        }
        let mut sender = self.ws_sender.lock().await;
        sender.send(message).await.map_err(|e| {
            tracing::warn!(error = %e, "chat server send failed");
            self.connected.store(false, Ordering::Relaxed);
            TransportError::ConnectionClosed
        })
    }
}

impl Transport for WebSocketTransport {
    async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.send_message(Message::Text(text.to_string().into()))
            .await
    }

    async fn send_binary(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.send_message(Message::Binary(payload.to_vec().into()))
            .await
    }

    async fn recv(&self) -> Result<Frame, TransportError> {
        let mut rx = self.incoming.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn close(&self) {
        if !self.connected.swap(false, Ordering::Relaxed) {
            return;
        }
        let mut sender = self.ws_sender.lock().await;
        if let Err(e) = sender.close().await {
            tracing::debug!(error = %e, "error closing chat server connection");
        }
        tracing::info!(url = %self.url, "chat server connection closed");
    }
}

/// Forward inbound text/binary frames into `tx` until the socket closes.
async fn reader_loop(mut ws_reader: WsReader, tx: mpsc::Sender<Frame>, connected: Arc<AtomicBool>) {
    while let Some(msg_result) = ws_reader.next().await {
        let frame = match msg_result {
            Ok(Message::Text(text)) => Frame::Text(text.as_str().to_string()),
            Ok(Message::Binary(data)) => Frame::Binary(data.to_vec()),
            Ok(Message::Close(_)) => {
                tracing::info!("chat server closed the connection");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "chat server read error");
                break;
            }
        };
        if tx.send(frame).await.is_err() {
            // Transport dropped.
            break;
        }
    }
    connected.store(false, Ordering::Relaxed);
    tracing::debug!("chat server reader task exiting");
}

fn map_ws_connect_error(url: &Url, err: tokio_tungstenite::tungstenite::Error) -> TransportError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err)
            if matches!(
                io_err.kind(),
                std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::AddrNotAvailable
            ) =>
        {
            TransportError::Unreachable(url.to_string())
        }
        WsError::Io(io_err) => TransportError::Io(io_err),
        WsError::Http(response) => TransportError::Io(std::io::Error::other(format!(
            "chat server HTTP error: status {}",
            response.status()
        ))),
        other => TransportError::Io(std::io::Error::other(format!(
            "chat server connection error: {other}"
        ))),
    }
}
