//! Loopback transport for testing.
//!
//! Uses in-process [`tokio::sync::mpsc`] channels to stand in for the chat
//! server connection. [`LoopbackTransport::create_pair`] returns two
//! connected endpoints: frames sent on one are received by the other. Tests
//! typically give one end to the pipeline and drive the other end as the
//! server.

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc};

use super::{Frame, Transport, TransportError};

/// In-process transport backed by `tokio::sync::mpsc` channels.
pub struct LoopbackTransport {
    /// Sender toward the remote end; `None` once closed.
    tx: Mutex<Option<mpsc::Sender<Frame>>>,
    /// Frames sent by the remote end.
    rx: AsyncMutex<mpsc::Receiver<Frame>>,
}

impl LoopbackTransport {
    /// Create a pair of connected loopback transports.
    ///
    /// `buffer` is the channel capacity in each direction.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use relaychat::transport::loopback::LoopbackTransport;
    /// use relaychat::transport::{Frame, Transport};
    ///
    /// # async fn example() {
    /// let (client, server) = LoopbackTransport::create_pair(32);
    /// client.send_text("hello").await.unwrap();
    /// assert_eq!(server.recv().await.unwrap(), Frame::Text("hello".into()));
    /// # }
    /// ```
    #[must_use]
    pub fn create_pair(buffer: usize) -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::channel(buffer.max(1));
        let (tx_b, rx_b) = mpsc::channel(buffer.max(1));

        let a = Self {
            tx: Mutex::new(Some(tx_b)),
            rx: AsyncMutex::new(rx_a),
        };
        let b = Self {
            tx: Mutex::new(Some(tx_a)),
            rx: AsyncMutex::new(rx_b),
        };
        (a, b)
    }

    fn sender(&self) -> Result<mpsc::Sender<Frame>, TransportError> {
        self.tx
            .lock()
            .as_ref()
            .cloned()
            .ok_or(TransportError::ConnectionClosed)
    }

    async fn send_frame(&self, frame: Frame) -> Result<(), TransportError> {
        self.sender()?
            .send(frame)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Receive the next frame if one arrives within `timeout`.
    pub async fn recv_timeout(&self, timeout: std::time::Duration) -> Option<Frame> {
        tokio::time::timeout(timeout, self.recv()).await.ok()?.ok()
    }
}

impl Transport for LoopbackTransport {
    async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.send_frame(Frame::Text(text.to_string())).await
    }

    async fn send_binary(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.send_frame(Frame::Binary(payload.to_vec())).await
    }

    async fn recv(&self) -> Result<Frame, TransportError> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    fn is_connected(&self) -> bool {
        self.tx.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }

    async fn close(&self) {
        self.tx.lock().take();
    }
}
