//! WebSocket transport abstraction
//!
//! A transport opens a duplex connection and hands back its two halves: a
//! [`FrameSink`] for outbound text frames and a [`FrameSource`] for inbound
//! frames. The halves are owned by different tasks, so they are split at
//! open time. [`MockTransport`] (feature `test-utils`) scripts the inbound
//! side and records the outbound side.
//!
//! # Example
//!
//! ```no_run
//! use okex_ws::transport::{Frame, Transport, TransportError, WsTransport};
//!
//! async fn example() -> Result<(), TransportError> {
//!     let (mut sink, mut source) = WsTransport::new()
//!         .open("wss://real.okex.com:8443/ws/v3")
//!         .await?;
//!     sink.send_text("ping").await?;
//!     if let Some(Frame::Text(text)) = source.next_frame().await? {
//!         println!("Received: {}", text);
//!     }
//!     sink.close().await
//! }
//! ```

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument};

/// Transport layer errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Connection timeout
    #[error("connection timeout after {0:?}")]
    Timeout(Duration),

    /// Binary frame that does not inflate
    #[error("failed to inflate frame: {0}")]
    Inflate(String),
}

/// An inbound data frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame
    Text(String),
    /// Binary frame (raw deflate)
    Binary(Vec<u8>),
}

/// Write half of a connection
#[async_trait]
pub trait FrameSink: Send {
    /// Send a text frame
    async fn send_text(&mut self, text: &str) -> Result<(), TransportError>;

    /// Close the connection gracefully
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of a connection
#[async_trait]
pub trait FrameSource: Send {
    /// Receive the next data frame
    ///
    /// Returns `None` once the peer has closed the connection.
    async fn next_frame(&mut self) -> Result<Option<Frame>, TransportError>;
}

/// Boxed write half
pub type BoxSink = Box<dyn FrameSink>;

/// Boxed read half
pub type BoxSource = Box<dyn FrameSource>;

/// Trait for WebSocket transport abstraction
///
/// This trait enables unit testing of the agent by allowing mock
/// implementations to be injected instead of real WebSocket connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to `url` and split the connection
    async fn open(&self, url: &str) -> Result<(BoxSink, BoxSource), TransportError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Real WebSocket transport using tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl WsTransport {
    /// Create a new WebSocket transport
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WsTransport {
    #[instrument(skip(self))]
    async fn open(&self, url: &str) -> Result<(BoxSink, BoxSource), TransportError> {
        debug!("Connecting to WebSocket");

        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        debug!("WebSocket connected");
        let (sink, stream) = ws_stream.split();
        Ok((Box::new(WsSink { sink }), Box::new(WsSource { stream })))
    }
}

struct WsSink {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    #[instrument(skip(self, text), fields(len = text.len()))]
    async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text(text.to_string()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    #[instrument(skip(self))]
    async fn close(&mut self) -> Result<(), TransportError> {
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

struct WsSource {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn next_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(Frame::Text(text))),
                Some(Ok(Message::Binary(data))) => return Ok(Some(Frame::Binary(data))),
                Some(Ok(Message::Close(_))) => return Ok(None),
                // Protocol-level ping/pong and raw frames are handled by tungstenite
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
                None => return Err(TransportError::ConnectionClosed),
            }
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockHandle, MockTransport};

#[cfg(any(test, feature = "test-utils"))]
mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    enum Inbound {
        Frame(Frame),
        Error(TransportError),
        Close,
    }

    struct Shared {
        inbound_tx: Mutex<mpsc::UnboundedSender<Inbound>>,
        inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Inbound>>>,
        sent: Mutex<Vec<String>>,
        closed: AtomicBool,
        fail_send: AtomicBool,
        opens: AtomicUsize,
    }

    /// Mock transport for testing
    ///
    /// Inbound frames are scripted through the paired [`MockHandle`]; outbound
    /// text frames are captured there as well.
    pub struct MockTransport {
        shared: Arc<Shared>,
        fail_open: bool,
    }

    /// Test-side controller of a [`MockTransport`]
    #[derive(Clone)]
    pub struct MockHandle {
        shared: Arc<Shared>,
    }

    impl MockTransport {
        /// Create a mock transport and its controller
        #[allow(clippy::new_ret_no_self)]
        pub fn new() -> (Self, MockHandle) {
            let (tx, rx) = mpsc::unbounded_channel();
            let shared = Arc::new(Shared {
                inbound_tx: Mutex::new(tx),
                inbound_rx: Mutex::new(Some(rx)),
                sent: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                fail_send: AtomicBool::new(false),
                opens: AtomicUsize::new(0),
            });
            let handle = MockHandle {
                shared: shared.clone(),
            };
            (
                Self {
                    shared,
                    fail_open: false,
                },
                handle,
            )
        }

        /// Make every `open` fail
        pub fn failing_open(mut self) -> Self {
            self.fail_open = true;
            self
        }
    }

    impl MockHandle {
        fn push(&self, inbound: Inbound) {
            // The receiver lives as long as the session; a send after
            // teardown is simply dropped.
            let _ = self.shared.inbound_tx.lock().send(inbound);
        }

        /// Queue an inbound text frame
        pub fn push_text(&self, text: impl Into<String>) {
            self.push(Inbound::Frame(Frame::Text(text.into())));
        }

        /// Queue an inbound binary frame
        pub fn push_binary(&self, data: Vec<u8>) {
            self.push(Inbound::Frame(Frame::Binary(data)));
        }

        /// Simulate a receive error
        pub fn push_error(&self, error: TransportError) {
            self.push(Inbound::Error(error));
        }

        /// Simulate a close by the peer
        pub fn push_close(&self) {
            self.push(Inbound::Close);
        }

        /// Make subsequent sends fail
        pub fn set_fail_send(&self, fail: bool) {
            self.shared.fail_send.store(fail, Ordering::SeqCst);
        }

        /// Outbound text frames captured so far
        pub fn sent(&self) -> Vec<String> {
            self.shared.sent.lock().clone()
        }

        /// Take captured outbound frames
        pub fn take_sent(&self) -> Vec<String> {
            std::mem::take(&mut *self.shared.sent.lock())
        }

        /// Returns true once the sink has been closed
        pub fn is_closed(&self) -> bool {
            self.shared.closed.load(Ordering::SeqCst)
        }

        /// Number of successful opens
        pub fn open_count(&self) -> usize {
            self.shared.opens.load(Ordering::SeqCst)
        }

        /// Prepare a fresh inbound stream for the next `open`
        pub fn rearm(&self) {
            let (tx, rx) = mpsc::unbounded_channel();
            *self.shared.inbound_tx.lock() = tx;
            *self.shared.inbound_rx.lock() = Some(rx);
            self.shared.closed.store(false, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn open(&self, _url: &str) -> Result<(BoxSink, BoxSource), TransportError> {
            if self.fail_open {
                return Err(TransportError::ConnectionFailed(
                    "mock connection failure".into(),
                ));
            }
            let rx = self.shared.inbound_rx.lock().take().ok_or_else(|| {
                TransportError::ConnectionFailed("mock inbound stream already in use".into())
            })?;
            self.shared.opens.fetch_add(1, Ordering::SeqCst);

            Ok((
                Box::new(MockSink {
                    shared: self.shared.clone(),
                }),
                Box::new(MockSource { rx }),
            ))
        }
    }

    struct MockSink {
        shared: Arc<Shared>,
    }

    #[async_trait]
    impl FrameSink for MockSink {
        async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
            if self.shared.closed.load(Ordering::SeqCst) {
                return Err(TransportError::ConnectionClosed);
            }
            if self.shared.fail_send.load(Ordering::SeqCst) {
                return Err(TransportError::SendFailed("mock send failure".into()));
            }
            self.shared.sent.lock().push(text.to_string());
            Ok(())
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.shared.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct MockSource {
        rx: mpsc::UnboundedReceiver<Inbound>,
    }

    #[async_trait]
    impl FrameSource for MockSource {
        async fn next_frame(&mut self) -> Result<Option<Frame>, TransportError> {
            match self.rx.recv().await {
                Some(Inbound::Frame(frame)) => Ok(Some(frame)),
                Some(Inbound::Error(e)) => Err(e),
                Some(Inbound::Close) | None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_transport_send_recv() {
        let (transport, handle) = MockTransport::new();
        handle.push_text("pong");

        let (mut sink, mut source) = transport.open("wss://mock.test").await.unwrap();
        assert_eq!(handle.open_count(), 1);

        sink.send_text("ping").await.unwrap();
        assert_eq!(handle.sent(), vec!["ping".to_string()]);

        let frame = source.next_frame().await.unwrap();
        assert_eq!(frame, Some(Frame::Text("pong".into())));
    }

    #[tokio::test]
    async fn test_mock_transport_connection_failure() {
        let (transport, handle) = MockTransport::new();
        let transport = transport.failing_open();

        assert!(transport.open("wss://mock.test").await.is_err());
        assert_eq!(handle.open_count(), 0);
    }

    #[tokio::test]
    async fn test_mock_transport_close() {
        let (transport, handle) = MockTransport::new();
        handle.push_close();

        let (mut sink, mut source) = transport.open("wss://mock.test").await.unwrap();
        assert!(source.next_frame().await.unwrap().is_none());

        sink.close().await.unwrap();
        assert!(handle.is_closed());
        assert!(sink.send_text("late").await.is_err());
    }

    #[tokio::test]
    async fn test_mock_transport_single_open_until_rearmed() {
        let (transport, handle) = MockTransport::new();
        let _first = transport.open("wss://mock.test").await.unwrap();
        assert!(transport.open("wss://mock.test").await.is_err());

        handle.rearm();
        assert!(transport.open("wss://mock.test").await.is_ok());
        assert_eq!(handle.open_count(), 2);
    }
}
