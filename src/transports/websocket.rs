//! Push channel over WebSocket, using `tokio-tungstenite`.
//!
//! The [`ConnectionManager`](crate::connection::ConnectionManager) never opens
//! sockets itself: it asks a [`WebSocketConnector`] for a fresh
//! [`WebSocketTransport`] on every attempt, so a hung handshake is bounded by
//! the connector's timeout and counts as one failed attempt.
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), word_duel_sync::SyncError> {
//! use std::time::Duration;
//! use word_duel_sync::{Connector, Transport, WebSocketConnector};
//!
//! let connector = WebSocketConnector::new().with_connect_timeout(Duration::from_secs(5));
//! let mut channel = connector
//!     .connect("wss://push.example.com/prod?gameId=g1&playerId=p1&playerName=Ada")
//!     .await?;
//!
//! while let Some(Ok(envelope)) = channel.recv().await {
//!     println!("{envelope}");
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::transport::{Connector, Transport};

/// Default time allowed for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One open push channel.
///
/// Envelopes arrive as text frames. Some gateways deliver the same JSON in
/// binary frames; those are accepted when they are valid UTF-8.
///
/// [`recv`](Transport::recv) is cancel-safe.
#[derive(Debug)]
pub struct WebSocketTransport {
    socket: Socket,
    closed: bool,
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), SyncError> {
        if self.closed {
            return Err(SyncError::TransportClosed);
        }
        self.socket
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| SyncError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, SyncError>> {
        while let Some(frame) = self.socket.next().await {
            match frame {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => warn!(len = bytes.len(), "dropping non-UTF-8 binary frame"),
                },
                Ok(Message::Close(close)) => {
                    debug!(?close, "push channel closed by peer");
                    return None;
                }
                // Control frames; tungstenite answers pings on its own.
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(e) => return Some(Err(SyncError::TransportReceive(e.to_string()))),
            }
        }
        None
    }

    async fn close(&mut self) -> Result<(), SyncError> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        self.socket
            .close(None)
            .await
            .map_err(|e| SyncError::TransportSend(e.to_string()))
    }
}

/// Opens a [`WebSocketTransport`] per connection attempt.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    connect_timeout: Duration,
}

impl WebSocketConnector {
    /// A connector with the default 10 second handshake timeout.
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the handshake timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    /// # Errors
    ///
    /// Returns [`SyncError::Timeout`] if the handshake does not finish in
    /// time, or [`SyncError::Connect`] if it is refused or fails.
    async fn connect(&self, uri: &str) -> Result<WebSocketTransport, SyncError> {
        let handshake = tokio_tungstenite::connect_async(uri);
        let (socket, response) = tokio::time::timeout(self.connect_timeout, handshake)
            .await
            .map_err(|_| SyncError::Timeout)?
            .map_err(|e| SyncError::Connect(e.to_string()))?;
        info!(status = %response.status(), "push channel handshake complete");
        Ok(WebSocketTransport {
            socket,
            closed: false,
        })
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

    type ServerSocket = WebSocketStream<TcpStream>;

    /// Accept one push channel on a local port and hand it to `serve`.
    /// Resolves to the URI the client should open and the request path the
    /// server saw.
    async fn push_server<F, Fut>(serve: F) -> (String, oneshot::Receiver<String>)
    where
        F: FnOnce(ServerSocket) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (path_tx, path_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let record_path = |req: &Request, resp: Response| {
                let _ = path_tx.send(req.uri().to_string());
                Ok(resp)
            };
            let socket = tokio_tungstenite::accept_hdr_async(tcp, record_path)
                .await
                .unwrap();
            serve(socket).await;
        });

        (format!("ws://{addr}/prod"), path_rx)
    }

    async fn drain(mut socket: ServerSocket) {
        while let Some(Ok(_)) = socket.next().await {}
    }

    #[test]
    fn transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn identity_reaches_the_server_in_the_query() {
        let (base, path) = push_server(drain).await;
        let uri = format!("{base}?gameId=g1&playerId=p1&playerName=Ada+L");

        let mut channel = WebSocketConnector::new().connect(&uri).await.unwrap();
        assert_eq!(
            path.await.unwrap(),
            "/prod?gameId=g1&playerId=p1&playerName=Ada+L"
        );
        channel.close().await.unwrap();
    }

    #[tokio::test]
    async fn envelopes_arrive_as_text() {
        let (uri, _) = push_server(|mut socket| async move {
            let envelope = r#"{"type":"PLAYER_JOINED","payload":{"playerId":"p2"}}"#;
            socket.send(Message::Text(envelope.into())).await.unwrap();
            socket.close(None).await.unwrap();
        })
        .await;

        let mut channel = WebSocketConnector::new().connect(&uri).await.unwrap();
        let text = channel.recv().await.unwrap().unwrap();
        assert!(text.contains("PLAYER_JOINED"));
        assert!(channel.recv().await.is_none());
    }

    #[tokio::test]
    async fn utf8_binary_frames_are_accepted_and_others_dropped() {
        let (uri, _) = push_server(|mut socket| async move {
            socket
                .send(Message::Binary(vec![0xFF, 0xFE].into()))
                .await
                .unwrap();
            socket
                .send(Message::Binary(br#"{"type":"PONG"}"#.to_vec().into()))
                .await
                .unwrap();
            socket.close(None).await.unwrap();
        })
        .await;

        let mut channel = WebSocketConnector::new().connect(&uri).await.unwrap();
        assert_eq!(channel.recv().await.unwrap().unwrap(), r#"{"type":"PONG"}"#);
    }

    #[tokio::test]
    async fn heartbeat_reaches_the_server() {
        let (seen_tx, seen_rx) = oneshot::channel();
        let (uri, _) = push_server(|mut socket| async move {
            if let Some(Ok(Message::Text(text))) = socket.next().await {
                let _ = seen_tx.send(text.to_string());
            }
            drain(socket).await;
        })
        .await;

        let mut channel = WebSocketConnector::new().connect(&uri).await.unwrap();
        let ping = serde_json::to_string(&crate::protocol::OutboundMessage::Ping { timestamp: 7 })
            .unwrap();
        channel.send(ping).await.unwrap();
        assert_eq!(seen_rx.await.unwrap(), r#"{"type":"PING","timestamp":7}"#);
    }

    #[tokio::test]
    async fn closed_channel_rejects_sends() {
        let (uri, _) = push_server(drain).await;

        let mut channel = WebSocketConnector::new().connect(&uri).await.unwrap();
        channel.close().await.unwrap();
        channel.close().await.unwrap();
        let err = channel.send("{}".to_owned()).await.unwrap_err();
        assert!(matches!(err, SyncError::TransportClosed));
    }

    #[tokio::test]
    async fn refused_handshake_is_a_connect_error() {
        let err = WebSocketConnector::new()
            .connect("ws://127.0.0.1:1/prod")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Connect(_)));

        let err = WebSocketConnector::new()
            .connect("not a uri")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Connect(_)));
    }

    #[tokio::test]
    async fn stalled_handshake_times_out() {
        // Accepts TCP but never answers the upgrade.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_tcp, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let connector = WebSocketConnector::new().with_connect_timeout(Duration::from_millis(50));
        assert_eq!(connector.connect_timeout(), Duration::from_millis(50));
        let err = connector.connect(&format!("ws://{addr}/")).await.unwrap_err();
        assert!(matches!(err, SyncError::Timeout));
    }
}
