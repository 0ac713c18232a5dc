//! Transport abstraction for the Word Duel push channel.
//!
//! The [`Transport`] trait defines a bidirectional text message channel
//! between the client and the backend. Push messages are JSON text, so every
//! transport implementation handles framing internally.
//!
//! Unlike a one-shot client, the connection manager must be able to open a
//! *new* transport after every drop. That is what [`Connector`] is for: it
//! turns a fully-formed channel URI into a connected transport. The built-in
//! `WebSocketConnector` opens WebSockets; tests supply scripted connectors.
//!
//! # Plugging in another channel
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use word_duel_sync::error::SyncError;
//! use word_duel_sync::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), SyncError> {
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, SyncError>> {
//!         // None once the peer has closed the channel
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), SyncError> {
//!         todo!()
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     type Transport = MyTransport;
//!
//!     async fn connect(&self, uri: &str) -> Result<MyTransport, SyncError> {
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::SyncError;

/// One open push channel carrying JSON envelopes as text.
///
/// Framing is the implementation's concern: `send` takes one whole envelope
/// and `recv` yields one whole envelope.
///
/// `recv` is polled inside `tokio::select!` next to heartbeat and shutdown
/// branches, so it must be cancel-safe: dropping its future must not lose an
/// envelope.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Write one outbound envelope.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::TransportSend`], or [`SyncError::TransportClosed`]
    /// after [`close`](Transport::close).
    async fn send(&mut self, message: String) -> Result<(), SyncError>;

    /// Wait for the next inbound envelope.
    ///
    /// `None` means the peer closed the channel. `Some(Err(_))` is a receive
    /// failure; the connection manager closes the transport after reporting
    /// it.
    async fn recv(&mut self) -> Option<Result<String, SyncError>>;

    /// Close the channel. Must be idempotent and release the underlying
    /// connection even when the close handshake fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails.
    async fn close(&mut self) -> Result<(), SyncError>;
}

/// Opens push-channel transports.
///
/// The URI already carries the identifying query parameters; the channel has
/// no other handshake.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The transport type this connector produces.
    type Transport: Transport;

    /// Open a new transport to `uri`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Connect`], [`SyncError::Io`], or
    /// [`SyncError::Timeout`] if the channel could not be opened.
    async fn connect(&self, uri: &str) -> Result<Self::Transport, SyncError>;
}
