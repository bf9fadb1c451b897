//! Client transport abstraction layer for Chairlink.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! the byte-stream primitive a channel drives. A transport does not know
//! about messages or reconnection: it opens one connection, reports what
//! happens to it through an [`EventSink`], and carries text frames.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket client transport via `tokio-tungstenite`

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::sync::Arc;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Details of a closed connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CloseInfo {
    /// WebSocket close code, if the peer sent one (1000 = normal).
    pub code: Option<u16>,
    /// Human-readable reason, possibly empty.
    pub reason: String,
}

impl CloseInfo {
    /// Normal closure code.
    pub const NORMAL: u16 = 1000;
    /// Code reported when the connection dropped without a close frame.
    pub const ABNORMAL: u16 = 1006;

    /// A close with a code and reason.
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            reason: reason.into(),
        }
    }

    /// A close without any close frame (connection lost).
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(Self::ABNORMAL, reason)
    }

    /// Returns `true` if the peer closed with the normal closure code.
    pub fn was_clean(&self) -> bool {
        self.code == Some(Self::NORMAL)
    }
}

impl fmt::Display for CloseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.reason.is_empty()) {
            (Some(code), true) => write!(f, "code {code}"),
            (Some(code), false) => write!(f, "code {code}: {}", self.reason),
            (None, true) => write!(f, "no close frame"),
            (None, false) => write!(f, "{}", self.reason),
        }
    }
}

/// A signal emitted by a connection over its lifetime.
///
/// A well-behaved connection emits `Opened` at most once, any number of
/// `Message`/`Error`, and exactly one `Closed` as its last signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is established and can carry frames.
    Opened,
    /// A text frame arrived.
    Message(String),
    /// Something went wrong. A `Closed` signal follows if the connection
    /// cannot continue.
    Error(TransportError),
    /// The connection is gone.
    Closed(CloseInfo),
}

/// Receives [`TransportEvent`]s from a connection.
///
/// Cheap to clone. The connection calls it from its own task, one event at a
/// time, in the order things happened on the wire.
#[derive(Clone)]
pub struct EventSink {
    deliver: Arc<dyn Fn(TransportEvent) + Send + Sync>,
}

impl EventSink {
    /// Wraps a callback as a sink.
    pub fn new(deliver: impl Fn(TransportEvent) + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    /// Delivers one event.
    pub fn emit(&self, event: TransportEvent) {
        (self.deliver)(event);
    }

    pub fn opened(&self) {
        self.emit(TransportEvent::Opened);
    }

    pub fn message(&self, text: impl Into<String>) {
        self.emit(TransportEvent::Message(text.into()));
    }

    pub fn error(&self, error: TransportError) {
        self.emit(TransportEvent::Error(error));
    }

    pub fn closed(&self, info: CloseInfo) {
        self.emit(TransportEvent::Closed(info));
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}

/// Opens outbound connections to an endpoint.
pub trait Transport: Send + Sync + 'static {
    /// Starts opening a connection to `url`.
    ///
    /// Returns immediately. Progress is reported through `sink`: `Opened`
    /// once the connection is usable, `Closed` if it never gets there.
    /// Failures that can be detected up front (malformed URL, missing
    /// runtime) are returned as `Err` instead.
    ///
    /// Implementations must not call `sink` from inside `open`.
    fn open(
        &self,
        url: &str,
        sink: EventSink,
    ) -> Result<Box<dyn Connection>, TransportError>;
}

/// A single live connection.
pub trait Connection: Send + Sync + 'static {
    /// Queues a text frame for delivery to the remote peer.
    ///
    /// May report a failure through the sink before returning.
    fn send(&self, frame: String) -> Result<(), TransportError>;

    /// Requests the connection to close. The `Closed` signal follows
    /// through the sink once the close completes.
    ///
    /// Must not call the sink synchronously.
    fn close(&self);

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
