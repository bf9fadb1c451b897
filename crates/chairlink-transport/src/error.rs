/// Errors that can occur in the transport layer.
///
/// Payloads are plain strings so the error can be cloned into lifecycle
/// events and handed to several observers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The endpoint URL could not be used. Raised synchronously by
    /// [`Transport::open`](crate::Transport::open).
    #[error("invalid endpoint url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// No async runtime was available to drive the connection.
    #[error("no async runtime available to drive the connection")]
    NoRuntime,

    /// The connection could not be established.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// Reading from an open connection failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Writing to the connection failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The connection is already closed.
    #[error("connection closed")]
    ConnectionClosed,
}
