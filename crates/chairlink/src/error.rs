//! Unified error type for the Chairlink channel.

use chairlink_protocol::{ContractViolation, ProtocolError};
use chairlink_transport::TransportError;

use crate::ConnectionStatus;

/// Top-level error that wraps all crate-specific errors.
///
/// Only configuration and [`Channel::try_send`](crate::Channel::try_send)
/// surface it. Network trouble never does: it shows up as status changes
/// and lifecycle events instead.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The channel configuration is unusable.
    #[error("invalid channel configuration: {0}")]
    Config(String),

    /// The channel cannot carry messages in its current status.
    #[error("channel is not open (status: {0})")]
    NotOpen(ConnectionStatus),

    /// The message does not satisfy the outbound contract.
    #[error(transparent)]
    Contract(#[from] ContractViolation),

    /// The message could not be serialized.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The transport refused the frame.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
