//! Error types for the protocol layer.
//!
//! Two kinds of failure live here. [`ProtocolError`] means bytes could not
//! be turned into JSON (or back). [`ContractViolation`] means the JSON was
//! fine but does not describe a message the contract allows. A violation is
//! an expected, everyday outcome for inbound traffic, so it is a plain value
//! that callers match on rather than something to bubble up blindly.

use crate::Direction;

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into a frame).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning a frame into a Rust value).
    ///
    /// Common causes: malformed JSON or a truncated frame.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}

/// A payload that does not match any variant of the contract for its
/// direction.
///
/// Every variant carries the [`Direction`] so diagnostics read naturally:
/// "unknown outbound message type `diagnosis_ready`".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractViolation {
    /// The frame is not JSON at all.
    #[error("{direction} frame is not valid JSON: {reason}")]
    InvalidJson { direction: Direction, reason: String },

    /// The payload is JSON but not an object.
    #[error("{direction} message must be a JSON object")]
    NotAnObject { direction: Direction },

    /// The object has no string `type` discriminator.
    #[error("{direction} message has no string `type` field")]
    MissingType { direction: Direction },

    /// The `type` is not part of this direction's closed set.
    #[error("unknown {direction} message type `{message_type}`")]
    UnknownType {
        direction: Direction,
        message_type: String,
    },

    /// The `type` is known but the rest of the payload does not fit it.
    #[error("malformed {direction} `{message_type}` message: {reason}")]
    Malformed {
        direction: Direction,
        message_type: String,
        reason: String,
    },
}

impl ContractViolation {
    /// The direction the offending payload was travelling.
    pub fn direction(&self) -> Direction {
        match self {
            Self::InvalidJson { direction, .. }
            | Self::NotAnObject { direction }
            | Self::MissingType { direction }
            | Self::UnknownType { direction, .. }
            | Self::Malformed { direction, .. } => *direction,
        }
    }
}
