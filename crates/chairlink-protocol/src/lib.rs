//! Wire protocol for Chairlink.
//!
//! This crate defines the contract that both ends of a channel agree on:
//!
//! - **Types** ([`ClientMessage`], [`ServerMessage`], [`Message`]):
//!   the two closed message families and the timestamped wrapper.
//! - **Contract** ([`Contract`] trait, [`validate`], [`decode_frame`]):
//!   deciding whether an arbitrary JSON payload is a legal message.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how values become text
//!   frames and back.
//! - **Errors** ([`ProtocolError`], [`ContractViolation`]).
//!
//! # Architecture
//!
//! The protocol layer sits between the transport (text frames) and the
//! channel (dispatch to subscribers). It knows nothing about connections or
//! reconnection.
//!
//! ```text
//! Transport (frames) → Protocol (Message<ServerMessage>) → Channel (handlers)
//! ```

mod codec;
mod contract;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use contract::{Contract, decode_frame, validate};
pub use error::{ContractViolation, ProtocolError};
pub use types::{
    ClientMessage, Direction, InboundMessage, Message, OutboundMessage,
    ServerMessage,
};
