//! # Chairlink
//!
//! Persistent, self-healing message channel for the practice client.
//!
//! A [`Channel`] keeps one long-lived connection to the practice server.
//! It validates every message against a typed contract in both directions,
//! reconnects with capped exponential backoff after unplanned closes, and
//! fans inbound messages out to independent subscribers.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use chairlink::prelude::*;
//!
//! # async fn run() -> Result<(), ChannelError> {
//! let channel = Channel::builder(ChannelConfig::default())
//!     .on_open(|| println!("connected"))
//!     .on_reconnect(|r| println!("retry {} in {:?}", r.attempt, r.delay))
//!     .build(WebSocketTransport::new())?;
//!
//! channel.on_message_type(
//!     "diagnosis_ready",
//!     Arc::new(|msg: &InboundMessage| println!("{:?}", msg.body)),
//! );
//! # Ok(())
//! # }
//! ```

mod channel;
mod config;
mod error;
mod event;
mod reconnect;
mod registry;
mod router;
mod status;

pub use channel::{Channel, ChannelBuilder};
pub use config::{ChannelConfig, DEFAULT_URL, MAX_RECONNECT_DELAY, URL_ENV};
pub use error::ChannelError;
pub use event::{ChannelEvent, EventBus, EventHandler, EventKind};
pub use reconnect::{
    BACKOFF_FACTOR, ReconnectAttempt, ReconnectPolicy, next_delay,
    should_reconnect,
};
pub use registry::Handler;
pub use router::{MessageHandler, MessageRouter};
pub use status::{ConnectionStatus, StateMachine};

pub use chairlink_protocol as protocol;
pub use chairlink_transport as transport;

/// Convenient re-exports for common usage.
///
/// ```rust
/// use chairlink::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Channel, ChannelBuilder, ChannelConfig, ChannelError, ChannelEvent,
        ConnectionStatus, EventHandler, EventKind, MessageHandler,
        ReconnectAttempt,
    };
    pub use chairlink_protocol::{
        ClientMessage, ContractViolation, Direction, InboundMessage, Message,
        ServerMessage,
    };
    pub use chairlink_transport::{
        CloseInfo, Transport, TransportError, WebSocketTransport,
    };
}
