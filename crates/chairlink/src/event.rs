//! Lifecycle events and the bus that fans them out.

use std::fmt;

use chairlink_protocol::{ContractViolation, InboundMessage};
use chairlink_transport::{CloseInfo, TransportError};

use crate::registry::{Handler, Registry};
use crate::{ConnectionStatus, ReconnectAttempt};

/// What a generic handler subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Open,
    Close,
    Error,
    StatusChange,
    Reconnect,
    ReconnectFailed,
    Message,
    ContractViolation,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        Self::Open,
        Self::Close,
        Self::Error,
        Self::StatusChange,
        Self::Reconnect,
        Self::ReconnectFailed,
        Self::Message,
        Self::ContractViolation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Error => "error",
            Self::StatusChange => "status_change",
            Self::Reconnect => "reconnect",
            Self::ReconnectFailed => "reconnect_failed",
            Self::Message => "message",
            Self::ContractViolation => "contract_violation",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that happened on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The transport is established.
    Open,
    /// The transport is gone.
    Close(CloseInfo),
    /// The transport reported a fault.
    Error(TransportError),
    /// The status changed. Always emitted before the event describing
    /// the same transition.
    StatusChange(ConnectionStatus),
    /// A retry has been scheduled.
    Reconnect(ReconnectAttempt),
    /// The retry budget is spent; the channel stays closed.
    ReconnectFailed { attempts: u32 },
    /// A valid inbound message arrived.
    Message(InboundMessage),
    /// A payload was dropped because it broke the message contract.
    ContractViolation(ContractViolation),
}

impl ChannelEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Open => EventKind::Open,
            Self::Close(_) => EventKind::Close,
            Self::Error(_) => EventKind::Error,
            Self::StatusChange(_) => EventKind::StatusChange,
            Self::Reconnect(_) => EventKind::Reconnect,
            Self::ReconnectFailed { .. } => EventKind::ReconnectFailed,
            Self::Message(_) => EventKind::Message,
            Self::ContractViolation(_) => EventKind::ContractViolation,
        }
    }
}

/// A generic lifecycle handler.
pub type EventHandler = Handler<ChannelEvent>;

/// Multi-subscriber dispatcher for [`ChannelEvent`]s.
#[derive(Debug)]
pub struct EventBus {
    handlers: Registry<EventKind, ChannelEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: Registry::new(),
        }
    }

    /// Subscribes `handler` to `kind`. Subscribing the same handler twice
    /// is a no-op.
    pub fn on(&self, kind: EventKind, handler: EventHandler) {
        self.handlers.add(kind, handler);
    }

    /// Unsubscribes `handler` from `kind`. Unknown handlers are ignored.
    pub fn off(&self, kind: EventKind, handler: &EventHandler) {
        self.handlers.remove(&kind, handler);
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.count(&kind)
    }

    /// Delivers `event` to every handler subscribed to its kind.
    pub fn emit(&self, event: &ChannelEvent) {
        let kind = event.kind();
        tracing::trace!(%kind, "emit");
        self.handlers.dispatch(&kind, event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
