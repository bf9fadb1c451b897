//! Connection lifecycle.
//!
//! ```text
//!            connect()            transport opened
//!   Closed ─────────────→ Connecting ─────────────→ Open
//!     ↑                                              │
//!     │    transport closed        disconnect()      │
//!     └──────────────────── Closing ←────────────────┘
//!
//!   any state ──(transport error)──→ Error
//! ```
//!
//! `Error` is a fault indicator, not a terminal state. The transport may
//! still be alive underneath; a following `Closed` signal or an explicit
//! `connect()` moves the machine on.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a channel is in its lifecycle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No transport. The initial state.
    #[default]
    Closed,
    /// A transport is being opened.
    Connecting,
    /// The transport is established. The only state that can send.
    Open,
    /// A close was requested and the transport is shutting down.
    Closing,
    /// The last transport reported a fault.
    Error,
}

impl ConnectionStatus {
    /// Returns `true` if messages can be sent in this state.
    pub fn can_send(self) -> bool {
        self == Self::Open
    }

    /// Returns `true` if `connect()` would start a new transport from here.
    pub fn can_connect(self) -> bool {
        matches!(self, Self::Closed | Self::Error)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Owns the current [`ConnectionStatus`].
///
/// All changes go through [`transition`](Self::transition), which reports
/// whether anything actually changed. Identical transitions are absorbed
/// so observers never see `open → open`.
#[derive(Debug, Default)]
pub struct StateMachine {
    status: ConnectionStatus,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Moves to `next`. Returns the new status if it differs from the
    /// old one, `None` otherwise.
    pub fn transition(
        &mut self,
        next: ConnectionStatus,
    ) -> Option<ConnectionStatus> {
        if self.status == next {
            return None;
        }
        tracing::debug!(from = %self.status, to = %next, "status transition");
        self.status = next;
        Some(next)
    }
}
