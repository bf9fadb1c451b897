//! Per-type dispatch of inbound messages.

use chairlink_protocol::{Contract, InboundMessage, ServerMessage};

use crate::registry::{Handler, Registry};

/// A handler for inbound messages of one `type`.
pub type MessageHandler = Handler<InboundMessage>;

/// Routes each validated inbound message to the handlers registered for
/// its `type`.
#[derive(Debug)]
pub struct MessageRouter {
    routes: Registry<String, InboundMessage>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self {
            routes: Registry::new(),
        }
    }

    /// Registers `handler` for `message_type`.
    ///
    /// A type the server never sends is accepted (the handler will simply
    /// never run) but logged, since it is almost always a typo.
    pub fn on(&self, message_type: impl Into<String>, handler: MessageHandler) {
        let message_type = message_type.into();
        if !ServerMessage::is_known_type(&message_type) {
            tracing::warn!(
                message_type = %message_type,
                "handler registered for a type the server never sends"
            );
        }
        self.routes.add(message_type, handler);
    }

    pub fn off(&self, message_type: &str, handler: &MessageHandler) {
        self.routes.remove(message_type, handler);
    }

    pub fn handler_count(&self, message_type: &str) -> usize {
        self.routes.count(message_type)
    }

    /// Delivers `message` to the handlers for its type. Returns how many
    /// ran to completion.
    pub fn route(&self, message: &InboundMessage) -> usize {
        self.routes.dispatch(message.message_type(), message)
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new()
    }
}
