//! The channel facade: a persistent, self-healing connection with typed
//! dispatch.
//!
//! A [`Channel`] ties the pieces together:
//!
//! ```text
//!   Transport ──signals──→ state machine ──events──→ EventBus
//!                               │                       │
//!                               │ unplanned close       └─ message ─→ MessageRouter
//!                               ↓
//!                        ReconnectPolicy ──timer──→ connect again
//! ```
//!
//! # Locking
//!
//! Every transport signal is handled to completion before the transport
//! delivers the next one. State changes happen under a short lock; the
//! events they produce are collected and emitted after the lock is
//! released. Handlers can therefore call back into the channel (`send`,
//! `off`, `disconnect`) without deadlocking.
//!
//! # Generations
//!
//! Each connection attempt gets a new generation number, baked into the
//! sink handed to the transport. Signals from a superseded attempt (for
//! example the late `Closed` of a socket replaced by an explicit
//! `connect()`) are dropped.

use std::fmt;
use std::sync::{Arc, Weak};

use chairlink_protocol::{
    ClientMessage, Codec, ContractViolation, InboundMessage, JsonCodec,
    ProtocolError, ServerMessage, decode_frame, validate,
};
use chairlink_transport::{
    CloseInfo, Connection, EventSink, Transport, TransportError,
    TransportEvent,
};
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::task::AbortHandle;

use crate::{
    ChannelConfig, ChannelError, ChannelEvent, ConnectionStatus, EventBus,
    EventHandler, EventKind, MessageHandler, MessageRouter, ReconnectAttempt,
    ReconnectPolicy, StateMachine,
};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct ConnState {
    machine: StateMachine,
    /// Retries made since the last successful open.
    attempt: u32,
    /// The pending retry, tagged so a timer that already fired can tell
    /// whether it is still the current one.
    timer: Option<(u64, AbortHandle)>,
    timer_seq: u64,
    connection: Option<Arc<dyn Connection>>,
    generation: u64,
    /// Set by `disconnect()`, cleared by `connect()`. Suppresses
    /// reconnection.
    manual_close: bool,
}

impl ConnState {
    fn new() -> Self {
        Self {
            machine: StateMachine::new(),
            attempt: 0,
            timer: None,
            timer_seq: 0,
            connection: None,
            generation: 0,
            manual_close: false,
        }
    }

    fn status(&self) -> ConnectionStatus {
        self.machine.status()
    }

    /// Transitions and queues `status_change` if the status moved.
    fn transition(
        &mut self,
        next: ConnectionStatus,
        events: &mut Vec<ChannelEvent>,
    ) {
        if let Some(status) = self.machine.transition(next) {
            events.push(ChannelEvent::StatusChange(status));
        }
    }

    fn cancel_timer(&mut self) {
        if let Some((_, handle)) = self.timer.take() {
            handle.abort();
            tracing::debug!("pending reconnect cancelled");
        }
    }
}

struct Inner {
    config: ChannelConfig,
    policy: ReconnectPolicy,
    transport: Arc<dyn Transport>,
    codec: JsonCodec,
    state: Mutex<ConnState>,
    events: EventBus,
    router: MessageRouter,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        state.cancel_timer();
        if let Some(connection) = state.connection.take() {
            connection.close();
        }
    }
}

impl Inner {
    fn emit_all(&self, events: Vec<ChannelEvent>) {
        for event in &events {
            self.events.emit(event);
        }
    }

    fn sink(self: &Arc<Self>, generation: u64) -> EventSink {
        let weak: Weak<Self> = Arc::downgrade(self);
        EventSink::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_signal(generation, event);
            }
        })
    }

    // -- connect ------------------------------------------------------------

    fn connect(self: &Arc<Self>) {
        let mut events = Vec::new();
        let generation = {
            let mut state = self.state.lock();
            if !state.status().can_connect() {
                tracing::debug!(status = %state.status(), "connect ignored");
                return;
            }
            state.manual_close = false;
            state.cancel_timer();
            state.attempt = 0;
            Self::begin_attempt(&mut state, &mut events)
        };
        self.emit_all(events);
        self.open_transport(generation);
    }

    /// Enters `connecting` under a fresh generation.
    fn begin_attempt(
        state: &mut ConnState,
        events: &mut Vec<ChannelEvent>,
    ) -> u64 {
        if let Some(stale) = state.connection.take() {
            stale.close();
        }
        state.generation += 1;
        state.transition(ConnectionStatus::Connecting, events);
        state.generation
    }

    fn open_transport(self: &Arc<Self>, generation: u64) {
        tracing::debug!(url = %self.config.url, generation, "opening transport");
        match self.transport.open(&self.config.url, self.sink(generation)) {
            Ok(connection) => {
                let mut state = self.state.lock();
                if state.generation == generation {
                    state.connection = Some(Arc::from(connection));
                } else {
                    tracing::debug!(
                        id = %connection.id(),
                        "discarding connection from superseded attempt"
                    );
                    connection.close();
                }
            }
            Err(error) => self.on_open_failed(generation, error),
        }
    }

    fn on_open_failed(self: &Arc<Self>, generation: u64, error: TransportError) {
        let mut events = Vec::new();
        {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            tracing::warn!(%error, url = %self.config.url, "transport failed to open");
            state.transition(ConnectionStatus::Error, &mut events);
            events.push(ChannelEvent::Error(error));
            if !state.manual_close {
                self.schedule_reconnect(&mut state, &mut events);
            }
        }
        self.emit_all(events);
    }

    // -- transport signals --------------------------------------------------

    fn handle_signal(self: &Arc<Self>, generation: u64, event: TransportEvent) {
        match event {
            TransportEvent::Opened => self.on_opened(generation),
            TransportEvent::Message(frame) => self.on_frame(generation, &frame),
            TransportEvent::Error(error) => {
                self.on_transport_error(generation, error)
            }
            TransportEvent::Closed(info) => self.on_closed(generation, info),
        }
    }

    fn on_opened(&self, generation: u64) {
        let mut events = Vec::new();
        {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            if state.manual_close
                || !matches!(
                    state.status(),
                    ConnectionStatus::Connecting | ConnectionStatus::Error
                )
            {
                tracing::debug!(status = %state.status(), "late open ignored");
                return;
            }
            tracing::info!(url = %self.config.url, "channel open");
            state.attempt = 0;
            state.cancel_timer();
            state.transition(ConnectionStatus::Open, &mut events);
            events.push(ChannelEvent::Open);
        }
        self.emit_all(events);
    }

    fn on_frame(&self, generation: u64, frame: &str) {
        if self.state.lock().generation != generation {
            tracing::trace!("frame from superseded connection dropped");
            return;
        }
        match decode_frame::<ServerMessage>(&self.codec, frame) {
            Ok(message) => {
                tracing::debug!(
                    message_type = message.message_type(),
                    "inbound message"
                );
                self.events.emit(&ChannelEvent::Message(message.clone()));
                self.router.route(&message);
            }
            Err(violation) => {
                tracing::warn!(%violation, "inbound frame dropped");
                self.events.emit(&ChannelEvent::ContractViolation(violation));
            }
        }
    }

    fn on_transport_error(&self, generation: u64, error: TransportError) {
        let mut events = Vec::new();
        {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            tracing::warn!(%error, "transport error");
            state.transition(ConnectionStatus::Error, &mut events);
            events.push(ChannelEvent::Error(error));
        }
        self.emit_all(events);
    }

    fn on_closed(self: &Arc<Self>, generation: u64, info: CloseInfo) {
        let mut events = Vec::new();
        {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            state.connection = None;
            if state.status() == ConnectionStatus::Closed {
                return;
            }
            tracing::info!(close = %info, "channel closed");
            state.transition(ConnectionStatus::Closed, &mut events);
            events.push(ChannelEvent::Close(info));
            if state.manual_close {
                tracing::debug!("closed on request, not reconnecting");
            } else {
                self.schedule_reconnect(&mut state, &mut events);
            }
        }
        self.emit_all(events);
    }

    // -- reconnection -------------------------------------------------------

    fn schedule_reconnect(
        self: &Arc<Self>,
        state: &mut ConnState,
        events: &mut Vec<ChannelEvent>,
    ) {
        if !self.policy.should_reconnect(state.attempt) {
            if self.policy.enabled {
                tracing::warn!(
                    attempts = state.attempt,
                    "reconnect attempts exhausted"
                );
                // A failed synchronous open leaves the machine in `error`.
                state.transition(ConnectionStatus::Closed, events);
                events.push(ChannelEvent::ReconnectFailed {
                    attempts: state.attempt,
                });
            }
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no Tokio runtime, reconnect not scheduled");
            return;
        };

        state.attempt += 1;
        let attempt = state.attempt;
        let delay = self.policy.delay(attempt);

        state.cancel_timer();
        state.timer_seq += 1;
        let seq = state.timer_seq;
        let weak = Arc::downgrade(self);
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.reconnect_due(seq);
            }
        });
        state.timer = Some((seq, task.abort_handle()));

        tracing::info!(
            attempt,
            max_attempts = self.policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );
        events.push(ChannelEvent::Reconnect(ReconnectAttempt {
            attempt,
            max_attempts: self.policy.max_attempts,
            delay,
        }));
    }

    fn reconnect_due(self: &Arc<Self>, seq: u64) {
        let mut events = Vec::new();
        let generation = {
            let mut state = self.state.lock();
            if !matches!(state.timer, Some((current, _)) if current == seq) {
                return;
            }
            state.timer = None;
            if state.manual_close || !state.status().can_connect() {
                return;
            }
            tracing::debug!(attempt = state.attempt, "reconnecting");
            Self::begin_attempt(&mut state, &mut events)
        };
        self.emit_all(events);
        self.open_transport(generation);
    }

    // -- disconnect ---------------------------------------------------------

    fn disconnect(&self) {
        let mut events = Vec::new();
        {
            let mut state = self.state.lock();
            state.cancel_timer();
            state.manual_close = true;
            match state.status() {
                ConnectionStatus::Closed | ConnectionStatus::Closing => return,
                _ => {}
            }
            state.transition(ConnectionStatus::Closing, &mut events);
            match state.connection.as_ref() {
                Some(connection) => {
                    tracing::debug!(id = %connection.id(), "closing transport");
                    connection.close();
                }
                None => {
                    // Nothing to wait for: settle now and orphan any open
                    // still in flight.
                    state.generation += 1;
                    state.transition(ConnectionStatus::Closed, &mut events);
                    events.push(ChannelEvent::Close(CloseInfo::new(
                        CloseInfo::NORMAL,
                        "disconnected",
                    )));
                }
            }
        }
        self.emit_all(events);
    }

    // -- send ---------------------------------------------------------------

    fn try_send<M: Serialize + ?Sized>(
        &self,
        message: &M,
    ) -> Result<(), ChannelError> {
        let mut value =
            serde_json::to_value(message).map_err(ProtocolError::Encode)?;
        if let Value::Object(fields) = &mut value {
            fields.entry("timestamp").or_insert_with(|| {
                Value::String(
                    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                )
            });
        }

        if let Err(violation) = validate::<ClientMessage>(&value) {
            self.reject(&violation);
            return Err(violation.into());
        }
        let frame = self.codec.encode(&value)?;

        // The lock is released before sending so a transport may report
        // through its sink from inside `send`.
        let connection = {
            let state = self.state.lock();
            let status = state.status();
            match state.connection.as_ref() {
                Some(connection) if status.can_send() => Arc::clone(connection),
                _ => {
                    tracing::debug!(%status, "send refused, channel not open");
                    return Err(ChannelError::NotOpen(status));
                }
            }
        };
        connection.send(frame)?;
        Ok(())
    }

    fn reject(&self, violation: &ContractViolation) {
        tracing::warn!(%violation, "outbound message rejected");
        self.events
            .emit(&ChannelEvent::ContractViolation(violation.clone()));
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// A persistent message channel.
///
/// Cheap to clone; all clones drive the same connection. When the last
/// clone is dropped the transport is closed and any pending retry is
/// cancelled.
///
/// ```rust,no_run
/// use chairlink::prelude::*;
///
/// # async fn run() -> Result<(), ChannelError> {
/// let channel = Channel::builder(ChannelConfig::new("ws://localhost:8000/ws"))
///     .on_status_change(|status| println!("status: {status}"))
///     .build(WebSocketTransport::new())?;
///
/// channel.send(&ClientMessage::Subscribe { topic: "schedule".into() });
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Channel {
    inner: Arc<Inner>,
}

impl Channel {
    /// Starts building a channel with the given configuration.
    pub fn builder(config: ChannelConfig) -> ChannelBuilder {
        ChannelBuilder::new(config)
    }

    /// Builds a channel with no shorthand handlers.
    pub fn new(
        config: ChannelConfig,
        transport: impl Transport,
    ) -> Result<Self, ChannelError> {
        Self::builder(config).build(transport)
    }

    fn from_parts(config: ChannelConfig, transport: Arc<dyn Transport>) -> Self {
        let policy = ReconnectPolicy::from_config(&config);
        Self {
            inner: Arc::new(Inner {
                config,
                policy,
                transport,
                codec: JsonCodec,
                state: Mutex::new(ConnState::new()),
                events: EventBus::new(),
                router: MessageRouter::new(),
            }),
        }
    }

    /// Opens the transport. No-op unless the channel is `closed` or in
    /// `error`. Starts a fresh retry budget.
    pub fn connect(&self) {
        self.inner.connect();
    }

    /// Closes the transport and cancels any pending retry. No automatic
    /// reconnection happens until the next [`connect`](Self::connect).
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Sends a message. Returns `false` if the channel is not open or the
    /// message breaks the outbound contract; nothing is sent in that case.
    ///
    /// `timestamp` is filled in with the current time if absent.
    pub fn send<M: Serialize + ?Sized>(&self, message: &M) -> bool {
        self.try_send(message).is_ok()
    }

    /// Like [`send`](Self::send), but reports why a message was not sent.
    pub fn try_send<M: Serialize + ?Sized>(
        &self,
        message: &M,
    ) -> Result<(), ChannelError> {
        self.inner.try_send(message)
    }

    pub fn on(&self, kind: EventKind, handler: EventHandler) {
        self.inner.events.on(kind, handler);
    }

    pub fn off(&self, kind: EventKind, handler: &EventHandler) {
        self.inner.events.off(kind, handler);
    }

    /// Registers a handler for inbound messages of one `type`. It runs
    /// after the generic `message` handlers for the same frame.
    pub fn on_message_type(
        &self,
        message_type: impl Into<String>,
        handler: MessageHandler,
    ) {
        self.inner.router.on(message_type, handler);
    }

    pub fn off_message_type(&self, message_type: &str, handler: &MessageHandler) {
        self.inner.router.off(message_type, handler);
    }

    /// The current status, read live.
    pub fn status(&self) -> ConnectionStatus {
        self.inner.state.lock().status()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Open
    }

    /// Retries made since the last successful open.
    pub fn reconnect_attempt(&self) -> u32 {
        self.inner.state.lock().attempt
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("url", &self.inner.config.url)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ChannelBuilder
// ---------------------------------------------------------------------------

/// Builder for a [`Channel`].
///
/// The `on_*` shorthands are registered through [`Channel::on`] before the
/// channel auto-connects, so they observe the very first transition.
pub struct ChannelBuilder {
    config: ChannelConfig,
    handlers: Vec<(EventKind, EventHandler)>,
    routes: Vec<(String, MessageHandler)>,
}

impl ChannelBuilder {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            handlers: Vec::new(),
            routes: Vec::new(),
        }
    }

    pub fn on(mut self, kind: EventKind, handler: EventHandler) -> Self {
        self.handlers.push((kind, handler));
        self
    }

    pub fn on_message_type(
        mut self,
        message_type: impl Into<String>,
        handler: MessageHandler,
    ) -> Self {
        self.routes.push((message_type.into(), handler));
        self
    }

    pub fn on_open(self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on(EventKind::Open, Arc::new(move |_: &ChannelEvent| f()))
    }

    pub fn on_close(
        self,
        f: impl Fn(&CloseInfo) + Send + Sync + 'static,
    ) -> Self {
        self.on(
            EventKind::Close,
            Arc::new(move |event: &ChannelEvent| {
                if let ChannelEvent::Close(info) = event {
                    f(info);
                }
            }),
        )
    }

    pub fn on_error(
        self,
        f: impl Fn(&TransportError) + Send + Sync + 'static,
    ) -> Self {
        self.on(
            EventKind::Error,
            Arc::new(move |event: &ChannelEvent| {
                if let ChannelEvent::Error(error) = event {
                    f(error);
                }
            }),
        )
    }

    pub fn on_status_change(
        self,
        f: impl Fn(ConnectionStatus) + Send + Sync + 'static,
    ) -> Self {
        self.on(
            EventKind::StatusChange,
            Arc::new(move |event: &ChannelEvent| {
                if let ChannelEvent::StatusChange(status) = event {
                    f(*status);
                }
            }),
        )
    }

    pub fn on_reconnect(
        self,
        f: impl Fn(&ReconnectAttempt) + Send + Sync + 'static,
    ) -> Self {
        self.on(
            EventKind::Reconnect,
            Arc::new(move |event: &ChannelEvent| {
                if let ChannelEvent::Reconnect(attempt) = event {
                    f(attempt);
                }
            }),
        )
    }

    pub fn on_message(
        self,
        f: impl Fn(&InboundMessage) + Send + Sync + 'static,
    ) -> Self {
        self.on(
            EventKind::Message,
            Arc::new(move |event: &ChannelEvent| {
                if let ChannelEvent::Message(message) = event {
                    f(message);
                }
            }),
        )
    }

    pub fn on_contract_violation(
        self,
        f: impl Fn(&ContractViolation) + Send + Sync + 'static,
    ) -> Self {
        self.on(
            EventKind::ContractViolation,
            Arc::new(move |event: &ChannelEvent| {
                if let ChannelEvent::ContractViolation(violation) = event {
                    f(violation);
                }
            }),
        )
    }

    /// Validates the configuration, registers the handlers, and connects
    /// if `auto_connect` is set.
    pub fn build(
        self,
        transport: impl Transport,
    ) -> Result<Channel, ChannelError> {
        self.config.validate()?;
        let auto_connect = self.config.auto_connect;
        let channel = Channel::from_parts(self.config, Arc::new(transport));

        for (kind, handler) in self.handlers {
            channel.on(kind, handler);
        }
        for (message_type, handler) in self.routes {
            channel.on_message_type(message_type, handler);
        }

        if auto_connect {
            channel.connect();
        }
        Ok(channel)
    }
}

impl fmt::Debug for ChannelBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelBuilder")
            .field("config", &self.config)
            .field("handlers", &self.handlers.len())
            .field("routes", &self.routes.len())
            .finish()
    }
}
