//! Shared test helpers: a scripted in-memory transport and an event log.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chairlink::prelude::*;
use chairlink::transport::{Connection, ConnectionId, EventSink};

pub const URL: &str = "ws://mock.test/ws";

pub const TS: &str = "2024-05-01T09:30:00.000Z";

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Config with the mock endpoint and everything else at defaults.
pub fn config() -> ChannelConfig {
    ChannelConfig::new(URL)
}

// =========================================================================
// MockTransport
// =========================================================================

/// One call to `Transport::open`.
struct OpenCall {
    url: String,
    sink: EventSink,
    /// `None` if the open failed synchronously.
    connection: Option<MockHandle>,
}

#[derive(Clone)]
struct MockHandle {
    sent: Arc<Mutex<Vec<String>>>,
    close_requested: Arc<AtomicBool>,
    /// When set, `send` reports this through the sink before failing.
    send_failure: Arc<Mutex<Option<TransportError>>>,
}

#[derive(Default)]
struct Shared {
    calls: Vec<OpenCall>,
    fail_with: Option<TransportError>,
}

/// A transport driven entirely by the test.
///
/// Opening never completes on its own: the test decides when the
/// connection is accepted, when frames arrive, and when it drops.
#[derive(Clone, Default)]
pub struct MockTransport {
    shared: Arc<Mutex<Shared>>,
}

struct MockConnection {
    id: ConnectionId,
    handle: MockHandle,
    sink: EventSink,
}

impl Connection for MockConnection {
    fn send(&self, frame: String) -> Result<(), TransportError> {
        let failure = self.handle.send_failure.lock().unwrap().clone();
        if let Some(error) = failure {
            self.sink.error(error.clone());
            return Err(error);
        }
        self.handle.sent.lock().unwrap().push(frame);
        Ok(())
    }

    fn close(&self) {
        self.handle.close_requested.store(true, Ordering::SeqCst);
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Transport for MockTransport {
    fn open(
        &self,
        url: &str,
        sink: EventSink,
    ) -> Result<Box<dyn Connection>, TransportError> {
        let mut shared = self.shared.lock().unwrap();
        if let Some(error) = shared.fail_with.clone() {
            shared.calls.push(OpenCall {
                url: url.to_string(),
                sink,
                connection: None,
            });
            return Err(error);
        }

        let handle = MockHandle {
            sent: Arc::new(Mutex::new(Vec::new())),
            close_requested: Arc::new(AtomicBool::new(false)),
            send_failure: Arc::new(Mutex::new(None)),
        };
        shared.calls.push(OpenCall {
            url: url.to_string(),
            sink: sink.clone(),
            connection: Some(handle.clone()),
        });
        Ok(Box::new(MockConnection {
            id: ConnectionId::new(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
            handle,
            sink,
        }))
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `open` fail synchronously with `error`.
    pub fn fail_opens_with(&self, error: TransportError) {
        self.shared.lock().unwrap().fail_with = Some(error);
    }

    pub fn stop_failing(&self) {
        self.shared.lock().unwrap().fail_with = None;
    }

    /// How many times `open` was called, failed calls included.
    pub fn open_count(&self) -> usize {
        self.shared.lock().unwrap().calls.len()
    }

    pub fn last_url(&self) -> Option<String> {
        self.shared.lock().unwrap().calls.last().map(|c| c.url.clone())
    }

    fn sink(&self, index: usize) -> EventSink {
        // Cloned out so the channel can call back into `open` while the
        // signal is being handled.
        self.shared.lock().unwrap().calls[index].sink.clone()
    }

    fn last_sink(&self) -> EventSink {
        let shared = self.shared.lock().unwrap();
        shared.calls.last().expect("no open call recorded").sink.clone()
    }

    fn last_handle(&self) -> MockHandle {
        let shared = self.shared.lock().unwrap();
        shared
            .calls
            .last()
            .and_then(|c| c.connection.clone())
            .expect("no live connection recorded")
    }

    /// Completes the most recent open.
    pub fn accept(&self) {
        self.last_sink().opened();
    }

    /// Delivers a text frame on the most recent connection.
    pub fn deliver(&self, frame: impl Into<String>) {
        self.last_sink().message(frame);
    }

    /// Reports a transport fault on the most recent connection.
    pub fn fault(&self, error: TransportError) {
        self.last_sink().error(error);
    }

    /// Drops the most recent connection without a close frame.
    pub fn drop_connection(&self) {
        self.last_sink().closed(CloseInfo::abnormal("network lost"));
    }

    /// Finishes a requested close on the most recent connection.
    pub fn confirm_close(&self) {
        self.last_sink()
            .closed(CloseInfo::new(CloseInfo::NORMAL, "bye"));
    }

    /// Replays a signal through the sink of an earlier open.
    pub fn accept_call(&self, index: usize) {
        self.sink(index).opened();
    }

    pub fn drop_call(&self, index: usize) {
        self.sink(index).closed(CloseInfo::abnormal("network lost"));
    }

    /// Makes sends on the most recent connection report `error` through
    /// the sink from inside `send`, then fail.
    pub fn fail_sends_with(&self, error: TransportError) {
        *self.last_handle().send_failure.lock().unwrap() = Some(error);
    }

    /// Frames sent on the most recent connection.
    pub fn sent(&self) -> Vec<String> {
        self.last_handle().sent.lock().unwrap().clone()
    }

    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent()
            .iter()
            .map(|frame| serde_json::from_str(frame).unwrap())
            .collect()
    }

    /// Whether the channel asked the most recent connection to close.
    pub fn close_requested(&self) -> bool {
        self.last_handle().close_requested.load(Ordering::SeqCst)
    }
}

// =========================================================================
// EventLog
// =========================================================================

/// Records every event a channel emits, in order.
#[derive(Clone)]
pub struct EventLog {
    events: Arc<Mutex<Vec<ChannelEvent>>>,
    handler: EventHandler,
}

impl EventLog {
    pub fn new() -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);
        let handler: EventHandler = Arc::new(move |event: &ChannelEvent| {
            events_clone.lock().unwrap().push(event.clone());
        });
        Self { events, handler }
    }

    /// Subscribes to every kind on a builder, so the log sees the
    /// transitions made by auto-connect.
    pub fn register(&self, mut builder: ChannelBuilder) -> ChannelBuilder {
        for kind in EventKind::ALL {
            builder = builder.on(kind, Arc::clone(&self.handler));
        }
        builder
    }

    pub fn attach(&self, channel: &Channel) {
        for kind in EventKind::ALL {
            channel.on(kind, Arc::clone(&self.handler));
        }
    }

    pub fn events(&self) -> Vec<ChannelEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(ChannelEvent::kind).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events().iter().filter(|e| e.kind() == kind).count()
    }

    pub fn statuses(&self) -> Vec<ConnectionStatus> {
        self.events()
            .iter()
            .filter_map(|event| match event {
                ChannelEvent::StatusChange(status) => Some(*status),
                _ => None,
            })
            .collect()
    }

    pub fn reconnects(&self) -> Vec<ReconnectAttempt> {
        self.events()
            .iter()
            .filter_map(|event| match event {
                ChannelEvent::Reconnect(attempt) => Some(*attempt),
                _ => None,
            })
            .collect()
    }

    pub fn violations(&self) -> Vec<ContractViolation> {
        self.events()
            .iter()
            .filter_map(|event| match event {
                ChannelEvent::ContractViolation(v) => Some(v.clone()),
                _ => None,
            })
            .collect()
    }
}

/// A fresh channel plus its transport and log. Not auto-connected.
pub fn idle_channel(config: ChannelConfig) -> (Channel, MockTransport, EventLog) {
    let transport = MockTransport::new();
    let log = EventLog::new();
    let channel = log
        .register(Channel::builder(config.with_auto_connect(false)))
        .build(transport.clone())
        .unwrap();
    (channel, transport, log)
}

/// A channel that auto-connected and whose first open was accepted.
pub fn open_channel(config: ChannelConfig) -> (Channel, MockTransport, EventLog) {
    let transport = MockTransport::new();
    let log = EventLog::new();
    let channel = log
        .register(Channel::builder(config))
        .build(transport.clone())
        .unwrap();
    transport.accept();
    assert_eq!(channel.status(), ConnectionStatus::Open);
    (channel, transport, log)
}

/// A server frame with a fixed timestamp.
pub fn frame(body: serde_json::Value) -> String {
    let mut body = body;
    body["timestamp"] = serde_json::Value::String(TS.to_string());
    body.to_string()
}
