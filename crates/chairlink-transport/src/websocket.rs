//! WebSocket client transport using `tokio-tungstenite`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::{
    CloseInfo, Connection, ConnectionId, EventSink, Transport, TransportError,
};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// How long a local close waits for the peer's close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Commands from a [`WebSocketConnection`] handle to its socket task.
enum Outbound {
    Frame(String),
    Close,
}

/// A [`Transport`] that dials WebSocket endpoints (`ws://` or `wss://`).
///
/// Every opened connection is driven by its own Tokio task, so `open` must
/// be called from within a runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for WebSocketTransport {
    fn open(
        &self,
        url: &str,
        sink: EventSink,
    ) -> Result<Box<dyn Connection>, TransportError> {
        let endpoint = parse_endpoint(url)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| TransportError::NoRuntime)?;

        let id = ConnectionId::new(
            NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        tracing::debug!(%id, url, "opening WebSocket connection");
        runtime.spawn(run_connection(id, endpoint, sink, rx));

        Ok(Box::new(WebSocketConnection { id, outbound: tx }))
    }
}

/// Handle to a WebSocket connection driven by a background task.
///
/// Dropping the handle closes the socket.
pub struct WebSocketConnection {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Connection for WebSocketConnection {
    fn send(&self, frame: String) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Frame(frame))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn close(&self) {
        // The task may already be gone, in which case `Closed` was reported.
        let _ = self.outbound.send(Outbound::Close);
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

fn parse_endpoint(url: &str) -> Result<url::Url, TransportError> {
    let parsed =
        url::Url::parse(url).map_err(|e| TransportError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(parsed),
        other => Err(TransportError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme `{other}`, expected ws or wss"),
        }),
    }
}

async fn run_connection(
    id: ConnectionId,
    endpoint: url::Url,
    sink: EventSink,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    // Frames queued before the handshake completes are flushed once open.
    let mut pending = Vec::new();
    let connect = tokio_tungstenite::connect_async(endpoint.as_str());
    tokio::pin!(connect);

    let ws = loop {
        tokio::select! {
            result = &mut connect => match result {
                Ok((ws, _response)) => break ws,
                Err(e) => {
                    tracing::debug!(%id, error = %e, "WebSocket connect failed");
                    sink.error(TransportError::ConnectFailed(e.to_string()));
                    sink.closed(CloseInfo::abnormal("connect failed"));
                    return;
                }
            },
            command = outbound.recv() => match command {
                Some(Outbound::Frame(text)) => pending.push(text),
                Some(Outbound::Close) | None => {
                    tracing::debug!(%id, "WebSocket connect aborted");
                    sink.closed(CloseInfo::new(CloseInfo::NORMAL, "closed locally"));
                    return;
                }
            },
        }
    };

    tracing::debug!(%id, "WebSocket connection open");
    sink.opened();

    let (mut write, mut read) = ws.split();
    for text in pending {
        if let Err(e) = write.send(Message::Text(text.into())).await {
            sink.error(TransportError::SendFailed(e.to_string()));
            sink.closed(CloseInfo::abnormal("send failed"));
            return;
        }
    }

    let mut closing = false;
    let close_deadline = tokio::time::sleep(CLOSE_TIMEOUT);
    tokio::pin!(close_deadline);

    let info = loop {
        tokio::select! {
            command = outbound.recv(), if !closing => match command {
                Some(Outbound::Frame(text)) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        sink.error(TransportError::SendFailed(e.to_string()));
                        break CloseInfo::abnormal("send failed");
                    }
                }
                // Handle dropped or close requested: start the close
                // handshake and keep reading until the peer answers.
                Some(Outbound::Close) | None => {
                    closing = true;
                    close_deadline
                        .as_mut()
                        .reset(tokio::time::Instant::now() + CLOSE_TIMEOUT);
                    if write.send(Message::Close(None)).await.is_err() {
                        break CloseInfo::new(CloseInfo::NORMAL, "closed locally");
                    }
                }
            },
            () = &mut close_deadline, if closing => {
                tracing::debug!(%id, "peer did not answer close, dropping socket");
                break CloseInfo::new(CloseInfo::NORMAL, "closed locally");
            }
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => sink.message(text.as_str()),
                Some(Ok(Message::Binary(data))) => {
                    match String::from_utf8(data.to_vec()) {
                        Ok(text) => sink.message(text),
                        Err(_) => {
                            tracing::debug!(%id, "skipping non UTF-8 binary frame");
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    break match frame {
                        Some(frame) => CloseInfo::new(
                            u16::from(frame.code),
                            frame.reason.as_str(),
                        ),
                        None => CloseInfo::default(),
                    };
                }
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(e)) => {
                    sink.error(TransportError::ReceiveFailed(e.to_string()));
                    break CloseInfo::abnormal(e.to_string());
                }
                None => break CloseInfo::abnormal("stream ended"),
            },
        }
    };

    let _ = tokio::time::timeout(CLOSE_TIMEOUT, write.close()).await;
    tracing::debug!(%id, close = %info, "WebSocket connection closed");
    sink.closed(info);
}
