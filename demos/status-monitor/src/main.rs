//! Connects to a practice server and logs what happens on the channel.
//!
//! ```text
//! CHAIRLINK_URL=ws://localhost:8000/ws RUST_LOG=info,chairlink=debug \
//!     cargo run -p status-monitor -- schedule patient:1234
//! ```
//!
//! Every argument is a topic to subscribe to once the channel opens.
//! Ctrl-C disconnects cleanly.

use std::time::Duration;

use chairlink::prelude::*;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const PING_INTERVAL: Duration = Duration::from_secs(25);

fn subscriptions(args: impl IntoIterator<Item = String>) -> Vec<ClientMessage> {
    args.into_iter()
        .map(|topic| topic.trim().to_string())
        .filter(|topic| !topic.is_empty())
        .map(|topic| ClientMessage::Subscribe { topic })
        .collect()
}

fn describe(message: &InboundMessage) -> String {
    match &message.body {
        ServerMessage::Connected { client_id } => format!("connected as {client_id}"),
        ServerMessage::Subscribed { topic } => format!("subscribed to {topic}"),
        ServerMessage::Notification { title, body, level } => {
            let level = level.as_deref().unwrap_or("info");
            format!("[{level}] {title}: {body}")
        }
        ServerMessage::DiagnosisReady { patient_id, diagnosis_id } => {
            format!("diagnosis {diagnosis_id} ready for patient {patient_id}")
        }
        ServerMessage::AssistantResponse { content, done, .. } => {
            format!("assistant{}: {content}", if *done { "" } else { " (partial)" })
        }
        ServerMessage::Error { code, message } => format!("server error {code}: {message}"),
        ServerMessage::Ping | ServerMessage::Pong => message.message_type().to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ChannelConfig::default();
    let topics = subscriptions(std::env::args().skip(1));
    tracing::info!(url = %config.url, topics = topics.len(), "starting status monitor");

    // Handlers run on the transport's task; forward what the loop below
    // needs to act on.
    let (opened_tx, mut opened_rx) = mpsc::unbounded_channel();
    let channel = Channel::builder(config)
        .on_status_change(|status| tracing::info!(%status, "status"))
        .on_open(move || {
            let _ = opened_tx.send(());
        })
        .on_close(|info| tracing::info!(close = %info, "closed"))
        .on_error(|error| tracing::warn!(%error, "transport error"))
        .on_reconnect(|r| {
            tracing::info!(
                attempt = r.attempt,
                max = r.max_attempts,
                delay_ms = r.delay.as_millis() as u64,
                "reconnecting"
            );
        })
        .on_message(|message| tracing::info!("{}", describe(message)))
        .on_contract_violation(|v| tracing::warn!(violation = %v, "dropped"))
        .on(
            EventKind::ReconnectFailed,
            std::sync::Arc::new(|_: &ChannelEvent| {
                tracing::error!("giving up, server unreachable");
            }),
        )
        .build(WebSocketTransport::new())?;

    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.tick().await;

    loop {
        tokio::select! {
            Some(()) = opened_rx.recv() => {
                for subscribe in &topics {
                    channel.send(subscribe);
                }
            }
            _ = ping.tick() => {
                if channel.is_connected() {
                    channel.send(&ClientMessage::Ping);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                channel.disconnect();
                break;
            }
        }
    }

    // Give the close handshake a moment to finish.
    tokio::time::sleep(Duration::from_millis(200)).await;
    Ok(())
}
