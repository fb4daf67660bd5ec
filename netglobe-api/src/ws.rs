//! Viewer socket lifecycle: register, read control messages, unregister.

use std::fmt::Display;
use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket};
use futures::{Stream, StreamExt};
use netglobe_core::subscribers::UploadSignal;
use netglobe_telemetry::EventLogger;
use opentelemetry::KeyValue;
use std::sync::Arc;
use tracing::{info, warn};

use crate::rest::AppState;
use crate::transport::SinkTransport;

/// Why a viewer's read loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadEnd {
    Closed,
    Error,
}

/// Reads inbound frames until the peer closes or errors. Text frames are
/// applied to `signal`; other frames are ignored.
pub async fn read_control<S, E>(mut stream: S, signal: &UploadSignal) -> ReadEnd
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                info!("Received: {text}");
                signal.observe(&text);
            }
            Ok(Message::Close(_)) => return ReadEnd::Closed,
            Ok(_) => {}
            Err(e) => {
                warn!("Error during message reading: {e}");
                return ReadEnd::Error;
            }
        }
    }
    ReadEnd::Closed
}

pub(crate) async fn handle_socket(socket: WebSocket, peer: SocketAddr, state: AppState) {
    let (sink, stream) = socket.split();
    let id = state
        .registry
        .register(Arc::new(SinkTransport::new(sink, peer.to_string())));
    state.metrics.live_subscribers_set(state.registry.len());

    EventLogger::log_event(
        "subscriber_connected",
        vec![
            KeyValue::new("peer", peer.to_string()),
            KeyValue::new("id", id as i64),
        ],
    )
    .await;

    let end = read_control(stream, &state.signal).await;

    state.registry.unregister(id);
    state.metrics.live_subscribers_set(state.registry.len());
    EventLogger::log_event(
        "subscriber_disconnected",
        vec![
            KeyValue::new("peer", peer.to_string()),
            KeyValue::new("reason", format!("{end:?}")),
        ],
    )
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tracing_test::traced_test;

    fn frames(items: Vec<Result<Message, String>>) -> impl Stream<Item = Result<Message, String>> + Unpin {
        stream::iter(items)
    }

    #[tokio::test]
    async fn control_messages_set_signal() {
        let signal = UploadSignal::new();
        let end = read_control(
            frames(vec![
                Ok(Message::Text("hello".into())),
                Ok(Message::Binary(vec![1, 2, 3])),
            ]),
            &signal,
        )
        .await;
        assert_eq!(end, ReadEnd::Closed);
        assert!(!signal.is_requested());

        read_control(frames(vec![Ok(Message::Text("routes_done".into()))]), &signal).await;
        assert!(signal.is_requested());
    }

    #[tokio::test]
    async fn close_frame_ends_loop_before_later_frames() {
        let signal = UploadSignal::new();
        let end = read_control(
            frames(vec![
                Ok(Message::Close(None)),
                Ok(Message::Text("start".into())),
            ]),
            &signal,
        )
        .await;
        assert_eq!(end, ReadEnd::Closed);
        assert!(!signal.is_requested());
    }

    #[tokio::test]
    #[traced_test]
    async fn read_errors_are_logged() {
        let signal = UploadSignal::new();
        let end = read_control(
            frames(vec![
                Ok(Message::Text("start".into())),
                Err("connection reset".into()),
            ]),
            &signal,
        )
        .await;
        assert_eq!(end, ReadEnd::Error);
        assert!(signal.is_requested());
        assert!(logs_contain("Error during message reading: connection reset"));
    }
}
