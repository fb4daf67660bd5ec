//! [`PushTransport`] over the outbound half of a socket.

use async_trait::async_trait;
use axum::extract::ws::Message;
use futures::{Sink, SinkExt};
use netglobe_core::error::TransportError;
use netglobe_core::subscribers::PushTransport;
use std::fmt::Display;
use tokio::sync::Mutex;

/// Serializes sends on one sink; the registry may call in concurrently with
/// a close.
pub struct SinkTransport<S> {
    sink: Mutex<S>,
    peer: String,
}

impl<S> SinkTransport<S> {
    pub fn new(sink: S, peer: impl Into<String>) -> Self {
        Self {
            sink: Mutex::new(sink),
            peer: peer.into(),
        }
    }
}

#[async_trait]
impl<S> PushTransport for SinkTransport<S>
where
    S: Sink<Message> + Unpin + Send,
    S::Error: Display,
{
    async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.sink
            .lock()
            .await
            .send(Message::Text(text.to_owned()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&self) {
        let _ = self.sink.lock().await.close().await;
    }

    fn peer(&self) -> String {
        self.peer.clone()
    }
}
