//! ## netglobe-core::subscribers
//! **Live viewer registry with concurrent, deadline-bounded fan-out**
//!
//! Every registered [`PushTransport`] receives each delivered batch as one
//! text message. Sends run concurrently, each under its own deadline, and a
//! transport whose send fails or times out is dropped from the registry and
//! closed under the same deadline. The registry lock is never held while a
//! send or close is in flight.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::events::BatchMessage;

pub type SubscriberId = u64;

/// Outbound half of a viewer connection.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Sends one UTF-8 text message.
    async fn send_text(&self, text: &str) -> Result<(), TransportError>;

    /// Closes the connection. Errors are ignored.
    async fn close(&self) {}

    /// Human readable peer description for logs.
    fn peer(&self) -> String {
        "unknown".into()
    }
}

/// Control messages a viewer may send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlMessage {
    Start,
    RoutesDone,
}

impl ControlMessage {
    /// Recognises the literal control strings; anything else is `None`.
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "start" => Some(Self::Start),
            "routes_done" => Some(Self::RoutesDone),
            _ => None,
        }
    }
}

/// Set by viewers via control messages, cleared after an upload attempt.
#[derive(Debug, Default)]
pub struct UploadSignal {
    requested: AtomicBool,
}

impl UploadSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a control message text; returns the recognised message.
    pub fn observe(&self, text: &str) -> Option<ControlMessage> {
        let message = ControlMessage::parse(text)?;
        self.requested.store(true, Ordering::Release);
        Some(message)
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    pub fn clear(&self) {
        self.requested.store(false, Ordering::Release);
    }
}

/// Outcome of one fan-out.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub pruned: Vec<SubscriberId>,
}

struct Subscriber {
    id: SubscriberId,
    transport: Arc<dyn PushTransport>,
}

/// Set of live viewer connections.
pub struct SubscriberRegistry {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
    send_timeout: Duration,
}

impl SubscriberRegistry {
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            send_timeout,
        }
    }

    pub fn register(&self, transport: Arc<dyn PushTransport>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(id, peer = %transport.peer(), "Subscriber registered");
        self.subscribers.lock().push(Subscriber { id, transport });
        id
    }

    /// Removes a subscriber whose connection ended. Returns `false` if it
    /// was already gone.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        before != subscribers.len()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.lock().iter().any(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sends `batch` to every subscriber as one JSON message and prunes the
    /// ones that failed.
    pub async fn broadcast(&self, batch: &BatchMessage) -> BroadcastReport {
        let text = match serde_json::to_string(batch) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode batch: {e}");
                return BroadcastReport::default();
            }
        };

        let targets: Vec<(SubscriberId, Arc<dyn PushTransport>)> = self
            .subscribers
            .lock()
            .iter()
            .map(|s| (s.id, s.transport.clone()))
            .collect();

        let deadline = self.send_timeout;
        let sends = targets.iter().map(|(id, transport)| {
            let text = text.as_str();
            async move {
                let result = match tokio::time::timeout(deadline, transport.send_text(text)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::Timeout(deadline)),
                };
                (*id, result)
            }
        });

        let mut report = BroadcastReport::default();
        for (id, result) in join_all(sends).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(id, "Error during message writing: {e}");
                    report.pruned.push(id);
                }
            }
        }

        if !report.pruned.is_empty() {
            self.subscribers
                .lock()
                .retain(|s| !report.pruned.contains(&s.id));

            let closes = targets
                .iter()
                .filter(|(id, _)| report.pruned.contains(id))
                .map(|(id, transport)| async move {
                    if tokio::time::timeout(deadline, transport.close()).await.is_err() {
                        debug!(id, "Close timed out");
                    }
                });
            join_all(closes).await;
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Coordinate, Direction, FlowEvent};

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<String>>,
        fail: bool,
        stall: bool,
        stall_close: bool,
        closed: AtomicBool,
    }

    #[async_trait]
    impl PushTransport for RecordingTransport {
        async fn send_text(&self, text: &str) -> Result<(), TransportError> {
            if self.stall {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.fail {
                return Err(TransportError::Closed);
            }
            self.sent.lock().push(text.to_owned());
            Ok(())
        }

        async fn close(&self) {
            if self.stall_close {
                std::future::pending::<()>().await;
            }
            self.closed.store(true, Ordering::Release);
        }
    }

    fn batch() -> BatchMessage {
        BatchMessage {
            messages: vec![FlowEvent::new(
                Coordinate::new(1.0, 2.0),
                Coordinate::new(3.0, 4.0),
                Direction::Upload,
                "France".into(),
            )],
        }
    }

    #[test]
    fn control_messages_are_recognised() {
        assert_eq!(ControlMessage::parse("start"), Some(ControlMessage::Start));
        assert_eq!(
            ControlMessage::parse("routes_done"),
            Some(ControlMessage::RoutesDone)
        );
        assert_eq!(ControlMessage::parse("START"), None);
        assert_eq!(ControlMessage::parse("hello"), None);
    }

    #[test]
    fn upload_signal_tracks_control_messages() {
        let signal = UploadSignal::new();
        assert!(signal.observe("ping").is_none());
        assert!(!signal.is_requested());
        assert_eq!(signal.observe("routes_done"), Some(ControlMessage::RoutesDone));
        assert!(signal.is_requested());
        signal.clear();
        assert!(!signal.is_requested());
    }

    #[tokio::test]
    async fn every_subscriber_gets_one_message() {
        let registry = SubscriberRegistry::new(Duration::from_secs(1));
        let a = Arc::new(RecordingTransport::default());
        let b = Arc::new(RecordingTransport::default());
        registry.register(a.clone());
        registry.register(b.clone());

        let report = registry.broadcast(&batch()).await;
        assert_eq!(report.delivered, 2);
        assert!(report.pruned.is_empty());

        let sent = a.sent.lock().clone();
        assert_eq!(sent.len(), 1);
        let decoded: BatchMessage = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(decoded, batch());
        assert_eq!(b.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn failed_transport_is_pruned_and_closed() {
        let registry = SubscriberRegistry::new(Duration::from_secs(1));
        let healthy = Arc::new(RecordingTransport::default());
        let broken = Arc::new(RecordingTransport {
            fail: true,
            ..Default::default()
        });
        let healthy_id = registry.register(healthy.clone());
        let broken_id = registry.register(broken.clone());

        let report = registry.broadcast(&batch()).await;
        assert_eq!(report.pruned, vec![broken_id]);
        assert!(!registry.contains(broken_id));
        assert!(registry.contains(healthy_id));
        assert_eq!(registry.len(), 1);
        assert!(broken.closed.load(Ordering::Acquire));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_transport_does_not_block_others() {
        let registry = SubscriberRegistry::new(Duration::from_millis(50));
        let healthy = Arc::new(RecordingTransport::default());
        let stalled = Arc::new(RecordingTransport {
            stall: true,
            ..Default::default()
        });
        registry.register(healthy.clone());
        let stalled_id = registry.register(stalled);

        let report = registry.broadcast(&batch()).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.pruned, vec![stalled_id]);
        assert_eq!(healthy.sent.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_close_does_not_block_broadcast() {
        let registry = SubscriberRegistry::new(Duration::from_millis(50));
        let healthy = Arc::new(RecordingTransport::default());
        let wedged = Arc::new(RecordingTransport {
            stall: true,
            stall_close: true,
            ..Default::default()
        });
        registry.register(healthy.clone());
        let wedged_id = registry.register(wedged.clone());

        let report = tokio::time::timeout(Duration::from_secs(1), registry.broadcast(&batch()))
            .await
            .expect("broadcast bounded by send deadline");
        assert_eq!(report.delivered, 1);
        assert_eq!(report.pruned, vec![wedged_id]);
        assert!(!registry.contains(wedged_id));
        assert!(!wedged.closed.load(Ordering::Acquire));

        // The next broadcast only reaches the remaining viewer.
        let report = registry.broadcast(&batch()).await;
        assert_eq!(report.delivered, 1);
        assert!(report.pruned.is_empty());
        assert_eq!(healthy.sent.lock().len(), 2);
    }

    #[test]
    fn unregister_removes_once() {
        let registry = SubscriberRegistry::new(Duration::from_secs(1));
        let id = registry.register(Arc::new(RecordingTransport::default()));
        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert!(registry.is_empty());
    }
}
