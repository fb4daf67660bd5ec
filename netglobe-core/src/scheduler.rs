//! ## netglobe-core::scheduler
//! **Fixed-interval batch delivery**
//!
//! Each tick optionally runs the snapshot upload, then drains the
//! aggregation store and either discards the drained events or delivers
//! them to every subscriber as one colored batch.
//!
//! ### Invariants:
//! - Events drained by a tick are never re-queued, delivered or not
//! - All events of one delivered batch share one palette color
//! - The color index only advances on delivery
//! - At most one tick runs at a time

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::events::BatchMessage;
use crate::snapshot::{SnapshotUploader, UploadOutcome};
use crate::store::{AggregationStore, DrainedWindow};
use crate::subscribers::{BroadcastReport, SubscriberRegistry};

/// Batch colors, in delivery order.
pub const PALETTE: [&str; 9] = [
    "#00E366", "#FF458B", "#FFC600", "#FFFFFF", "#0149FF", "#9B4FFF", "#00BFEA", "#FF7E2E",
    "#EBEEF1",
];

/// Color of the `index`-th delivered batch. The last palette entry is
/// never selected.
pub fn color_for(index: usize) -> &'static str {
    PALETTE[index % (PALETTE.len() - 1)]
}

/// Receiver of delivered batches.
#[async_trait]
pub trait BatchSink: Send + Sync {
    fn subscriber_count(&self) -> usize;

    async fn deliver(&self, batch: &BatchMessage) -> BroadcastReport;
}

#[async_trait]
impl BatchSink for SubscriberRegistry {
    fn subscriber_count(&self) -> usize {
        self.len()
    }

    async fn deliver(&self, batch: &BatchMessage) -> BroadcastReport {
        self.broadcast(batch).await
    }
}

/// What the batch-size threshold is compared against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchThreshold {
    /// Distinct flow keys in the drained batch
    #[default]
    DistinctFlows,
    /// Enqueues absorbed by the window, duplicates included
    WindowObservations,
}

impl BatchThreshold {
    fn measure(&self, window: &DrainedWindow) -> u64 {
        match self {
            BatchThreshold::DistinctFlows => window.events.len() as u64,
            BatchThreshold::WindowObservations => window.observations,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Broadcasting,
}

/// What a tick did with the drained events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Too few events or nobody listening; the events are gone.
    Discarded { events: usize, subscribers: usize },
    Delivered {
        events: usize,
        color: &'static str,
        report: BroadcastReport,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickReport {
    pub upload: Option<UploadOutcome>,
    pub outcome: TickOutcome,
}

pub struct BroadcastScheduler<S: BatchSink + ?Sized> {
    store: Arc<AggregationStore>,
    sink: Arc<S>,
    uploader: Option<SnapshotUploader>,
    batch_size: usize,
    threshold: BatchThreshold,
    color_index: usize,
    state: SchedulerState,
}

impl<S: BatchSink + ?Sized> BroadcastScheduler<S> {
    pub fn new(store: Arc<AggregationStore>, sink: Arc<S>, batch_size: usize) -> Self {
        Self {
            store,
            sink,
            uploader: None,
            batch_size,
            threshold: BatchThreshold::default(),
            color_index: 0,
            state: SchedulerState::Idle,
        }
    }

    /// Runs `uploader` at the start of every tick.
    pub fn with_uploader(mut self, uploader: SnapshotUploader) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn with_threshold(mut self, threshold: BatchThreshold) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn color_index(&self) -> usize {
        self.color_index
    }

    pub async fn tick(&mut self) -> TickReport {
        self.state = SchedulerState::Broadcasting;

        let upload = match &self.uploader {
            Some(uploader) => Some(uploader.upload().await),
            None => None,
        };

        let window = self.store.drain_window();
        let subscribers = self.sink.subscriber_count();
        let measured = self.threshold.measure(&window);
        let events = window.events;

        let outcome = if measured < self.batch_size as u64 || subscribers == 0 {
            debug!(
                events = events.len(),
                subscribers, "Skipping sending, batch too small or no subscribers"
            );
            TickOutcome::Discarded {
                events: events.len(),
                subscribers,
            }
        } else {
            let color = color_for(self.color_index);
            let mut batch = BatchMessage { messages: events };
            for event in &mut batch.messages {
                event.color = color.to_owned();
            }

            info!(
                events = batch.len(),
                subscribers, color, "Sending batch"
            );
            let report = self.sink.deliver(&batch).await;
            self.color_index += 1;

            TickOutcome::Delivered {
                events: batch.len(),
                color,
                report,
            }
        };

        self.state = SchedulerState::Idle;
        TickReport { upload, outcome }
    }

    /// Ticks every `period` until `shutdown` resolves. The first tick fires
    /// one period after start. `on_tick` observes every report.
    pub async fn run<F, R>(&mut self, period: Duration, shutdown: F, mut on_tick: R)
    where
        F: Future<Output = ()>,
        R: FnMut(&TickReport),
    {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!("Broadcast scheduler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    on_tick(&report);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Coordinate, Direction, FlowEvent};
    use crate::snapshot::tests::{settings, MemoryStore};
    use crate::subscribers::UploadSignal;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct SpySink {
        subscribers: usize,
        delivered: Mutex<Vec<BatchMessage>>,
    }

    #[async_trait]
    impl BatchSink for SpySink {
        fn subscriber_count(&self) -> usize {
            self.subscribers
        }

        async fn deliver(&self, batch: &BatchMessage) -> BroadcastReport {
            self.delivered.lock().push(batch.clone());
            BroadcastReport {
                delivered: self.subscribers,
                pruned: Vec::new(),
            }
        }
    }

    fn fill(store: &AggregationStore, distinct: usize) {
        for peer in 0..distinct {
            store.enqueue(FlowEvent::new(
                Coordinate::new(39.78, -104.97),
                Coordinate::new(peer as f64, peer as f64),
                Direction::Upload,
                "Testland".into(),
            ));
        }
    }

    fn scheduler(subscribers: usize, batch_size: usize) -> (BroadcastScheduler<SpySink>, Arc<AggregationStore>, Arc<SpySink>) {
        let store = Arc::new(AggregationStore::new());
        let sink = Arc::new(SpySink {
            subscribers,
            ..Default::default()
        });
        (
            BroadcastScheduler::new(store.clone(), sink.clone(), batch_size),
            store,
            sink,
        )
    }

    #[test]
    fn palette_wraps_before_last_entry() {
        assert_eq!(color_for(0), "#00E366");
        assert_eq!(color_for(7), "#FF7E2E");
        assert_eq!(color_for(8), "#00E366");
        assert!((0..100).all(|i| color_for(i) != "#EBEEF1"));
    }

    #[tokio::test]
    async fn small_batch_is_discarded() {
        let (mut scheduler, store, sink) = scheduler(1, 5);
        fill(&store, 4);

        let report = scheduler.tick().await;
        assert_eq!(
            report.outcome,
            TickOutcome::Discarded {
                events: 4,
                subscribers: 1
            }
        );
        assert!(sink.delivered.lock().is_empty());
        assert_eq!(store.pending_len(), 0);
        assert_eq!(scheduler.color_index(), 0);
    }

    #[tokio::test]
    async fn batch_without_subscribers_is_discarded() {
        let (mut scheduler, store, sink) = scheduler(0, 1);
        fill(&store, 3);

        assert!(matches!(
            scheduler.tick().await.outcome,
            TickOutcome::Discarded { events: 3, subscribers: 0 }
        ));
        assert!(sink.delivered.lock().is_empty());
    }

    #[tokio::test]
    async fn window_threshold_counts_duplicates() {
        let (scheduler, store, sink) = scheduler(1, 5);
        let mut scheduler = scheduler.with_threshold(BatchThreshold::WindowObservations);
        fill(&store, 2);
        fill(&store, 2);
        fill(&store, 1);

        assert!(matches!(
            scheduler.tick().await.outcome,
            TickOutcome::Delivered { events: 2, .. }
        ));
        assert_eq!(sink.delivered.lock().len(), 1);
    }

    #[tokio::test]
    async fn delivered_batch_shares_one_color() {
        let (mut scheduler, store, sink) = scheduler(2, 5);
        fill(&store, 6);

        let report = scheduler.tick().await;
        assert!(matches!(
            report.outcome,
            TickOutcome::Delivered { events: 6, color: "#00E366", .. }
        ));
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        fill(&store, 5);
        scheduler.tick().await;

        let delivered = sink.delivered.lock();
        assert_eq!(delivered.len(), 2);
        assert!(delivered[0].messages.iter().all(|e| e.color == "#00E366"));
        assert!(delivered[1].messages.iter().all(|e| e.color == "#FF458B"));
    }

    #[tokio::test]
    async fn tick_uploads_before_draining() {
        let (scheduler, store, _sink) = scheduler(1, 1);
        let objects = Arc::new(MemoryStore::default());
        let mut scheduler = scheduler.with_uploader(SnapshotUploader::new(
            objects.clone(),
            settings(false),
            Arc::new(UploadSignal::new()),
        ));
        fill(&store, 1);

        let report = scheduler.tick().await;
        assert_eq!(report.upload, Some(UploadOutcome::Completed { bytes: 8024 }));
        assert!(matches!(report.outcome, TickOutcome::Delivered { .. }));
        assert_eq!(objects.objects.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_ticks_until_shutdown() {
        let (mut scheduler, store, sink) = scheduler(1, 1);
        fill(&store, 2);

        let mut ticks = 0;
        scheduler
            .run(
                Duration::from_secs(6),
                tokio::time::sleep(Duration::from_secs(20)),
                |_| ticks += 1,
            )
            .await;

        assert_eq!(ticks, 3);
        assert_eq!(sink.delivered.lock().len(), 1);
    }
}
