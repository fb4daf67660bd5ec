//! ## netglobe-core::pipeline
//! **Per-packet path from capture to the aggregation store**
//!
//! ```text
//! TransportRecord → classify → byte ledger → geolocate → enqueue
//! ```
//!
//! The byte ledger is updated before geolocation, so bytes exchanged with
//! unresolvable peers are still accounted for.

use std::sync::Arc;

use tracing::debug;

use crate::classify::FlowClassifier;
use crate::error::{CaptureError, GeoError};
use crate::events::TransportRecord;
use crate::geo::GeoEnricher;
use crate::source::PacketSource;
use crate::store::{AggregationStore, Enqueued};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Not a data-carrying IPv4 TCP segment
    Rejected,
    /// The remote address could not be geolocated
    Unresolved,
    Enqueued(Enqueued),
}

/// Totals over a drained [`PacketSource`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub observed: u64,
    pub rejected: u64,
    pub unresolved: u64,
    pub enqueued: u64,
}

impl IngestStats {
    pub fn record(&mut self, outcome: &IngestOutcome) {
        self.observed += 1;
        match outcome {
            IngestOutcome::Rejected => self.rejected += 1,
            IngestOutcome::Unresolved => self.unresolved += 1,
            IngestOutcome::Enqueued(_) => self.enqueued += 1,
        }
    }
}

pub struct FlowPipeline {
    classifier: FlowClassifier,
    enricher: GeoEnricher,
    store: Arc<AggregationStore>,
    /// Payload size above which a debug line is logged per packet; `None`
    /// disables per-packet logging
    debug_payload_bytes: Option<usize>,
}

impl FlowPipeline {
    pub fn new(
        classifier: FlowClassifier,
        enricher: GeoEnricher,
        store: Arc<AggregationStore>,
    ) -> Self {
        Self {
            classifier,
            enricher,
            store,
            debug_payload_bytes: None,
        }
    }

    pub fn with_debug_payload_bytes(mut self, threshold: Option<usize>) -> Self {
        self.debug_payload_bytes = threshold;
        self
    }

    pub fn store(&self) -> &Arc<AggregationStore> {
        &self.store
    }

    pub fn ingest(&self, record: &TransportRecord) -> IngestOutcome {
        let Some(observation) = self.classifier.classify(record) else {
            return IngestOutcome::Rejected;
        };

        self.store.bytes_record(
            observation.remote_address,
            observation.direction,
            observation.payload_bytes,
        );

        let event = match self.enricher.enrich(&observation) {
            Ok(event) => event,
            Err(GeoError::NotFound(ip)) => {
                debug!(%ip, "No geolocation for remote address");
                return IngestOutcome::Unresolved;
            }
            Err(e) => {
                debug!(remote = %observation.remote_address, "Lookup failed: {e}");
                return IngestOutcome::Unresolved;
            }
        };

        if self
            .debug_payload_bytes
            .is_some_and(|threshold| observation.payload_bytes > threshold)
        {
            let totals = self
                .store
                .remote_bytes(&observation.remote_address)
                .unwrap_or_default();
            debug!(
                src = %record.source,
                dst = %record.destination,
                name = %event.country_name,
                direction = %observation.direction,
                payload = observation.payload_bytes,
                total = totals.total(),
                "Packet"
            );
        }

        IngestOutcome::Enqueued(self.store.enqueue(event))
    }

    /// Ingests records from `source` until it is exhausted or `keep_going`
    /// returns `false`.
    pub fn drain_source<P, K, O>(
        &self,
        source: &mut P,
        mut keep_going: K,
        mut observe: O,
    ) -> Result<IngestStats, CaptureError>
    where
        P: PacketSource + ?Sized,
        K: FnMut() -> bool,
        O: FnMut(&IngestOutcome),
    {
        let mut stats = IngestStats::default();
        while keep_going() {
            let Some(record) = source.next_record()? else {
                break;
            };
            let outcome = self.ingest(&record);
            stats.record(&outcome);
            observe(&outcome);
        }
        Ok(stats)
    }
}
