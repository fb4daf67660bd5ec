//! ## netglobe-telemetry::metrics
//! **Prometheus exporter with histograms**
//!
//! ### Expectations:
//! - Every per-record and per-tick outcome maps to exactly one counter
//! - Recording never fails once the recorder is built

use netglobe_core::pipeline::IngestOutcome;
use netglobe_core::scheduler::{TickOutcome, TickReport};
use netglobe_core::snapshot::UploadOutcome;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};

use crate::TelemetryError;

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: prometheus::Registry,
    pub records_observed: IntCounter,
    pub records_rejected: IntCounter,
    pub lookup_failures: IntCounter,
    pub flows_enqueued: IntCounter,
    pub batches_delivered: IntCounter,
    pub batches_discarded: IntCounter,
    pub subscribers_pruned: IntCounter,
    pub live_subscribers: IntGauge,
    pub uploads_completed: IntCounter,
    pub upload_failures: IntCounter,
    pub batch_size: Histogram,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, TelemetryError> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let c = IntCounter::new(name, help)?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        let records_observed = counter("netglobe_records_total", "Decoded packets handed to the pipeline")?;
        let records_rejected = counter(
            "netglobe_records_rejected_total",
            "Records that were not data-carrying IPv4 TCP segments",
        )?;
        let lookup_failures = counter(
            "netglobe_lookup_failures_total",
            "Remote addresses missing from the geolocation database",
        )?;
        let flows_enqueued = counter("netglobe_flows_enqueued_total", "Flow events enqueued")?;
        let batches_delivered = counter("netglobe_batches_delivered_total", "Batches sent to viewers")?;
        let batches_discarded = counter(
            "netglobe_batches_discarded_total",
            "Ticks whose drained events were dropped",
        )?;
        let subscribers_pruned = counter(
            "netglobe_subscribers_pruned_total",
            "Viewers removed after a failed send",
        )?;
        let uploads_completed = counter("netglobe_uploads_total", "Snapshot uploads committed")?;
        let upload_failures = counter("netglobe_upload_failures_total", "Snapshot uploads that failed")?;

        let live_subscribers = IntGauge::new("netglobe_live_subscribers", "Connected viewers")?;
        registry.register(Box::new(live_subscribers.clone()))?;

        let batch_size = Histogram::with_opts(
            HistogramOpts::new("netglobe_batch_size", "Events per delivered batch")
                .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 1000.0]),
        )?;
        registry.register(Box::new(batch_size.clone()))?;

        Ok(Self {
            registry,
            records_observed,
            records_rejected,
            lookup_failures,
            flows_enqueued,
            batches_delivered,
            batches_discarded,
            subscribers_pruned,
            live_subscribers,
            uploads_completed,
            upload_failures,
            batch_size,
        })
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn ingest_record(&self, outcome: &IngestOutcome) {
        self.records_observed.inc();
        match outcome {
            IngestOutcome::Rejected => self.records_rejected.inc(),
            IngestOutcome::Unresolved => self.lookup_failures.inc(),
            IngestOutcome::Enqueued(_) => self.flows_enqueued.inc(),
        }
    }

    pub fn tick_record(&self, report: &TickReport) {
        match report.upload {
            Some(UploadOutcome::Completed { .. }) => self.uploads_completed.inc(),
            Some(UploadOutcome::Failed(_)) => self.upload_failures.inc(),
            Some(UploadOutcome::Skipped) | None => {}
        }

        match &report.outcome {
            TickOutcome::Discarded { .. } => self.batches_discarded.inc(),
            TickOutcome::Delivered { events, report, .. } => {
                self.batches_delivered.inc();
                self.batch_size.observe(*events as f64);
                self.subscribers_pruned.inc_by(report.pruned.len() as u64);
            }
        }
    }

    pub fn live_subscribers_set(&self, count: usize) {
        self.live_subscribers.set(count as i64);
    }
}
