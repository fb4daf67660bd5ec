/*!
# Runtime Engine

Wires capture, geolocation, aggregation, the broadcast scheduler and the
viewer server into one running process.

Three tasks share one [`CancellationToken`]:
- the capture loop, on a blocking thread, feeding the aggregation store
- the broadcast scheduler, draining the store once per interval
- the HTTP server holding viewer sockets

The process lives as long as the capture loop. When the source is exhausted
or fails, or the token is cancelled, every task is stopped and awaited.
*/

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use opentelemetry::KeyValue;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, instrument, warn, Instrument};

use netglobe_api::AppState;
use netglobe_capture::{devices, CaptureSettings, LiveSource};
use netglobe_config::NetglobeConfig;
use netglobe_core::classify::FlowClassifier;
use netglobe_core::geo::{GeoEnricher, GeoResolver};
use netglobe_core::pipeline::{FlowPipeline, IngestStats};
use netglobe_core::scheduler::{BroadcastScheduler, TickOutcome, TickReport};
use netglobe_core::snapshot::{ObjectStore, SnapshotSettings, SnapshotUploader, UploadOutcome};
use netglobe_core::source::PacketSource;
use netglobe_core::store::AggregationStore;
use netglobe_core::subscribers::{SubscriberRegistry, UploadSignal};
use netglobe_geo::MaxMindResolver;
use netglobe_storage::FsObjectStore;
use netglobe_telemetry::{EventLogger, MetricsRecorder};

use crate::EngineError;

/// Everything the engine needs from the outside world.
pub struct Collaborators {
    pub resolver: Arc<dyn GeoResolver>,
    pub source: Box<dyn PacketSource>,
    /// Address classifying records as upload or download
    pub local: Ipv4Addr,
    pub object_store: Option<Arc<dyn ObjectStore>>,
    pub listener: TcpListener,
    /// Checked by the source between reads; set on shutdown
    pub terminate: Arc<AtomicBool>,
}

/// Installs the global log subscriber at `level` and builds the metrics
/// registry shared by the engine and the `/metrics` endpoint.
pub fn init_telemetry(level: &str) -> Result<Arc<MetricsRecorder>, EngineError> {
    EventLogger::init(level)?;
    Ok(Arc::new(MetricsRecorder::new()?))
}

/// Opens the geolocation database, the capture device, the snapshot bucket
/// and the server socket, then runs until capture ends or `cancel` fires.
#[instrument(level = "info", name = "run_production_mode", skip_all)]
pub async fn run_production_mode(
    config: &NetglobeConfig,
    metrics: Arc<MetricsRecorder>,
    cancel: CancellationToken,
) -> Result<IngestStats, EngineError> {
    let collaborators = open_collaborators(config).await?;
    run_with(config, collaborators, metrics, cancel).await
}

/// Opens the production collaborators described by `config`.
pub async fn open_collaborators(config: &NetglobeConfig) -> Result<Collaborators, EngineError> {
    let resolver = MaxMindResolver::open(&config.geo.database_path)?;

    let capture = &config.capture;
    let local = match capture.local_address {
        Some(address) => address,
        None => devices::interface_ipv4(&capture.interface)?,
    };

    let terminate = Arc::new(AtomicBool::new(false));
    let settings = CaptureSettings {
        interface: capture.interface.clone(),
        promiscuous: capture.promiscuous,
        snaplen: capture.snaplen,
        timeout_ms: capture.timeout_ms,
        filter: capture.filter.clone(),
    };
    let source = LiveSource::open(&settings, terminate.clone())?;
    info!(interface = %capture.interface, %local, "Capturing");

    let object_store = if config.storage.enabled {
        let store = FsObjectStore::new(&config.storage.root);
        store.ensure_bucket(&config.storage.bucket).await?;
        let pruned = store
            .prune_expired(&config.storage.bucket, Utc::now())
            .await?;
        if !pruned.is_empty() {
            info!(count = pruned.len(), "Removed expired snapshots");
        }
        Some(Arc::new(store) as Arc<dyn ObjectStore>)
    } else {
        None
    };

    let listener = netglobe_api::bind(&config.server.bind_address()).await?;

    Ok(Collaborators {
        resolver: Arc::new(resolver),
        source: Box::new(source),
        local,
        object_store,
        listener,
        terminate,
    })
}

/// Runs the engine over already-opened collaborators.
#[instrument(level = "info", name = "run_engine", skip_all)]
pub async fn run_with(
    config: &NetglobeConfig,
    collaborators: Collaborators,
    metrics: Arc<MetricsRecorder>,
    cancel: CancellationToken,
) -> Result<IngestStats, EngineError> {
    let Collaborators {
        resolver,
        mut source,
        local,
        object_store,
        listener,
        terminate,
    } = collaborators;
    let pipeline_config = &config.pipeline;

    let store = Arc::new(AggregationStore::new());
    let registry = Arc::new(SubscriberRegistry::new(pipeline_config.send_timeout()));
    let signal = Arc::new(UploadSignal::new());

    let pipeline = FlowPipeline::new(
        FlowClassifier::new(local),
        GeoEnricher::new(resolver, pipeline_config.home.into()),
        store.clone(),
    )
    .with_debug_payload_bytes(pipeline_config.debug_threshold());

    let mut scheduler = BroadcastScheduler::new(store, registry.clone(), pipeline_config.batch_size)
        .with_threshold(pipeline_config.batch_threshold);
    if let Some(object_store) = object_store {
        scheduler = scheduler.with_uploader(SnapshotUploader::new(
            object_store,
            snapshot_settings(config),
            signal.clone(),
        ));
    }

    let server_handle = tokio::spawn(
        netglobe_api::serve(
            listener,
            AppState {
                registry: registry.clone(),
                signal,
                metrics: metrics.clone(),
                frontend_dir: config.server.frontend_dir.clone(),
            },
            cancel.clone(),
        )
        .instrument(info_span!("server_task")),
    );

    let interval = pipeline_config.broadcast_interval();
    let scheduler_cancel = cancel.clone();
    let scheduler_metrics = metrics.clone();
    let scheduler_handle = tokio::spawn(
        async move {
            scheduler
                .run(
                    interval,
                    async move { scheduler_cancel.cancelled().await },
                    |report| {
                        scheduler_metrics.tick_record(report);
                        scheduler_metrics.live_subscribers_set(registry.len());
                        log_tick(report);
                    },
                )
                .await
        }
        .instrument(info_span!("scheduler_task")),
    );

    let capture_terminate = terminate.clone();
    let capture_metrics = metrics.clone();
    let capture_span = info_span!("capture_task");
    let mut capture_handle = tokio::task::spawn_blocking(move || {
        let _entered = capture_span.enter();
        pipeline.drain_source(
            source.as_mut(),
            || !capture_terminate.load(Ordering::Relaxed),
            |outcome| capture_metrics.ingest_record(outcome),
        )
    });

    let captured = tokio::select! {
        result = &mut capture_handle => result,
        _ = cancel.cancelled() => {
            info!("Shutdown requested");
            terminate.store(true, Ordering::Relaxed);
            (&mut capture_handle).await
        }
    };

    terminate.store(true, Ordering::Relaxed);
    cancel.cancel();
    scheduler_handle.await?;
    let served = server_handle.await?;

    let stats = captured??;
    served?;
    info!(
        observed = stats.observed,
        rejected = stats.rejected,
        unresolved = stats.unresolved,
        enqueued = stats.enqueued,
        "Capture finished"
    );
    Ok(stats)
}

fn snapshot_settings(config: &NetglobeConfig) -> SnapshotSettings {
    let storage = &config.storage;
    SnapshotSettings {
        bucket: storage.bucket.clone(),
        key: storage.object_key.clone(),
        expiry: i64::try_from(storage.expiry_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX),
        payload_bytes: storage.payload_bytes,
        require_viewer_signal: storage.require_viewer_signal,
    }
}

fn log_tick(report: &TickReport) {
    match report.upload {
        Some(UploadOutcome::Completed { bytes }) => EventLogger::emit(
            "snapshot_uploaded",
            &[KeyValue::new("bytes", bytes as i64)],
        ),
        Some(UploadOutcome::Failed(stage)) => EventLogger::emit(
            "snapshot_failed",
            &[KeyValue::new("stage", format!("{stage:?}"))],
        ),
        Some(UploadOutcome::Skipped) | None => {}
    }

    if let TickOutcome::Delivered {
        events,
        color,
        report,
    } = &report.outcome
    {
        EventLogger::emit(
            "batch_delivered",
            &[
                KeyValue::new("events", *events as i64),
                KeyValue::new("color", *color),
                KeyValue::new("subscribers", report.delivered as i64),
            ],
        );
        for id in &report.pruned {
            warn!(subscriber = id, "Dropped viewer after failed send");
            EventLogger::emit("subscriber_pruned", &[KeyValue::new("id", *id as i64)]);
        }
    }
}
