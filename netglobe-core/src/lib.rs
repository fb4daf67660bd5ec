//! # netglobe-core
//!
//! Flow aggregation and delivery for the network globe visualizer.
//! Captured TCP traffic is classified, geolocated, deduplicated per broadcast
//! window and pushed to live viewers in colored batches.
//!
//! ### Expectations:
//! - Ingestion never blocks on a viewer; delivery never blocks on capture
//! - One slow viewer cannot delay the others beyond a send deadline
//! - No I/O in this crate; capture, geolocation, storage and transports are
//!   supplied through traits
//!
//! ### Key Submodules:
//! - `classify`: upload/download classification relative to the local host
//! - `geo`: resolver seam and event orientation
//! - `store`: per-window deduplicated aggregation with lifetime counts
//! - `subscribers`: viewer registry and concurrent fan-out
//! - `scheduler`: fixed-interval drain, discard or deliver
//! - `snapshot`: periodic object store upload
//!
//! ### Future:
//! - IPv6 flows

pub mod classify;
pub mod error;
pub mod events;
pub mod geo;
pub mod pipeline;
pub mod scheduler;
pub mod snapshot;
pub mod source;
pub mod store;
pub mod subscribers;

pub mod prelude {
    pub use crate::classify::FlowClassifier;
    pub use crate::error::*;
    pub use crate::events::*;
    pub use crate::geo::{GeoEnricher, GeoLocation, GeoResolver};
    pub use crate::pipeline::{FlowPipeline, IngestOutcome, IngestStats};
    pub use crate::scheduler::{
        BatchSink, BatchThreshold, BroadcastScheduler, SchedulerState, TickOutcome, TickReport, PALETTE,
    };
    pub use crate::snapshot::{
        ObjectStore, ObjectUpload, SnapshotSettings, SnapshotUploader, UploadOutcome, UploadStage,
    };
    pub use crate::source::{PacketSource, ReplaySource};
    pub use crate::store::{AggregationStore, DrainedWindow, Enqueued, RemoteBytes};
    pub use crate::subscribers::{
        BroadcastReport, ControlMessage, PushTransport, SubscriberId, SubscriberRegistry,
        UploadSignal,
    };
}

pub use error::{CaptureError, GeoError, StorageError, TransportError};
