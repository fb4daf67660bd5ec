//! ## netglobe-core::snapshot
//! **Periodic snapshot upload to an object store**
//!
//! The uploaded payload is a placeholder blob; it is not derived from
//! pipeline state. Failures are logged and never reach the broadcast cycle.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use rand::RngCore;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::subscribers::UploadSignal;

/// Destination for named blobs with an expiry.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Opens an upload of `key` inside `bucket` that expires at `expires`.
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        expires: DateTime<Utc>,
    ) -> Result<Box<dyn ObjectUpload>, StorageError>;
}

/// An open upload. Nothing is visible until [`ObjectUpload::commit`].
#[async_trait]
pub trait ObjectUpload: Send {
    async fn write(&mut self, data: &[u8]) -> Result<(), StorageError>;

    async fn commit(self: Box<Self>) -> Result<(), StorageError>;
}

/// Where and what to upload.
#[derive(Clone, Debug)]
pub struct SnapshotSettings {
    pub bucket: String,
    pub key: String,
    pub expiry: TimeDelta,
    pub payload_bytes: usize,
    /// Only upload after a viewer sent a control message
    pub require_viewer_signal: bool,
}

/// Step at which an upload attempt stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadStage {
    Open,
    Write,
    Commit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Gated on a viewer signal that has not arrived
    Skipped,
    Completed { bytes: usize },
    Failed(UploadStage),
}

pub struct SnapshotUploader {
    store: Arc<dyn ObjectStore>,
    settings: SnapshotSettings,
    signal: Arc<UploadSignal>,
}

impl SnapshotUploader {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        settings: SnapshotSettings,
        signal: Arc<UploadSignal>,
    ) -> Self {
        Self {
            store,
            settings,
            signal,
        }
    }

    pub fn settings(&self) -> &SnapshotSettings {
        &self.settings
    }

    fn payload(&self) -> Bytes {
        let mut buffer = vec![0u8; self.settings.payload_bytes];
        rand::rng().fill_bytes(&mut buffer);
        Bytes::from(buffer)
    }

    /// Runs one open → write → commit cycle. The viewer signal is cleared
    /// after every attempt.
    pub async fn upload(&self) -> UploadOutcome {
        if self.settings.require_viewer_signal && !self.signal.is_requested() {
            return UploadOutcome::Skipped;
        }

        debug!(bucket = %self.settings.bucket, key = %self.settings.key, "upload started");
        let outcome = self.attempt().await;
        self.signal.clear();
        debug!(?outcome, "upload finished");
        outcome
    }

    async fn attempt(&self) -> UploadOutcome {
        let Some(expires) = Utc::now().checked_add_signed(self.settings.expiry) else {
            warn!("UploadObject error: expiry {} out of range", self.settings.expiry);
            return UploadOutcome::Failed(UploadStage::Open);
        };
        let mut upload = match self
            .store
            .upload(&self.settings.bucket, &self.settings.key, expires)
            .await
        {
            Ok(upload) => upload,
            Err(e) => {
                warn!("UploadObject error: {e}");
                return UploadOutcome::Failed(UploadStage::Open);
            }
        };

        let payload = self.payload();
        if let Err(e) = upload.write(&payload).await {
            warn!("UploadObject write error: {e}");
            return UploadOutcome::Failed(UploadStage::Write);
        }

        if let Err(e) = upload.commit().await {
            warn!("upload commit error: {e}");
            return UploadOutcome::Failed(UploadStage::Commit);
        }

        UploadOutcome::Completed {
            bytes: payload.len(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// In-memory store; `fail_at` makes the given stage error.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub objects: Arc<Mutex<HashMap<String, (Vec<u8>, DateTime<Utc>)>>>,
        pub fail_at: Option<UploadStage>,
    }

    struct MemoryUpload {
        name: String,
        expires: DateTime<Utc>,
        buffer: Vec<u8>,
        objects: Arc<Mutex<HashMap<String, (Vec<u8>, DateTime<Utc>)>>>,
        fail_at: Option<UploadStage>,
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn upload(
            &self,
            bucket: &str,
            key: &str,
            expires: DateTime<Utc>,
        ) -> Result<Box<dyn ObjectUpload>, StorageError> {
            if self.fail_at == Some(UploadStage::Open) {
                return Err(StorageError::InvalidName(key.into()));
            }
            Ok(Box::new(MemoryUpload {
                name: format!("{bucket}/{key}"),
                expires,
                buffer: Vec::new(),
                objects: self.objects.clone(),
                fail_at: self.fail_at,
            }))
        }
    }

    #[async_trait]
    impl ObjectUpload for MemoryUpload {
        async fn write(&mut self, data: &[u8]) -> Result<(), StorageError> {
            if self.fail_at == Some(UploadStage::Write) {
                return Err(std::io::Error::other("disk full").into());
            }
            self.buffer.extend_from_slice(data);
            Ok(())
        }

        async fn commit(self: Box<Self>) -> Result<(), StorageError> {
            if self.fail_at == Some(UploadStage::Commit) {
                return Err(StorageError::Committed);
            }
            self.objects
                .lock()
                .insert(self.name, (self.buffer, self.expires));
            Ok(())
        }
    }

    pub(crate) fn settings(require_viewer_signal: bool) -> SnapshotSettings {
        SnapshotSettings {
            bucket: "network-globe".into(),
            key: "test.txt".into(),
            expiry: TimeDelta::hours(1),
            payload_bytes: 8024,
            require_viewer_signal,
        }
    }

    #[tokio::test]
    async fn uploads_payload_with_expiry() {
        let store = Arc::new(MemoryStore::default());
        let uploader = SnapshotUploader::new(
            store.clone(),
            settings(false),
            Arc::new(UploadSignal::new()),
        );

        let before = Utc::now();
        assert_eq!(
            uploader.upload().await,
            UploadOutcome::Completed { bytes: 8024 }
        );

        let objects = store.objects.lock();
        let (data, expires) = &objects["network-globe/test.txt"];
        assert_eq!(data.len(), 8024);
        assert!(*expires >= before + TimeDelta::minutes(59));
    }

    #[tokio::test]
    async fn each_failing_stage_is_reported() {
        for stage in [UploadStage::Open, UploadStage::Write, UploadStage::Commit] {
            let store = Arc::new(MemoryStore {
                fail_at: Some(stage),
                ..Default::default()
            });
            let uploader = SnapshotUploader::new(
                store.clone(),
                settings(false),
                Arc::new(UploadSignal::new()),
            );
            assert_eq!(uploader.upload().await, UploadOutcome::Failed(stage));
            assert!(store.objects.lock().is_empty());
        }
    }

    #[tokio::test]
    async fn unrepresentable_expiry_fails_open() {
        let store = Arc::new(MemoryStore::default());
        let mut settings = settings(false);
        settings.expiry = TimeDelta::MAX;
        let signal = Arc::new(UploadSignal::new());
        signal.observe("start");
        let uploader = SnapshotUploader::new(store.clone(), settings, signal.clone());

        assert_eq!(
            uploader.upload().await,
            UploadOutcome::Failed(UploadStage::Open)
        );
        assert!(store.objects.lock().is_empty());
        assert!(!signal.is_requested());
    }

    #[tokio::test]
    async fn gated_upload_waits_for_viewer_signal() {
        let store = Arc::new(MemoryStore::default());
        let signal = Arc::new(UploadSignal::new());
        let uploader = SnapshotUploader::new(store.clone(), settings(true), signal.clone());

        assert_eq!(uploader.upload().await, UploadOutcome::Skipped);

        signal.observe("start");
        assert!(matches!(
            uploader.upload().await,
            UploadOutcome::Completed { .. }
        ));
        assert!(!signal.is_requested());
        assert_eq!(uploader.upload().await, UploadOutcome::Skipped);
    }
}
