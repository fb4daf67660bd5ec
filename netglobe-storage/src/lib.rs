//! ## netglobe-storage
//! **Filesystem object store with expiring objects**
//!
//! Layout under the root directory:
//! ```text
//! <root>/<bucket>/<key>            committed object
//! <root>/<bucket>/<key>.partial    upload in progress
//! <root>/<bucket>/<key>.meta.json  {"expires": "<RFC 3339>"}
//! ```
//!
//! ### Invariants:
//! - An object becomes visible only on commit, by rename
//! - Committed objects always have a metadata file

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use netglobe_core::error::StorageError;
use netglobe_core::snapshot::{ObjectStore, ObjectUpload};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const PARTIAL_SUFFIX: &str = ".partial";
const META_SUFFIX: &str = ".meta.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub expires: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        validate_name(bucket)?;
        Ok(self.root.join(bucket))
    }

    /// Creates the bucket directory if needed.
    pub async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let dir = self.bucket_dir(bucket)?;
        fs::create_dir_all(&dir).await?;
        debug!(bucket, path = %dir.display(), "Bucket ready");
        Ok(())
    }

    /// Expiry of a committed object, `None` if it does not exist.
    pub async fn metadata(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>, StorageError> {
        validate_name(key)?;
        let path = self.bucket_dir(bucket)?.join(format!("{key}{META_SUFFIX}"));
        match fs::read(&path).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes committed objects in `bucket` whose expiry is before `now`.
    /// Returns the removed keys.
    pub async fn prune_expired(&self, bucket: &str, now: DateTime<Utc>) -> Result<Vec<String>, StorageError> {
        let dir = self.bucket_dir(bucket)?;
        let mut removed = Vec::new();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(removed),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(key) = name.strip_suffix(META_SUFFIX) else {
                continue;
            };

            let meta: ObjectMeta = match fs::read(entry.path()).await {
                Ok(raw) => match serde_json::from_slice(&raw) {
                    Ok(meta) => meta,
                    Err(e) => {
                        warn!(key, "Unreadable object metadata: {e}");
                        continue;
                    }
                },
                Err(e) => {
                    warn!(key, "Failed to read object metadata: {e}");
                    continue;
                }
            };

            if meta.expires <= now {
                remove_if_present(&dir.join(key)).await?;
                remove_if_present(&entry.path()).await?;
                removed.push(key.to_owned());
            }
        }

        removed.sort();
        Ok(removed)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        expires: DateTime<Utc>,
    ) -> Result<Box<dyn ObjectUpload>, StorageError> {
        validate_name(key)?;
        let dir = self.bucket_dir(bucket)?;
        let target = dir.join(key);
        let partial = dir.join(format!("{key}{PARTIAL_SUFFIX}"));
        let file = fs::File::create(&partial).await?;

        Ok(Box::new(FsUpload {
            file,
            partial,
            target,
            meta: dir.join(format!("{key}{META_SUFFIX}")),
            expires,
        }))
    }
}

struct FsUpload {
    file: fs::File,
    partial: PathBuf,
    target: PathBuf,
    meta: PathBuf,
    expires: DateTime<Utc>,
}

#[async_trait]
impl ObjectUpload for FsUpload {
    async fn write(&mut self, data: &[u8]) -> Result<(), StorageError> {
        self.file.write_all(data).await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let FsUpload {
            mut file,
            partial,
            target,
            meta,
            expires,
        } = *self;

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let encoded = serde_json::to_vec(&ObjectMeta { expires })?;
        fs::write(&meta, encoded).await?;
        fs::rename(&partial, &target).await?;
        debug!(path = %target.display(), %expires, "Object committed");
        Ok(())
    }
}

async fn remove_if_present(path: &Path) -> Result<(), StorageError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Bucket and key names are single path components.
fn validate_name(name: &str) -> Result<(), StorageError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.ends_with(PARTIAL_SUFFIX)
        && !name.ends_with(META_SUFFIX);
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName(name.to_owned()))
    }
}
