//! One-time migration of the legacy flat-storage blob.
//!
//! Older installs kept every record as one JSON array under a fixed key. On
//! the first read of a session the blob, if present and non-empty, is copied
//! into the active backend and then removed. A failed copy leaves the blob in
//! place so the next session retries.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use geosip_types::LandRecord;

use crate::ops::RecordStore;
use crate::{StoreError, StoreResult};

/// Where legacy blobs live.
#[async_trait]
pub trait LegacySource: Send + Sync {
    /// The blob stored under `key`, if any.
    async fn read(&self, key: &str) -> StoreResult<Option<String>>;

    /// Remove the blob stored under `key`. Missing keys are not an error.
    async fn remove(&self, key: &str) -> StoreResult<()>;
}

/// One `<key>.json` file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileLegacySource {
    dir: PathBuf,
}

impl FileLegacySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl LegacySource for FileLegacySource {
    async fn read(&self, key: &str) -> StoreResult<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// No legacy data anywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLegacySource;

#[async_trait]
impl LegacySource for NoLegacySource {
    async fn read(&self, _key: &str) -> StoreResult<Option<String>> {
        Ok(None)
    }

    async fn remove(&self, _key: &str) -> StoreResult<()> {
        Ok(())
    }
}

/// What a migration run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// No blob under the key.
    NoSource,
    /// The blob held an empty sequence. Nothing was written or removed.
    Empty,
    /// This many records were copied and the blob removed.
    Migrated(usize),
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to read legacy blob: {0}")]
    Read(#[source] StoreError),

    #[error("legacy blob is not a record sequence: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to copy legacy records: {0}")]
    Insert(#[source] StoreError),

    #[error("records copied but legacy blob not removed: {0}")]
    Remove(#[source] StoreError),
}

/// Copies the legacy blob into a backend.
#[derive(Clone)]
pub struct Migrator {
    source: Arc<dyn LegacySource>,
    key: String,
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator").field("key", &self.key).finish_non_exhaustive()
    }
}

impl Migrator {
    pub fn new(source: Arc<dyn LegacySource>, key: impl Into<String>) -> Self {
        Self {
            source,
            key: key.into(),
        }
    }

    /// A migrator that never finds anything.
    pub fn none() -> Self {
        Self::new(Arc::new(NoLegacySource), crate::config::LEGACY_RECORDS_KEY)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Copy the blob into `target` and remove it.
    ///
    /// Records are upserted by id, so a run that copied everything but failed
    /// to remove the blob is harmless to repeat.
    pub async fn migrate_once(
        &self,
        target: &dyn RecordStore,
    ) -> Result<MigrationOutcome, MigrationError> {
        let Some(blob) = self.source.read(&self.key).await.map_err(MigrationError::Read)? else {
            return Ok(MigrationOutcome::NoSource);
        };

        let records: Vec<LandRecord> = serde_json::from_str(&blob)?;
        if records.is_empty() {
            return Ok(MigrationOutcome::Empty);
        }

        info!(
            key = %self.key,
            records = records.len(),
            backend = %target.kind(),
            "migrating legacy records"
        );

        target
            .put_records(&records)
            .await
            .map_err(MigrationError::Insert)?;

        if let Err(e) = self.source.remove(&self.key).await {
            warn!(key = %self.key, error = %e, "legacy records copied but blob not removed");
            return Err(MigrationError::Remove(e));
        }

        info!(records = records.len(), "legacy migration complete");
        Ok(MigrationOutcome::Migrated(records.len()))
    }
}
