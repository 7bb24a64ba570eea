//! The dual-backend record store.
//!
//! [`Store`] is what the rest of the application holds. It wraps the backend
//! chosen at boot and, when that is the remote, keeps the local backend open
//! as a read fallback. Callers never ask which backend is active except to
//! show it.
//!
//! Read paths (`list_records`, `get_record`, `get_user`, `list_users`) recover
//! from remote failures by reading the local backend. Write paths surface the
//! failure; nothing is rolled back.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use geosip_types::{LandRecord, RecordId, User};

use crate::backends::{LocalBackend, RemoteBackend};
use crate::config::StoreConfig;
use crate::migration::{LegacySource, MigrationError, MigrationOutcome, Migrator};
use crate::ops::{BackendKind, RecordStore};
use crate::{StoreError, StoreResult};

struct StoreInner {
    primary: Arc<dyn RecordStore>,
    fallback: Option<Arc<dyn RecordStore>>,
    migrator: Migrator,
    migrated: OnceCell<()>,
}

/// Dual-backend record store. Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("mode", &self.mode())
            .field("fallback", &self.inner.fallback.is_some())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Pick the backend for this session.
    ///
    /// The remote is used only when it is configured and its health check
    /// answers; otherwise the local backend is used. The choice never changes
    /// afterwards.
    pub async fn connect(config: &StoreConfig, legacy: Arc<dyn LegacySource>) -> StoreResult<Self> {
        let local: Arc<dyn RecordStore> = Arc::new(open_local(config).await?);
        let migrator = Migrator::new(legacy, config.legacy.key.clone());

        let Some(remote_config) = config.remote_if_configured() else {
            info!(backend = "local", reason = "remote not configured", "store backend selected");
            return Ok(Self::from_backends(local, None, migrator));
        };

        let remote = RemoteBackend::new(remote_config.clone())?;
        if remote.health_check().await {
            info!(
                backend = "remote",
                url = %remote_config.base_url,
                project = %remote_config.project,
                "store backend selected"
            );
            Ok(Self::from_backends(Arc::new(remote), Some(local), migrator))
        } else {
            warn!(
                backend = "local",
                url = %remote_config.base_url,
                reason = "remote unreachable",
                "store backend selected"
            );
            Ok(Self::from_backends(local, None, migrator))
        }
    }

    /// Assemble a store from explicit backends.
    pub fn from_backends(
        primary: Arc<dyn RecordStore>,
        fallback: Option<Arc<dyn RecordStore>>,
        migrator: Migrator,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                primary,
                fallback,
                migrator,
                migrated: OnceCell::new(),
            }),
        }
    }

    /// A throwaway in-memory local store with no legacy source.
    pub fn in_memory() -> StoreResult<Self> {
        Ok(Self::from_backends(
            Arc::new(LocalBackend::in_memory()?),
            None,
            Migrator::none(),
        ))
    }

    /// The backend selected at boot.
    pub fn mode(&self) -> BackendKind {
        self.inner.primary.kind()
    }

    /// Human-readable backend status.
    pub fn status_label(&self) -> &'static str {
        match self.mode() {
            BackendKind::Remote => "CLOUD (ONLINE)",
            BackendKind::Local => "LOCAL (OFFLINE)",
        }
    }

    /// Run the legacy migration now, regardless of the session guard.
    pub async fn migrate(&self) -> Result<MigrationOutcome, MigrationError> {
        self.inner
            .migrator
            .migrate_once(self.inner.primary.as_ref())
            .await
    }

    /// Run the migration check once per session. Failures are logged; the
    /// blob stays for the next session.
    async fn ensure_migrated(&self) {
        self.inner
            .migrated
            .get_or_init(|| async {
                match self.migrate().await {
                    Ok(outcome) => debug!(?outcome, "legacy migration check done"),
                    Err(e) => error!(error = %e, "legacy migration failed; will retry next session"),
                }
            })
            .await;
    }

    /// The fallback backend to retry a failed read on, if the failure allows.
    fn fallback_for(&self, op: &'static str, err: &StoreError) -> Option<&Arc<dyn RecordStore>> {
        if !err.is_transient() {
            return None;
        }
        let fallback = self.inner.fallback.as_ref()?;
        warn!(op, error = %err, "remote read failed, reading local backend");
        Some(fallback)
    }

    /// Set `file_link` on every record sharing `drawing_number`.
    ///
    /// Best-effort: a failure is logged and reported as zero updates. An
    /// empty drawing number updates nothing.
    pub async fn sync_shared_link(&self, drawing_number: &str, link: &str) -> usize {
        let drawing_number = drawing_number.trim();
        if drawing_number.is_empty() {
            return 0;
        }
        match self
            .inner
            .primary
            .set_file_link_for_drawing(drawing_number, link)
            .await
        {
            Ok(updated) => {
                debug!(drawing_number, updated, "shared link propagated");
                updated
            }
            Err(e) => {
                warn!(drawing_number, error = %e, "shared link propagation failed");
                0
            }
        }
    }

    /// Run [`sync_shared_link`](Self::sync_shared_link) as a spawned task.
    ///
    /// Must be called inside a tokio runtime. The returned handle may be
    /// awaited or dropped; dropping it does not cancel the task.
    pub fn spawn_link_sync(&self, drawing_number: &str, link: &str) -> LinkSync {
        let store = self.clone();
        let drawing_number = drawing_number.to_string();
        let link = link.to_string();
        LinkSync {
            handle: tokio::spawn(async move { store.sync_shared_link(&drawing_number, &link).await }),
        }
    }
}

async fn open_local(config: &StoreConfig) -> StoreResult<LocalBackend> {
    if config.local.is_in_memory() {
        return LocalBackend::in_memory();
    }
    if let Some(parent) = config.local.path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    LocalBackend::open(&config.local.path)
}

/// Handle to a spawned link propagation.
#[derive(Debug)]
pub struct LinkSync {
    handle: JoinHandle<usize>,
}

impl LinkSync {
    /// Wait for the propagation and return how many records it updated.
    pub async fn wait(self) -> usize {
        match self.handle.await {
            Ok(updated) => updated,
            Err(e) => {
                warn!(error = %e, "link propagation task did not complete");
                0
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

#[async_trait]
impl RecordStore for Store {
    fn kind(&self) -> BackendKind {
        self.mode()
    }

    async fn list_records(&self) -> StoreResult<Vec<LandRecord>> {
        self.ensure_migrated().await;
        match self.inner.primary.list_records().await {
            Ok(records) => Ok(records),
            Err(e) => match self.fallback_for("list_records", &e) {
                Some(local) => local.list_records().await,
                None => Err(e),
            },
        }
    }

    async fn get_record(&self, id: &RecordId) -> StoreResult<Option<LandRecord>> {
        match self.inner.primary.get_record(id).await {
            Ok(record) => Ok(record),
            Err(e) => match self.fallback_for("get_record", &e) {
                Some(local) => local.get_record(id).await,
                None => Err(e),
            },
        }
    }

    async fn create_record(&self, record: &LandRecord) -> StoreResult<()> {
        self.inner.primary.create_record(record).await
    }

    async fn create_records(&self, records: &[LandRecord]) -> StoreResult<()> {
        self.inner.primary.create_records(records).await
    }

    async fn put_records(&self, records: &[LandRecord]) -> StoreResult<()> {
        self.inner.primary.put_records(records).await
    }

    async fn update_record(&self, record: &LandRecord) -> StoreResult<()> {
        self.inner.primary.update_record(record).await
    }

    async fn delete_record(&self, id: &RecordId) -> StoreResult<()> {
        self.inner.primary.delete_record(id).await
    }

    async fn clear_records(&self) -> StoreResult<()> {
        self.inner.primary.clear_records().await
    }

    async fn set_file_link_for_drawing(
        &self,
        drawing_number: &str,
        link: &str,
    ) -> StoreResult<usize> {
        self.inner
            .primary
            .set_file_link_for_drawing(drawing_number, link)
            .await
    }

    async fn get_user(&self, username: &str) -> StoreResult<Option<User>> {
        match self.inner.primary.get_user(username).await {
            Ok(user) => Ok(user),
            Err(e) => match self.fallback_for("get_user", &e) {
                Some(local) => local.get_user(username).await,
                None => Err(e),
            },
        }
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        match self.inner.primary.list_users().await {
            Ok(users) => Ok(users),
            Err(e) => match self.fallback_for("list_users", &e) {
                Some(local) => local.list_users().await,
                None => Err(e),
            },
        }
    }

    async fn put_user(&self, user: &User) -> StoreResult<()> {
        self.inner.primary.put_user(user).await
    }

    async fn delete_user(&self, username: &str) -> StoreResult<()> {
        self.inner.primary.delete_user(username).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geosip_types::RecordDraft;

    fn record(gu: &str) -> LandRecord {
        LandRecord::create(RecordDraft {
            survey_drawing_number: gu.into(),
            ..RecordDraft::default()
        })
    }

    #[tokio::test]
    async fn test_in_memory_is_local() {
        let store = Store::in_memory().unwrap();
        assert_eq!(store.mode(), BackendKind::Local);
        assert_eq!(store.status_label(), "LOCAL (OFFLINE)");
    }

    #[tokio::test]
    async fn test_connect_without_remote_selects_local() {
        let store = Store::connect(&StoreConfig::in_memory(), Arc::new(crate::NoLegacySource))
            .await
            .unwrap();
        assert_eq!(store.mode(), BackendKind::Local);
    }

    #[tokio::test]
    async fn test_connect_with_unreachable_remote_selects_local() {
        let mut config = StoreConfig::in_memory();
        config.remote = Some(crate::RemoteConfig {
            base_url: "http://127.0.0.1:9".into(),
            api_key: "key".into(),
            timeout_secs: 2,
            ..Default::default()
        });
        let store = Store::connect(&config, Arc::new(crate::NoLegacySource))
            .await
            .unwrap();
        assert_eq!(store.mode(), BackendKind::Local);
    }

    #[tokio::test]
    async fn test_connect_creates_database_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = StoreConfig::in_memory();
        config.local.path = dir.path().join("nested").join("geosip.db");
        let store = Store::connect(&config, Arc::new(crate::NoLegacySource))
            .await
            .unwrap();
        store.create_record(&record("N1")).await.unwrap();
        assert!(config.local.path.exists());
    }

    #[tokio::test]
    async fn test_sync_shared_link_empty_key_is_noop() {
        let store = Store::in_memory().unwrap();
        store.create_record(&record("")).await.unwrap();
        assert_eq!(store.sync_shared_link("   ", "https://maps/x").await, 0);
        assert_eq!(store.list_records().await.unwrap()[0].file_link, None);
    }

    #[tokio::test]
    async fn test_spawn_link_sync() {
        let store = Store::in_memory().unwrap();
        store
            .create_records(&[record("N1"), record("N1"), record("N2")])
            .await
            .unwrap();

        let task = store.spawn_link_sync("N1", "https://maps/n1");
        assert_eq!(task.wait().await, 2);

        let linked = store
            .list_records()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.link() == Some("https://maps/n1"))
            .count();
        assert_eq!(linked, 2);
    }
}
