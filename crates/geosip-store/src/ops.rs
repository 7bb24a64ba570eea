//! Record store operations trait.
//!
//! One trait, two implementations: the remote document store and the local
//! embedded store. Calling code never branches on which one it holds; the
//! [`Store`](crate::Store) adapter routes fallback and migration.

use async_trait::async_trait;

use geosip_types::{LandRecord, RecordId, User};

use crate::StoreResult;

/// Which kind of backend an implementation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Remote durable document store.
    Remote,
    /// Local embedded store.
    Local,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Remote => "remote",
            BackendKind::Local => "local",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core record store operations.
///
/// Two collections: land records keyed by `id`, users keyed by `username`.
/// Batch writes are not atomic; a failure partway through may leave part of
/// the batch committed.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// The kind of backend.
    fn kind(&self) -> BackendKind;

    // ========================================================================
    // Land records
    // ========================================================================

    /// Every stored record, in storage order.
    async fn list_records(&self) -> StoreResult<Vec<LandRecord>>;

    /// Insert a new record.
    async fn create_record(&self, record: &LandRecord) -> StoreResult<()>;

    /// Insert a batch of new records.
    async fn create_records(&self, records: &[LandRecord]) -> StoreResult<()>;

    /// Insert or overwrite a batch of records by id.
    async fn put_records(&self, records: &[LandRecord]) -> StoreResult<()>;

    /// Upsert a record by id.
    ///
    /// The remote backend merges the supplied fields into the stored
    /// document; the local backend replaces the row. Pass a complete record
    /// to get the same result from both.
    async fn update_record(&self, record: &LandRecord) -> StoreResult<()>;

    /// Remove a record. Removing a missing id is not an error.
    async fn delete_record(&self, id: &RecordId) -> StoreResult<()>;

    /// Remove every record.
    async fn clear_records(&self) -> StoreResult<()>;

    /// Set `file_link` on every record whose trimmed drawing number equals
    /// the trimmed `drawing_number`. Returns the number of records updated.
    async fn set_file_link_for_drawing(
        &self,
        drawing_number: &str,
        link: &str,
    ) -> StoreResult<usize>;

    // ========================================================================
    // Users
    // ========================================================================

    /// Look up a user by username.
    async fn get_user(&self, username: &str) -> StoreResult<Option<User>>;

    /// Every stored user.
    async fn list_users(&self) -> StoreResult<Vec<User>>;

    /// Insert or replace a user.
    async fn put_user(&self, user: &User) -> StoreResult<()>;

    /// Remove a user. Removing a missing username is not an error.
    async fn delete_user(&self, username: &str) -> StoreResult<()>;

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Look up a record by id.
    async fn get_record(&self, id: &RecordId) -> StoreResult<Option<LandRecord>> {
        Ok(self
            .list_records()
            .await?
            .into_iter()
            .find(|record| &record.id == id))
    }
}
