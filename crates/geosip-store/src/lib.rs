//! Record storage for geosip.
//!
//! One [`RecordStore`] trait with two backends:
//!
//! - [`RemoteBackend`]: an HTTP document store, used when configured and
//!   reachable at boot
//! - [`LocalBackend`]: an embedded SQLite database, always available
//!
//! [`Store`] picks one at boot and keeps it for the session. Reads from the
//! remote fall back to the local database on failure; writes report failure
//! to the caller. The first read of a session also runs the one-time legacy
//! migration ([`Migrator`]).
//!
//! # Example
//!
//! ```ignore
//! let store = Store::connect(&config, Arc::new(FileLegacySource::new(&config.legacy.dir))).await?;
//! let records = store.list_records().await?;
//! println!("{} records via {}", records.len(), store.status_label());
//! ```

pub mod backends;
pub mod config;
pub mod error;
pub mod migration;
pub mod ops;
pub mod store;

pub use backends::{LocalBackend, RemoteBackend};
pub use config::{LegacyConfig, LocalConfig, RemoteConfig, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use migration::{
    FileLegacySource, LegacySource, MigrationError, MigrationOutcome, Migrator, NoLegacySource,
};
pub use ops::{BackendKind, RecordStore};
pub use store::{LinkSync, Store};
