//! Record store backends.

mod local;
mod remote;

pub use local::LocalBackend;
pub use remote::{MAX_BATCH_WRITES, RemoteBackend};
