//! Shared data types for geosip.
//!
//! This crate is the leaf of the workspace: record and user shapes, the
//! measurement status and village enums, and record identifiers. It has no
//! internal dependencies and performs no I/O.
//!
//! # Relationships
//!
//! ```text
//! LandRecord (RecordId)
//!     └── documentNumber  ── shared by co-owners of one title
//!     └── noGu            ── shared by every title drawn on one survey sheet
//!
//! User (username)
//!     └── permissions / isSuperAdmin
//! ```
//!
//! Relationships are value equality on text keys, never structural references.

pub mod ids;
pub mod record;
pub mod user;

pub use ids::RecordId;
pub use record::{
    LandRecord, MeasurementStatus, RecordDraft, Village, match_key, now_millis, sanitize_area,
};
pub use user::{User, UserPermissions};
