//! Record identifiers.
//!
//! A `RecordId` is opaque text. Fresh ids are UUIDv7 (time-ordered), but ids
//! read from storage are accepted verbatim: legacy data carries UUIDv4 text and
//! nothing in this layer depends on the id's shape. The `short()` form (first 8
//! characters) is for human-facing output only, never a lookup key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique, immutable identifier of one land record.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Create a new time-ordered ID (UUIDv7 text).
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    /// Wrap an existing identifier as-is.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for display only.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }

    /// Check if this is the empty identifier.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> String {
        id.0
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.short())
    }
}
