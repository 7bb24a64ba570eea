//! Users and their capability flags.
//!
//! A `User` is keyed by `username`. The password is only ever stored hashed;
//! hashing itself lives outside this crate.

use serde::{Deserialize, Serialize};

/// Capability flags granted to a user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserPermissions {
    pub can_add: bool,
    pub can_edit: bool,
    pub can_delete: bool,
    pub can_export_import: bool,
}

impl UserPermissions {
    /// Every flag set.
    pub fn all() -> Self {
        Self {
            can_add: true,
            can_edit: true,
            can_delete: true,
            can_export_import: true,
        }
    }

    /// No flag set.
    pub fn none() -> Self {
        Self::default()
    }
}

/// An authentication principal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    /// Hashed password. Serialized as `password` for compatibility with
    /// existing user documents.
    #[serde(rename = "password", default)]
    pub hashed_password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub permissions: UserPermissions,
    /// Bypasses every permission check; cannot be deleted.
    #[serde(default)]
    pub is_super_admin: bool,
}

impl User {
    /// Create a regular user.
    pub fn new(
        username: impl Into<String>,
        hashed_password: impl Into<String>,
        email: impl Into<String>,
        permissions: UserPermissions,
    ) -> Self {
        Self {
            username: username.into(),
            hashed_password: hashed_password.into(),
            email: email.into(),
            permissions,
            is_super_admin: false,
        }
    }

    /// Create the privileged account.
    pub fn super_admin(
        username: impl Into<String>,
        hashed_password: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            hashed_password: hashed_password.into(),
            email: email.into(),
            permissions: UserPermissions::all(),
            is_super_admin: true,
        }
    }

    /// Copy of this user with the password hash blanked, for display.
    pub fn redacted(&self) -> Self {
        Self {
            hashed_password: String::new(),
            ..self.clone()
        }
    }
}
