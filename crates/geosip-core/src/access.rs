//! Authentication and the capability gate.
//!
//! A [`Session`] is the capability token every gated operation takes. It is
//! built once from an authenticated [`User`] and passed explicitly; nothing
//! reads a global "current user". Gated operations call
//! [`Session::require`] before touching the store.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use strum::Display;
use thiserror::Error;
use tracing::{debug, info, warn};

use geosip_store::{RecordStore, StoreError, StoreResult};
use geosip_types::{User, UserPermissions};

use crate::config::AdminConfig;
use crate::error::{ServiceError, ServiceResult};

/// Something a session may be allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    Add,
    Edit,
    Delete,
    ExportImport,
    /// Super-admin only.
    ManageUsers,
}

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("permission denied: {action}")]
    PermissionDenied { action: Action },

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("invalid username or password")]
    InvalidCredentials,
}

/// An authenticated user's capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user: User,
}

impl Session {
    /// The stored password hash is dropped.
    pub fn new(user: User) -> Self {
        Self {
            user: user.redacted(),
        }
    }

    pub fn username(&self) -> &str {
        &self.user.username
    }

    pub fn is_super_admin(&self) -> bool {
        self.user.is_super_admin
    }

    pub fn permissions(&self) -> UserPermissions {
        self.user.permissions
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn can(&self, action: Action) -> bool {
        if self.user.is_super_admin {
            return true;
        }
        let p = &self.user.permissions;
        match action {
            Action::Add => p.can_add,
            Action::Edit => p.can_edit,
            Action::Delete => p.can_delete,
            Action::ExportImport => p.can_export_import,
            Action::ManageUsers => false,
        }
    }

    pub fn require(&self, action: Action) -> Result<(), AccessError> {
        if self.can(action) {
            Ok(())
        } else {
            debug!(user = %self.user.username, %action, "permission denied");
            Err(AccessError::PermissionDenied { action })
        }
    }
}

/// Turns a plain-text password into the stored form.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plain: &str) -> String;

    fn verify(&self, plain: &str, hashed: &str) -> bool {
        self.hash(plain) == hashed
    }
}

/// Hex-encoded SHA-256.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl PasswordHasher for Sha256Hasher {
    fn hash(&self, plain: &str) -> String {
        hex::encode(Sha256::digest(plain.as_bytes()))
    }
}

/// Create the super-admin account if no user by that name exists.
///
/// Skipped, with a warning, when no admin password is configured. Returns
/// true when the account was created.
pub async fn ensure_super_admin(
    store: &dyn RecordStore,
    hasher: &dyn PasswordHasher,
    admin: &AdminConfig,
) -> StoreResult<bool> {
    if !admin.has_password() {
        warn!(
            username = %admin.username,
            "no admin password configured; set [admin] password or GEOSIP_ADMIN_PASSWORD to create the super admin"
        );
        return Ok(false);
    }
    if store.get_user(&admin.username).await?.is_some() {
        return Ok(false);
    }

    let user = User::super_admin(&admin.username, hasher.hash(&admin.password), &admin.email);
    store.put_user(&user).await?;
    info!(username = %admin.username, "super admin account created");
    Ok(true)
}

/// Check a username-or-email and password against the stored users.
pub async fn authenticate(
    store: &dyn RecordStore,
    hasher: &dyn PasswordHasher,
    login: &str,
    password: &str,
) -> ServiceResult<Session> {
    let login = login.trim();
    if login.is_empty() {
        return Err(AccessError::NotAuthenticated.into());
    }

    let user = match store.get_user(login).await? {
        Some(user) => Some(user),
        None => store
            .list_users()
            .await?
            .into_iter()
            .find(|u| !u.email.is_empty() && u.email.eq_ignore_ascii_case(login)),
    };

    match user {
        Some(user) if hasher.verify(password, &user.hashed_password) => {
            info!(username = %user.username, "login");
            Ok(Session::new(user))
        }
        _ => Err(AccessError::InvalidCredentials.into()),
    }
}

/// Input for a new account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub email: String,
    pub permissions: UserPermissions,
}

/// User administration. Every operation needs [`Action::ManageUsers`].
#[derive(Clone)]
pub struct UserDirectory<S> {
    store: S,
    hasher: Arc<dyn PasswordHasher>,
}

impl<S: RecordStore> UserDirectory<S> {
    pub fn new(store: S, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { store, hasher }
    }

    /// Add or replace a regular user. The super-admin account cannot be
    /// replaced this way.
    pub async fn add_user(&self, session: &Session, new: NewUser) -> ServiceResult<User> {
        session.require(Action::ManageUsers)?;

        let username = new.username.trim();
        if username.is_empty() || new.password.is_empty() || new.email.trim().is_empty() {
            return Err(ServiceError::invalid("username, password and email are required"));
        }
        if let Some(existing) = self.store.get_user(username).await? {
            if existing.is_super_admin {
                return Err(StoreError::protected(username).into());
            }
        }

        let user = User::new(
            username,
            self.hasher.hash(&new.password),
            new.email.trim(),
            new.permissions,
        );
        self.store.put_user(&user).await?;
        info!(username = %user.username, by = %session.username(), "user saved");
        Ok(user.redacted())
    }

    /// Every user, password hashes blanked.
    pub async fn list_users(&self, session: &Session) -> ServiceResult<Vec<User>> {
        session.require(Action::ManageUsers)?;
        let users = self.store.list_users().await?;
        Ok(users.iter().map(User::redacted).collect())
    }

    /// Remove a user. The super-admin account is refused.
    pub async fn delete_user(&self, session: &Session, username: &str) -> ServiceResult<()> {
        session.require(Action::ManageUsers)?;

        let Some(user) = self.store.get_user(username).await? else {
            return Err(StoreError::not_found(username).into());
        };
        if user.is_super_admin {
            return Err(StoreError::protected(username).into());
        }

        self.store.delete_user(username).await?;
        info!(username, by = %session.username(), "user deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geosip_store::Store;

    fn admin_config() -> AdminConfig {
        AdminConfig {
            username: "kades".into(),
            email: "kades@desa.id".into(),
            password: "s3cret".into(),
        }
    }

    fn viewer() -> Session {
        Session::new(User::new("view", "h", "v@desa.id", UserPermissions::none()))
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            Sha256Hasher.hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(Sha256Hasher.verify("abc", &Sha256Hasher.hash("abc")));
    }

    #[test]
    fn test_permission_flags() {
        let session = Session::new(User::new(
            "op",
            "h",
            "op@desa.id",
            UserPermissions {
                can_add: true,
                ..UserPermissions::none()
            },
        ));
        assert!(session.require(Action::Add).is_ok());
        assert!(matches!(
            session.require(Action::Delete),
            Err(AccessError::PermissionDenied { action: Action::Delete })
        ));
        assert!(session.require(Action::ManageUsers).is_err());
        assert!(session.user().hashed_password.is_empty());
    }

    #[test]
    fn test_super_admin_bypasses_flags() {
        let mut user = User::super_admin("root", "h", "r@desa.id");
        user.permissions = UserPermissions::none();
        let session = Session::new(user);
        assert!(session.require(Action::Delete).is_ok());
        assert!(session.require(Action::ManageUsers).is_ok());
    }

    #[tokio::test]
    async fn test_bootstrap_once_and_login() {
        let store = Store::in_memory().unwrap();
        assert!(ensure_super_admin(&store, &Sha256Hasher, &admin_config()).await.unwrap());
        assert!(!ensure_super_admin(&store, &Sha256Hasher, &admin_config()).await.unwrap());

        let by_name = authenticate(&store, &Sha256Hasher, "kades", "s3cret").await.unwrap();
        assert!(by_name.is_super_admin());
        let by_email = authenticate(&store, &Sha256Hasher, "KADES@desa.id", "s3cret").await.unwrap();
        assert_eq!(by_email.username(), "kades");

        let err = authenticate(&store, &Sha256Hasher, "kades", "wrong").await.unwrap_err();
        assert!(matches!(err, ServiceError::Access(AccessError::InvalidCredentials)));
        let err = authenticate(&store, &Sha256Hasher, "nobody", "x").await.unwrap_err();
        assert!(matches!(err, ServiceError::Access(AccessError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_bootstrap_skipped_without_password() {
        let store = Store::in_memory().unwrap();
        let unset = AdminConfig::default();
        assert!(!ensure_super_admin(&store, &Sha256Hasher, &unset).await.unwrap());
        assert!(store.list_users().await.unwrap().is_empty());

        let err = authenticate(&store, &Sha256Hasher, "admin", "").await.unwrap_err();
        assert!(matches!(err, ServiceError::Access(AccessError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_user_directory() {
        let store = Store::in_memory().unwrap();
        ensure_super_admin(&store, &Sha256Hasher, &admin_config()).await.unwrap();
        let root = authenticate(&store, &Sha256Hasher, "kades", "s3cret").await.unwrap();
        let directory = UserDirectory::new(store.clone(), Arc::new(Sha256Hasher));

        let added = directory
            .add_user(
                &root,
                NewUser {
                    username: "operator".into(),
                    password: "pw".into(),
                    email: "op@desa.id".into(),
                    permissions: UserPermissions::all(),
                },
            )
            .await
            .unwrap();
        assert!(!added.is_super_admin);
        assert!(added.hashed_password.is_empty());

        let operator = authenticate(&store, &Sha256Hasher, "operator", "pw").await.unwrap();
        assert!(directory.list_users(&operator).await.unwrap_err().is_permission_denied());

        let users = directory.list_users(&root).await.unwrap();
        assert_eq!(users.len(), 2);
        assert!(users.iter().all(|u| u.hashed_password.is_empty()));

        let err = directory.delete_user(&root, "kades").await.unwrap_err();
        assert!(matches!(err, ServiceError::Store(StoreError::Protected(_))));

        directory.delete_user(&root, "operator").await.unwrap();
        assert!(store.get_user("operator").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_user_validation() {
        let store = Store::in_memory().unwrap();
        ensure_super_admin(&store, &Sha256Hasher, &admin_config()).await.unwrap();
        let root = authenticate(&store, &Sha256Hasher, "kades", "s3cret").await.unwrap();
        let directory = UserDirectory::new(store, Arc::new(Sha256Hasher));

        let missing_email = NewUser {
            username: "x".into(),
            password: "pw".into(),
            email: " ".into(),
            permissions: UserPermissions::none(),
        };
        assert!(matches!(
            directory.add_user(&root, missing_email).await,
            Err(ServiceError::Invalid(_))
        ));

        let overwrite_admin = NewUser {
            username: "kades".into(),
            password: "pw".into(),
            email: "k@desa.id".into(),
            permissions: UserPermissions::none(),
        };
        assert!(matches!(
            directory.add_user(&root, overwrite_admin).await,
            Err(ServiceError::Store(StoreError::Protected(_)))
        ));

        assert!(directory.add_user(&viewer(), NewUser {
            username: "y".into(),
            password: "pw".into(),
            email: "y@desa.id".into(),
            permissions: UserPermissions::none(),
        }).await.unwrap_err().is_permission_denied());
    }
}
