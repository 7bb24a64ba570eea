//! Service error types.

use thiserror::Error;

use geosip_store::StoreError;

use crate::access::AccessError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Access(#[from] AccessError),

    /// Input rejected before any store call.
    #[error("invalid input: {0}")]
    Invalid(String),
}

impl ServiceError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    /// True when the caller lacked a capability.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, ServiceError::Access(AccessError::PermissionDenied { .. }))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
