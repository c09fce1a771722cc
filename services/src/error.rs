use sea_orm::DbErr;
use thiserror::Error;

/// Error taxonomy shared by every service in this crate.
///
/// Validation, not-found and conflict errors travel back to the caller with a
/// descriptive reason. Sync and replay failures are capped-retried and end up
/// as device state or queue state, never as a fatal error to the admin caller.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("sync error: {0}")]
    Sync(String),

    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    #[error("database error: {0}")]
    Db(#[from] DbErr),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ServiceError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ServiceError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ServiceError::Conflict(msg.into())
    }

    pub fn sync(msg: impl Into<String>) -> Self {
        ServiceError::Sync(msg.into())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
