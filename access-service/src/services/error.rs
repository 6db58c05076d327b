use service_core::error::AppError;
use thiserror::Error;

use super::federation::FederationError;

/// Public message for every federation failure.
pub const FEDERATION_FAILED: &str = "failed to create session";

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("Invalid token")]
    InvalidToken,

    #[error("MFA verification required")]
    MfaRequired,

    #[error("MFA not enrolled")]
    MfaNotEnrolled,

    #[error("Invalid MFA code")]
    InvalidMfaCode,

    #[error("User not found")]
    UserNotFound,

    /// Unknown role id, or one the caller holds no grant for. Both read the same.
    #[error("Role not found")]
    RoleNotFound,

    #[error("Access denied by policy {policy}: {reason}")]
    PolicyDenied {
        policy: &'static str,
        reason: &'static str,
    },

    #[error("Admin role required")]
    AdminRequired,

    #[error("Federation error: {0}")]
    Federation(#[from] FederationError),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::Validation(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            ServiceError::InvalidCredentials => {
                AppError::AuthError(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::EmailAlreadyRegistered => {
                AppError::Conflict(anyhow::anyhow!("Email already registered"))
            }
            ServiceError::InvalidToken => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token"))
            }
            ServiceError::MfaRequired => {
                AppError::Unauthorized(anyhow::anyhow!("MFA verification required"))
            }
            ServiceError::MfaNotEnrolled => AppError::BadRequest(anyhow::anyhow!("MFA not enrolled")),
            ServiceError::InvalidMfaCode => AppError::AuthError(anyhow::anyhow!("Invalid MFA code")),
            ServiceError::UserNotFound => AppError::NotFound(anyhow::anyhow!("User not found")),
            ServiceError::RoleNotFound => AppError::NotFound(anyhow::anyhow!("Role not found")),
            ServiceError::PolicyDenied { policy, reason } => {
                AppError::Forbidden(anyhow::anyhow!("access denied by {}: {}", policy, reason))
            }
            ServiceError::AdminRequired => AppError::Forbidden(anyhow::anyhow!("Admin role required")),
            ServiceError::Federation(e) => AppError::Opaque {
                public: FEDERATION_FAILED,
                source: anyhow::Error::new(e),
            },
        }
    }
}
