use axum::{extract::Request, middleware::Next, response::Response};
use service_core::error::AppError;

use crate::{models::Identity, services::ServiceError};

/// Runs after the auth and trusted-session layers.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, AppError> {
    match req.extensions().get::<Identity>() {
        Some(identity) if identity.is_admin() => Ok(next.run(req).await),
        Some(identity) => {
            tracing::warn!(
                user_id = identity.principal_id,
                role = %identity.role,
                "Admin route refused"
            );
            Err(ServiceError::AdminRequired.into())
        }
        None => Err(ServiceError::InvalidToken.into()),
    }
}
