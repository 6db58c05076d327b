use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::{models::{AppRole, Identity}, services::ServiceError, AppState};

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Validate the bearer token (either tier) and attach the caller's
/// [`Identity`] to the request.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req).ok_or_else(|| {
        AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header"))
    })?;

    let claims = state.jwt.validate(token)?;
    let identity = Identity {
        principal_id: claims.principal_id()?,
        role: AppRole::from(claims.role),
        tier: claims.tier,
    };

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Runs after [`auth_middleware`]; only trusted (MFA-verified) sessions pass.
pub async fn require_trusted(req: Request, next: Next) -> Result<Response, AppError> {
    match req.extensions().get::<Identity>() {
        Some(identity) if identity.is_trusted() => Ok(next.run(req).await),
        Some(identity) => {
            tracing::warn!(
                user_id = identity.principal_id,
                path = %req.uri().path(),
                "Provisional token used on trusted route"
            );
            Err(ServiceError::MfaRequired.into())
        }
        None => Err(ServiceError::InvalidToken.into()),
    }
}

/// Extractor for the identity placed by [`auth_middleware`].
pub struct AuthUser(pub Identity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!(
                    "Identity missing from request extensions"
                ))
            })
    }
}
