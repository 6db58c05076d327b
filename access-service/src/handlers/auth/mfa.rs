use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::auth::MfaVerifyRequest, middleware::AuthUser, models::RequestOrigin,
    utils::ValidatedJson, AppState,
};

/// Issue a fresh TOTP secret for the caller
#[utoipa::path(
    post,
    path = "/auth/mfa/enroll",
    responses(
        (status = 200, description = "Secret and provisioning URI", body = MfaEnrollResponse),
        (status = 401, description = "Invalid or expired token", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "MFA",
    security(("bearer_auth" = []))
)]
pub async fn enroll(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    origin: RequestOrigin,
) -> Result<impl IntoResponse, AppError> {
    let res = state.session_service.enroll_mfa(&identity, &origin).await?;
    Ok((StatusCode::OK, Json(res)))
}

/// Verify a TOTP code and receive a trusted token
#[utoipa::path(
    post,
    path = "/auth/mfa/verify",
    request_body = MfaVerifyRequest,
    responses(
        (status = 200, description = "Trusted session issued", body = AuthResponse),
        (status = 400, description = "Missing code or MFA not enrolled", body = ErrorResponse),
        (status = 401, description = "Invalid code or token", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "MFA",
    security(("bearer_auth" = []))
)]
pub async fn verify(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    origin: RequestOrigin,
    ValidatedJson(req): ValidatedJson<MfaVerifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.session_service.verify_mfa(&identity, req, &origin).await?;
    Ok((StatusCode::OK, Json(res)))
}
