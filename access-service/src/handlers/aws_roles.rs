use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::access::{RoleSessionRequest, SessionDurationQuery},
    middleware::AuthUser,
    models::RequestOrigin,
    utils::ValidatedJson,
    AppState,
};

/// List cloud roles the caller may assume
#[utoipa::path(
    get,
    path = "/me/aws/roles",
    responses(
        (status = 200, description = "Granted roles", body = RoleGrantListResponse),
        (status = 401, description = "Missing token or MFA not verified", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "AWS",
    security(("bearer_auth" = []))
)]
pub async fn list_roles(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let res = state.access_service.list_role_grants(&identity).await?;
    Ok((StatusCode::OK, Json(res)))
}

/// Federated console session for a granted role
#[utoipa::path(
    post,
    path = "/me/aws/roles/{role_id}/session",
    params(
        ("role_id" = i64, Path, description = "Granted role id"),
        SessionDurationQuery
    ),
    responses(
        (status = 200, description = "Console sign-in URL", body = RoleSessionResponse),
        (status = 401, description = "Missing token or MFA not verified", body = ErrorResponse),
        (status = 403, description = "Denied by policy", body = ErrorResponse),
        (status = 404, description = "Role not found", body = ErrorResponse),
        (status = 500, description = "Failed to create session", body = ErrorResponse)
    ),
    tag = "AWS",
    security(("bearer_auth" = []))
)]
pub async fn create_role_session(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    origin: RequestOrigin,
    Path(role_id): Path<i64>,
    Query(query): Query<SessionDurationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let res = state
        .access_service
        .create_role_session(&identity, role_id, query.duration_seconds, &origin)
        .await?;
    Ok((StatusCode::OK, Json(res)))
}

/// Federated console session, role id in the body
#[utoipa::path(
    post,
    path = "/aws-role-session",
    request_body = RoleSessionRequest,
    responses(
        (status = 200, description = "Console sign-in URL", body = RoleSessionResponse),
        (status = 400, description = "Invalid body", body = ErrorResponse),
        (status = 401, description = "Missing token or MFA not verified", body = ErrorResponse),
        (status = 403, description = "Denied by policy", body = ErrorResponse),
        (status = 404, description = "Role not found", body = ErrorResponse),
        (status = 500, description = "Failed to create session", body = ErrorResponse)
    ),
    tag = "AWS",
    security(("bearer_auth" = []))
)]
pub async fn role_session(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    origin: RequestOrigin,
    ValidatedJson(req): ValidatedJson<RoleSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state
        .access_service
        .create_role_session(&identity, req.role_id, req.duration_seconds, &origin)
        .await?;
    Ok((StatusCode::OK, Json(res)))
}
