use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::admin::UpdateRoleRequest, middleware::AuthUser, models::RequestOrigin,
    utils::ValidatedJson, AppState,
};

/// Change a principal's application role (admin only)
#[utoipa::path(
    patch,
    path = "/users/{id}/role",
    params(("id" = i64, Path, description = "Principal id")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Updated principal", body = PrincipalResponse),
        (status = 400, description = "Unknown role", body = ErrorResponse),
        (status = 401, description = "Missing token or MFA not verified", body = ErrorResponse),
        (status = 403, description = "Admin role required", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    origin: RequestOrigin,
    Path(id): Path<i64>,
    ValidatedJson(req): ValidatedJson<UpdateRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state
        .admin_service
        .change_role(&identity, id, req, &origin)
        .await?;
    Ok((StatusCode::OK, Json(res)))
}
