use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{middleware::AuthUser, models::RequestOrigin, AppState};

/// Resources the caller may read
#[utoipa::path(
    get,
    path = "/resources",
    responses(
        (status = 200, description = "Readable resources", body = ResourceListResponse),
        (status = 401, description = "Missing token or MFA not verified", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Resources",
    security(("bearer_auth" = []))
)]
pub async fn list_resources(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    origin: RequestOrigin,
) -> Result<impl IntoResponse, AppError> {
    let res = state.access_service.list_resources(&identity, &origin).await?;
    Ok((StatusCode::OK, Json(res)))
}
