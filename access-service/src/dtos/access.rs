use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::models::{Resource, RoleGrantResponse};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RoleSessionRequest {
    #[validate(range(min = 1, message = "role_id must be positive"))]
    #[schema(example = 3)]
    pub role_id: i64,

    /// Seconds; absent or non-positive selects the default hour.
    #[schema(example = 3600)]
    pub duration_seconds: Option<i32>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SessionDurationQuery {
    /// Seconds; absent or non-positive selects the default hour.
    #[param(example = 3600)]
    pub duration_seconds: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RoleSessionResponse {
    #[schema(example = "https://signin.aws.amazon.com/federation?Action=login&...")]
    pub url: String,
    #[schema(example = 3600)]
    pub expires_in: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleGrantListResponse {
    pub roles: Vec<RoleGrantResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResourceListResponse {
    pub resources: Vec<Resource>,
}
