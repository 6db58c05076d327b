//! Role grant model - an assumable cloud role made available to an
//! application role or, exceptionally, to a single principal.

use serde::Serialize;
use utoipa::ToSchema;

use super::Sensitivity;

/// Cloud role a caller may be federated into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrant {
    pub id: i64,
    /// Friendly label, e.g. "Prod ReadOnly".
    pub name: String,
    pub arn: String,
    pub description: String,
    /// Environment tag: "prod", "dev", "sandbox".
    pub env: String,
    pub risk_level: Sensitivity,
}

/// Grant as listed to its holder. The ARN is not exposed.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoleGrantResponse {
    pub id: i64,
    pub name: String,
    pub env: String,
    #[schema(example = "medium")]
    pub risk_level: String,
    pub description: String,
}

impl From<&RoleGrant> for RoleGrantResponse {
    fn from(g: &RoleGrant) -> Self {
        Self {
            id: g.id,
            name: g.name.clone(),
            env: g.env.clone(),
            risk_level: g.risk_level.to_string(),
            description: g.description.clone(),
        }
    }
}
