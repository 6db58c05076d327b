//! Caller identity attached to a request once its session token checks out.

use crate::services::jwt::TokenTier;

use super::AppRole;

/// Immutable, request-scoped. Built by the auth middleware from token claims
/// and passed explicitly into services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub principal_id: i64,
    pub role: AppRole,
    pub tier: TokenTier,
}

impl Identity {
    /// True only for sessions that completed TOTP verification.
    pub fn is_trusted(&self) -> bool {
        self.tier == TokenTier::Trusted
    }

    pub fn is_admin(&self) -> bool {
        self.role == AppRole::Admin
    }
}
