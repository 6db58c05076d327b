//! Principal model - an identity that signs in and requests access.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Coarse-grained application role.
///
/// Unknown role strings are carried through as `Other` so the policy engine
/// can reason about them instead of failing to deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AppRole {
    Admin,
    User,
    Devops,
    Other(String),
}

impl AppRole {
    pub fn as_str(&self) -> &str {
        match self {
            AppRole::Admin => "admin",
            AppRole::User => "user",
            AppRole::Devops => "devops",
            AppRole::Other(s) => s,
        }
    }

    /// Roles an administrator may assign.
    pub fn is_assignable(&self) -> bool {
        !matches!(self, AppRole::Other(_))
    }
}

impl From<&str> for AppRole {
    fn from(s: &str) -> Self {
        match s {
            "admin" => AppRole::Admin,
            "user" => AppRole::User,
            "devops" => AppRole::Devops,
            other => AppRole::Other(other.to_string()),
        }
    }
}

impl From<String> for AppRole {
    fn from(s: String) -> Self {
        AppRole::from(s.as_str())
    }
}

impl From<AppRole> for String {
    fn from(role: AppRole) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for AppRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a principal is in TOTP enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MfaState {
    NotEnrolled,
    EnrolledUnverified,
    EnrolledVerified,
}

/// Principal record as held by the store.
#[derive(Clone)]
pub struct Principal {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub role: AppRole,
    pub password_hash: String,
    pub mfa_enabled: bool,
    pub mfa_secret: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Principal {
    pub fn mfa_state(&self) -> MfaState {
        match (self.mfa_secret.as_deref(), self.mfa_enabled) {
            (None, _) | (Some(""), _) => MfaState::NotEnrolled,
            (Some(_), false) => MfaState::EnrolledUnverified,
            (Some(_), true) => MfaState::EnrolledVerified,
        }
    }

    /// Login must send the caller through enrollment when no secret exists yet.
    pub fn enrollment_required(&self) -> bool {
        self.mfa_state() == MfaState::NotEnrolled
    }

    pub fn sanitized(&self) -> PrincipalResponse {
        PrincipalResponse::from(self)
    }
}

// Credential material stays out of logs.
impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("mfa_state", &self.mfa_state())
            .finish_non_exhaustive()
    }
}

/// Fields supplied at signup; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub email: String,
    pub full_name: String,
    pub role: AppRole,
    pub password_hash: String,
}

/// Principal as returned to API callers.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PrincipalResponse {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    #[schema(example = "user")]
    pub role: String,
    pub mfa_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Principal> for PrincipalResponse {
    fn from(p: &Principal) -> Self {
        Self {
            id: p.id,
            email: p.email.clone(),
            full_name: p.full_name.clone(),
            role: p.role.to_string(),
            mfa_enabled: p.mfa_state() == MfaState::EnrolledVerified,
            created_at: p.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(secret: Option<&str>, enabled: bool) -> Principal {
        Principal {
            id: 1,
            email: "a@example.com".to_string(),
            full_name: "A".to_string(),
            role: AppRole::User,
            password_hash: "$argon2id$stub".to_string(),
            mfa_enabled: enabled,
            mfa_secret: secret.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn mfa_state_follows_secret_and_flag() {
        assert_eq!(principal(None, false).mfa_state(), MfaState::NotEnrolled);
        assert_eq!(principal(Some(""), true).mfa_state(), MfaState::NotEnrolled);
        assert_eq!(
            principal(Some("JBSWY3DP"), false).mfa_state(),
            MfaState::EnrolledUnverified
        );
        assert_eq!(
            principal(Some("JBSWY3DP"), true).mfa_state(),
            MfaState::EnrolledVerified
        );
    }

    #[test]
    fn role_round_trips_through_strings() {
        assert_eq!(AppRole::from("admin"), AppRole::Admin);
        assert_eq!(AppRole::from("auditor"), AppRole::Other("auditor".into()));
        assert_eq!(String::from(AppRole::Devops), "devops");
        assert!(!AppRole::from("auditor").is_assignable());
    }

    #[test]
    fn debug_omits_credentials() {
        let rendered = format!("{:?}", principal(Some("JBSWY3DP"), true));
        assert!(!rendered.contains("argon2"));
        assert!(!rendered.contains("JBSWY3DP"));
    }
}
