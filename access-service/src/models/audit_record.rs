//! Audit record model - one row per authorization outcome or session event.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::services::policy::Decision;

use super::{Action, AppRole};

/// What produced the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    AccessDecision,
    Signup,
    Login,
    MfaEnroll,
    MfaVerify,
    RoleChange,
    FederationIssued,
    FederationFailed,
}

impl AuditEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventKind::AccessDecision => "access_decision",
            AuditEventKind::Signup => "signup",
            AuditEventKind::Login => "login",
            AuditEventKind::MfaEnroll => "mfa_enroll",
            AuditEventKind::MfaVerify => "mfa_verify",
            AuditEventKind::RoleChange => "role_change",
            AuditEventKind::FederationIssued => "federation_issued",
            AuditEventKind::FederationFailed => "federation_failed",
        }
    }
}

/// Where the triggering request came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOrigin {
    pub path: String,
    pub method: String,
    pub ip: Option<String>,
}

impl RequestOrigin {
    pub fn new(method: impl Into<String>, path: impl Into<String>, ip: Option<String>) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
            ip,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub event: AuditEventKind,
    pub principal_id: Option<i64>,
    pub role: Option<String>,
    pub resource_name: String,
    pub action: String,
    pub allowed: bool,
    pub policy_name: String,
    pub reason: String,
    pub path: String,
    pub method: String,
    pub ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Record for a policy evaluation.
    pub fn decision(
        principal_id: i64,
        role: &AppRole,
        resource_name: &str,
        action: &Action,
        decision: &Decision,
        origin: &RequestOrigin,
    ) -> Self {
        Self {
            event: AuditEventKind::AccessDecision,
            principal_id: Some(principal_id),
            role: Some(role.to_string()),
            resource_name: resource_name.to_string(),
            action: action.to_string(),
            allowed: decision.allowed,
            policy_name: decision.policy.to_string(),
            reason: decision.reason.to_string(),
            path: origin.path.clone(),
            method: origin.method.clone(),
            ip: origin.ip.clone(),
            created_at: Utc::now(),
        }
    }

    /// Record for a session or federation event. `label` names the check
    /// that produced the outcome, playing the role a policy name plays for
    /// access decisions.
    #[allow(clippy::too_many_arguments)]
    pub fn event(
        event: AuditEventKind,
        principal_id: Option<i64>,
        role: Option<&AppRole>,
        resource_name: &str,
        allowed: bool,
        label: &str,
        reason: impl Into<String>,
        origin: &RequestOrigin,
    ) -> Self {
        Self {
            event,
            principal_id,
            role: role.map(ToString::to_string),
            resource_name: resource_name.to_string(),
            action: event.as_str().to_string(),
            allowed,
            policy_name: label.to_string(),
            reason: reason.into(),
            path: origin.path.clone(),
            method: origin.method.clone(),
            ip: origin.ip.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn decision_label(&self) -> &'static str {
        if self.allowed {
            "allow"
        } else {
            "deny"
        }
    }
}
