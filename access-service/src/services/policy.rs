//! Access policy decision engine.
//!
//! Every resource/action request is evaluated against an ordered list of
//! guard rules. The first rule that returns a decision wins; when none does,
//! the request falls through to `default-allow`. Evaluation is a pure
//! function of the [`AccessRequest`]: no I/O, no clock, no shared state.
//!
//! New rules only take effect when placed before the default, and the
//! high-sensitivity gates must stay first.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Action, AppRole, Sensitivity, AWS_ROLE_RESOURCE_TYPE};

/// Names of the rules, as recorded in the audit trail.
pub mod policies {
    pub const HIGH_SENSITIVITY_ADMIN_ONLY: &str = "high-sensitivity-admin-only";
    pub const HIGH_SENSITIVITY_MFA_REQUIRED: &str = "high-sensitivity-mfa-required";
    pub const AWS_NON_PRIVILEGED_DENY: &str = "aws-non-privileged-deny";
    pub const USER_READ_ONLY: &str = "user-read-only";
    pub const DEFAULT_ALLOW: &str = "default-allow";
}

/// Everything the engine needs to decide one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    pub principal_id: i64,
    pub role: AppRole,
    /// True only when the caller holds a trusted (MFA-verified) session.
    pub mfa_verified: bool,
    pub resource_name: String,
    pub resource_type: String,
    pub sensitivity: Sensitivity,
    pub action: Action,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of an evaluation. Every decision names the rule that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub policy: &'static str,
    pub reason: &'static str,
}

impl Decision {
    const fn deny(policy: &'static str, reason: &'static str) -> Self {
        Self {
            allowed: false,
            policy,
            reason,
        }
    }
}

const DEFAULT_ALLOW: Decision = Decision {
    allowed: true,
    policy: policies::DEFAULT_ALLOW,
    reason: "policy conditions satisfied",
};

type Rule = fn(&AccessRequest) -> Option<Decision>;

/// Evaluation order. Order is the security property; do not sort.
const RULES: &[Rule] = &[
    high_sensitivity_admin_only,
    high_sensitivity_mfa_required,
    aws_non_privileged_deny,
    user_read_only,
];

/// Decide whether `request` is allowed.
pub fn evaluate(request: &AccessRequest) -> Decision {
    RULES
        .iter()
        .find_map(|rule| rule(request))
        .unwrap_or(DEFAULT_ALLOW)
}

fn high_sensitivity_admin_only(req: &AccessRequest) -> Option<Decision> {
    (req.sensitivity == Sensitivity::High && req.role != AppRole::Admin).then_some(Decision::deny(
        policies::HIGH_SENSITIVITY_ADMIN_ONLY,
        "only admins may access high sensitivity resources",
    ))
}

fn high_sensitivity_mfa_required(req: &AccessRequest) -> Option<Decision> {
    (req.sensitivity == Sensitivity::High && !req.mfa_verified).then_some(Decision::deny(
        policies::HIGH_SENSITIVITY_MFA_REQUIRED,
        "MFA is required for high sensitivity access",
    ))
}

fn aws_non_privileged_deny(req: &AccessRequest) -> Option<Decision> {
    (req.resource_type == AWS_ROLE_RESOURCE_TYPE && req.role == AppRole::User).then_some(
        Decision::deny(
            policies::AWS_NON_PRIVILEGED_DENY,
            "regular users cannot assume AWS roles",
        ),
    )
}

fn user_read_only(req: &AccessRequest) -> Option<Decision> {
    (req.role == AppRole::User && req.action != Action::Read).then_some(Decision::deny(
        policies::USER_READ_ONLY,
        "users are limited to read-only access",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(role: &str, sensitivity: &str, resource_type: &str, action: &str, mfa: bool) -> AccessRequest {
        AccessRequest {
            principal_id: 7,
            role: AppRole::from(role),
            mfa_verified: mfa,
            resource_name: "payroll-db".to_string(),
            resource_type: resource_type.to_string(),
            sensitivity: Sensitivity::from(sensitivity),
            action: Action::from(action),
            timestamp: Utc::now(),
        }
    }

    const ROLES: &[&str] = &["admin", "user", "devops", "auditor"];
    const SENSITIVITIES: &[&str] = &["low", "medium", "high", "critical"];
    const TYPES: &[&str] = &["database", "aws_role", "s3_bucket"];
    const ACTIONS: &[&str] = &["read", "write", "assume", "delete"];

    fn all_requests() -> Vec<AccessRequest> {
        let mut out = Vec::new();
        for role in ROLES {
            for sensitivity in SENSITIVITIES {
                for resource_type in TYPES {
                    for action in ACTIONS {
                        for mfa in [true, false] {
                            out.push(request(role, sensitivity, resource_type, action, mfa));
                        }
                    }
                }
            }
        }
        out
    }

    #[test]
    fn high_sensitivity_requires_admin() {
        for req in all_requests() {
            if req.sensitivity == Sensitivity::High && req.role != AppRole::Admin {
                let d = evaluate(&req);
                assert!(!d.allowed, "{req:?}");
                assert_eq!(d.policy, policies::HIGH_SENSITIVITY_ADMIN_ONLY);
            }
        }
    }

    #[test]
    fn high_sensitivity_admin_requires_mfa() {
        for req in all_requests() {
            if req.sensitivity == Sensitivity::High && req.role == AppRole::Admin && !req.mfa_verified {
                let d = evaluate(&req);
                assert!(!d.allowed);
                assert_eq!(d.policy, policies::HIGH_SENSITIVITY_MFA_REQUIRED);
            }
        }
    }

    #[test]
    fn users_never_assume_cloud_roles_below_high() {
        for req in all_requests() {
            if req.role == AppRole::User
                && req.resource_type == "aws_role"
                && req.sensitivity != Sensitivity::High
            {
                let d = evaluate(&req);
                assert!(!d.allowed);
                assert_eq!(d.policy, policies::AWS_NON_PRIVILEGED_DENY, "{req:?}");
            }
        }
    }

    #[test]
    fn users_are_read_only_elsewhere() {
        for req in all_requests() {
            if req.role == AppRole::User
                && req.action != Action::Read
                && req.resource_type != "aws_role"
                && req.sensitivity != Sensitivity::High
            {
                let d = evaluate(&req);
                assert!(!d.allowed);
                assert_eq!(d.policy, policies::USER_READ_ONLY);
            }
        }
    }

    #[test]
    fn everything_else_is_default_allow() {
        for req in all_requests() {
            let gated = (req.sensitivity == Sensitivity::High
                && (req.role != AppRole::Admin || !req.mfa_verified))
                || (req.role == AppRole::User
                    && (req.resource_type == "aws_role" || req.action != Action::Read));
            if !gated {
                let d = evaluate(&req);
                assert!(d.allowed, "{req:?}");
                assert_eq!(d.policy, policies::DEFAULT_ALLOW);
            }
        }
    }

    #[test]
    fn denials_always_explain_themselves() {
        for req in all_requests() {
            let d = evaluate(&req);
            assert!(!d.policy.is_empty());
            assert!(!d.reason.is_empty());
        }
    }

    #[test]
    fn evaluation_is_deterministic() {
        for req in all_requests() {
            assert_eq!(evaluate(&req), evaluate(&req.clone()));
        }
    }

    #[test]
    fn scenario_user_low_read_is_allowed() {
        let d = evaluate(&request("user", "low", "database", "read", true));
        assert_eq!((d.allowed, d.policy), (true, policies::DEFAULT_ALLOW));
    }

    #[test]
    fn scenario_user_low_write_is_read_only() {
        let d = evaluate(&request("user", "low", "database", "write", true));
        assert_eq!((d.allowed, d.policy), (false, policies::USER_READ_ONLY));
    }

    #[test]
    fn scenario_admin_high_with_mfa_is_allowed() {
        let d = evaluate(&request("admin", "high", "database", "write", true));
        assert_eq!((d.allowed, d.policy), (true, policies::DEFAULT_ALLOW));
    }

    #[test]
    fn unknown_sensitivity_falls_through_to_default() {
        let d = evaluate(&request("devops", "top-secret", "database", "write", false));
        assert_eq!((d.allowed, d.policy), (true, policies::DEFAULT_ALLOW));
    }

    #[test]
    fn unknown_action_is_not_special_cased() {
        let d = evaluate(&request("admin", "medium", "database", "purge", false));
        assert!(d.allowed);
        // ...but still counts as "not read" for users.
        let d = evaluate(&request("user", "medium", "database", "purge", false));
        assert_eq!(d.policy, policies::USER_READ_ONLY);
    }

    #[test]
    fn high_gate_precedes_cloud_role_gate() {
        let d = evaluate(&request("user", "high", "aws_role", "assume", true));
        assert_eq!(d.policy, policies::HIGH_SENSITIVITY_ADMIN_ONLY);
    }
}
