//! Domain models for access-service.

pub mod audit_record;
pub mod identity;
pub mod principal;
pub mod resource;
pub mod role_grant;

pub use audit_record::{AuditEventKind, AuditRecord, RequestOrigin};
pub use identity::Identity;
pub use principal::{AppRole, MfaState, NewPrincipal, Principal, PrincipalResponse};
pub use resource::{Action, Resource, Sensitivity, AWS_ROLE_RESOURCE_TYPE};
pub use role_grant::{RoleGrant, RoleGrantResponse};
