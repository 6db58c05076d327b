//! Principal/role store and audit sink seams.
//!
//! `Database` implements both over Postgres; the in-memory mocks below back
//! the test suite.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::models::{AppRole, AuditRecord, NewPrincipal, Principal, Resource, RoleGrant};

use super::ServiceError;

#[async_trait]
pub trait PrincipalStore: Send + Sync {
    async fn health_check(&self) -> Result<(), ServiceError>;

    /// Exact match. Emails are stored lowercased and callers normalize first.
    async fn find_principal_by_email(&self, email: &str) -> Result<Option<Principal>, ServiceError>;

    async fn find_principal_by_id(&self, id: i64) -> Result<Option<Principal>, ServiceError>;

    /// Returns `None` when the email is already registered.
    async fn insert_principal(&self, new: NewPrincipal) -> Result<Option<Principal>, ServiceError>;

    /// Store a fresh TOTP secret. Always leaves MFA disabled until verified.
    async fn set_mfa_secret(&self, id: i64, secret: &str) -> Result<(), ServiceError>;

    /// Mark MFA verified, but only while `secret` is still the stored one.
    /// Returns `false` when the secret was replaced in the meantime.
    async fn enable_mfa(&self, id: i64, secret: &str) -> Result<bool, ServiceError>;

    async fn update_role(&self, id: i64, role: &AppRole) -> Result<Option<Principal>, ServiceError>;

    /// Grants held by `role`, plus any assigned directly to `principal_id`.
    async fn role_grants_for(
        &self,
        principal_id: i64,
        role: &AppRole,
    ) -> Result<Vec<RoleGrant>, ServiceError>;

    /// Resources granted for reading to `role` or directly to `principal_id`.
    async fn resources_visible_to(
        &self,
        principal_id: i64,
        role: &AppRole,
    ) -> Result<Vec<Resource>, ServiceError>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &AuditRecord) -> Result<(), anyhow::Error>;
}

/// Who a grant is issued to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignee {
    Role(AppRole),
    Principal(i64),
}

impl Assignee {
    fn covers(&self, principal_id: i64, role: &AppRole) -> bool {
        match self {
            Assignee::Role(r) => r == role,
            Assignee::Principal(id) => *id == principal_id,
        }
    }
}

#[derive(Default)]
pub struct MockPrincipalStore {
    pub principals: Mutex<Vec<Principal>>,
    pub grants: Mutex<Vec<(Assignee, RoleGrant)>>,
    pub resources: Mutex<Vec<(Assignee, Resource)>>,
    pub unhealthy: AtomicBool,
    next_id: AtomicI64,
}

impl MockPrincipalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_grant(mut self, assignee: Assignee, grant: RoleGrant) -> Self {
        if let Ok(grants) = self.grants.get_mut() {
            grants.push((assignee, grant));
        }
        self
    }

    pub fn with_resource(mut self, assignee: Assignee, resource: Resource) -> Self {
        if let Ok(resources) = self.resources.get_mut() {
            resources.push((assignee, resource));
        }
        self
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, ServiceError> {
    mutex
        .lock()
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Mock store mutex poisoned: {}", e)))
}

#[async_trait]
impl PrincipalStore for MockPrincipalStore {
    async fn health_check(&self) -> Result<(), ServiceError> {
        if self.unhealthy.load(Ordering::SeqCst) {
            return Err(ServiceError::Internal(anyhow::anyhow!("store unavailable")));
        }
        Ok(())
    }

    async fn find_principal_by_email(&self, email: &str) -> Result<Option<Principal>, ServiceError> {
        let principals = lock(&self.principals)?;
        Ok(principals
            .iter()
            .find(|p| p.email == email)
            .cloned())
    }

    async fn find_principal_by_id(&self, id: i64) -> Result<Option<Principal>, ServiceError> {
        let principals = lock(&self.principals)?;
        Ok(principals.iter().find(|p| p.id == id).cloned())
    }

    async fn insert_principal(&self, new: NewPrincipal) -> Result<Option<Principal>, ServiceError> {
        let mut principals = lock(&self.principals)?;
        if principals.iter().any(|p| p.email.eq_ignore_ascii_case(&new.email)) {
            return Ok(None);
        }

        let principal = Principal {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            email: new.email,
            full_name: new.full_name,
            role: new.role,
            password_hash: new.password_hash,
            mfa_enabled: false,
            mfa_secret: None,
            created_at: Utc::now(),
        };
        principals.push(principal.clone());
        Ok(Some(principal))
    }

    async fn set_mfa_secret(&self, id: i64, secret: &str) -> Result<(), ServiceError> {
        let mut principals = lock(&self.principals)?;
        let principal = principals
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(ServiceError::UserNotFound)?;
        principal.mfa_secret = Some(secret.to_string());
        principal.mfa_enabled = false;
        Ok(())
    }

    async fn enable_mfa(&self, id: i64, secret: &str) -> Result<bool, ServiceError> {
        let mut principals = lock(&self.principals)?;
        let principal = principals
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(ServiceError::UserNotFound)?;
        if principal.mfa_secret.as_deref() != Some(secret) {
            return Ok(false);
        }
        principal.mfa_enabled = true;
        Ok(true)
    }

    async fn update_role(&self, id: i64, role: &AppRole) -> Result<Option<Principal>, ServiceError> {
        let mut principals = lock(&self.principals)?;
        Ok(principals.iter_mut().find(|p| p.id == id).map(|p| {
            p.role = role.clone();
            p.clone()
        }))
    }

    async fn role_grants_for(
        &self,
        principal_id: i64,
        role: &AppRole,
    ) -> Result<Vec<RoleGrant>, ServiceError> {
        let grants = lock(&self.grants)?;
        let mut out: Vec<RoleGrant> = Vec::new();
        for (assignee, grant) in grants.iter() {
            if assignee.covers(principal_id, role) && !out.iter().any(|g| g.id == grant.id) {
                out.push(grant.clone());
            }
        }
        Ok(out)
    }

    async fn resources_visible_to(
        &self,
        principal_id: i64,
        role: &AppRole,
    ) -> Result<Vec<Resource>, ServiceError> {
        let resources = lock(&self.resources)?;
        let mut out: Vec<Resource> = Vec::new();
        for (assignee, resource) in resources.iter() {
            if assignee.covers(principal_id, role) && !out.iter().any(|r| r.id == resource.id) {
                out.push(resource.clone());
            }
        }
        Ok(out)
    }
}

/// Audit sink that keeps records in memory. Can be told to fail.
#[derive(Default)]
pub struct RecordingAuditSink {
    pub records: Mutex<Vec<AuditRecord>>,
    pub failing: AtomicBool,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<(), anyhow::Error> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("audit sink unavailable");
        }
        self.records
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock audit mutex poisoned: {}", e))?
            .push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sensitivity;

    fn grant(id: i64) -> RoleGrant {
        RoleGrant {
            id,
            name: format!("role-{id}"),
            arn: format!("arn:aws:iam::123456789012:role/r{id}"),
            description: String::new(),
            env: "dev".to_string(),
            risk_level: Sensitivity::Low,
        }
    }

    fn new_principal(email: &str) -> NewPrincipal {
        NewPrincipal {
            email: email.to_string(),
            full_name: "Test".to_string(),
            role: AppRole::User,
            password_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_not_inserted() {
        let store = MockPrincipalStore::new();
        assert!(store.insert_principal(new_principal("a@x.io")).await.unwrap().is_some());
        assert!(store.insert_principal(new_principal("A@x.io")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn re_enrollment_disables_mfa() {
        let store = MockPrincipalStore::new();
        let p = store.insert_principal(new_principal("a@x.io")).await.unwrap().unwrap();
        store.set_mfa_secret(p.id, "AAAA").await.unwrap();
        assert!(store.enable_mfa(p.id, "AAAA").await.unwrap());
        store.set_mfa_secret(p.id, "BBBB").await.unwrap();

        let p = store.find_principal_by_id(p.id).await.unwrap().unwrap();
        assert!(!p.mfa_enabled);
        assert_eq!(p.mfa_secret.as_deref(), Some("BBBB"));
    }

    #[tokio::test]
    async fn enable_mfa_refuses_a_replaced_secret() {
        let store = MockPrincipalStore::new();
        let p = store.insert_principal(new_principal("a@x.io")).await.unwrap().unwrap();
        store.set_mfa_secret(p.id, "AAAA").await.unwrap();
        store.set_mfa_secret(p.id, "BBBB").await.unwrap();

        assert!(!store.enable_mfa(p.id, "AAAA").await.unwrap());
        let stored = store.find_principal_by_id(p.id).await.unwrap().unwrap();
        assert!(!stored.mfa_enabled);
        assert_eq!(stored.mfa_secret.as_deref(), Some("BBBB"));

        assert!(store.enable_mfa(p.id, "BBBB").await.unwrap());
        assert!(matches!(
            store.enable_mfa(999, "BBBB").await,
            Err(ServiceError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn grants_merge_role_and_direct_assignments() {
        let store = MockPrincipalStore::new()
            .with_grant(Assignee::Role(AppRole::Devops), grant(1))
            .with_grant(Assignee::Principal(9), grant(2))
            .with_grant(Assignee::Principal(9), grant(1))
            .with_grant(Assignee::Role(AppRole::Admin), grant(3));

        let ids: Vec<i64> = store
            .role_grants_for(9, &AppRole::Devops)
            .await
            .unwrap()
            .iter()
            .map(|g| g.id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
