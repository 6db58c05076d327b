//! Authorized operations for signed-in principals: role grant listing,
//! federated role sessions and the policy-filtered resource list.

use chrono::Utc;
use std::sync::Arc;

use crate::{
    dtos::access::{ResourceListResponse, RoleGrantListResponse, RoleSessionResponse},
    models::{
        Action, AuditEventKind, AuditRecord, Identity, RequestOrigin, RoleGrantResponse,
        AWS_ROLE_RESOURCE_TYPE,
    },
    services::{
        policy::{self, AccessRequest},
        AuditEmitter, FederationService, PrincipalStore, ServiceError,
    },
};

#[derive(Clone)]
pub struct AccessService {
    store: Arc<dyn PrincipalStore>,
    federation: FederationService,
    audit: AuditEmitter,
}

impl AccessService {
    pub fn new(
        store: Arc<dyn PrincipalStore>,
        federation: FederationService,
        audit: AuditEmitter,
    ) -> Self {
        Self {
            store,
            federation,
            audit,
        }
    }

    pub async fn list_role_grants(
        &self,
        identity: &Identity,
    ) -> Result<RoleGrantListResponse, ServiceError> {
        let grants = self
            .store
            .role_grants_for(identity.principal_id, &identity.role)
            .await?;

        Ok(RoleGrantListResponse {
            roles: grants.iter().map(RoleGrantResponse::from).collect(),
        })
    }

    /// Grant lookup, then policy, then federation. Unknown and unheld role
    /// ids both end as not-found before any provider call.
    pub async fn create_role_session(
        &self,
        identity: &Identity,
        role_id: i64,
        duration_seconds: Option<i32>,
        origin: &RequestOrigin,
    ) -> Result<RoleSessionResponse, ServiceError> {
        let grant = self
            .store
            .role_grants_for(identity.principal_id, &identity.role)
            .await?
            .into_iter()
            .find(|g| g.id == role_id)
            .ok_or_else(|| {
                tracing::warn!(
                    user_id = identity.principal_id,
                    role_id,
                    "Role session requested for ungranted role"
                );
                ServiceError::RoleNotFound
            })?;

        let request = AccessRequest {
            principal_id: identity.principal_id,
            role: identity.role.clone(),
            mfa_verified: identity.is_trusted(),
            resource_name: grant.name.clone(),
            resource_type: AWS_ROLE_RESOURCE_TYPE.to_string(),
            sensitivity: grant.risk_level.clone(),
            action: Action::Assume,
            timestamp: Utc::now(),
        };
        let decision = policy::evaluate(&request);

        self.audit.emit(AuditRecord::decision(
            identity.principal_id,
            &identity.role,
            &grant.name,
            &Action::Assume,
            &decision,
            origin,
        ));

        if !decision.allowed {
            return Err(ServiceError::PolicyDenied {
                policy: decision.policy,
                reason: decision.reason,
            });
        }

        match self
            .federation
            .issue_external_session(identity.principal_id, &grant, duration_seconds)
            .await
        {
            Ok(session) => {
                self.audit.emit(AuditRecord::event(
                    AuditEventKind::FederationIssued,
                    Some(identity.principal_id),
                    Some(&identity.role),
                    &grant.name,
                    true,
                    decision.policy,
                    format!("console session issued for {}s", session.duration_seconds),
                    origin,
                ));
                Ok(RoleSessionResponse {
                    url: session.url,
                    expires_in: session.duration_seconds,
                })
            }
            Err(e) => {
                tracing::error!(
                    user_id = identity.principal_id,
                    role_id = grant.id,
                    error = %e,
                    "Federation failed"
                );
                self.audit.emit(AuditRecord::event(
                    AuditEventKind::FederationFailed,
                    Some(identity.principal_id),
                    Some(&identity.role),
                    &grant.name,
                    false,
                    "federation",
                    e.to_string(),
                    origin,
                ));
                Err(ServiceError::Federation(e))
            }
        }
    }

    /// Resources visible to the caller that the policy lets them read.
    /// Every evaluation is audited.
    pub async fn list_resources(
        &self,
        identity: &Identity,
        origin: &RequestOrigin,
    ) -> Result<ResourceListResponse, ServiceError> {
        let candidates = self
            .store
            .resources_visible_to(identity.principal_id, &identity.role)
            .await?;

        let now = Utc::now();
        let mut resources = Vec::with_capacity(candidates.len());
        for resource in candidates {
            let decision = policy::evaluate(&AccessRequest {
                principal_id: identity.principal_id,
                role: identity.role.clone(),
                mfa_verified: identity.is_trusted(),
                resource_name: resource.name.clone(),
                resource_type: resource.resource_type.clone(),
                sensitivity: resource.sensitivity.clone(),
                action: Action::Read,
                timestamp: now,
            });

            self.audit.emit(AuditRecord::decision(
                identity.principal_id,
                &identity.role,
                &resource.name,
                &Action::Read,
                &decision,
                origin,
            ));

            if decision.allowed {
                resources.push(resource);
            }
        }

        Ok(ResourceListResponse { resources })
    }
}
