use std::sync::Arc;

use crate::{
    dtos::admin::UpdateRoleRequest,
    models::{AppRole, AuditEventKind, AuditRecord, Identity, PrincipalResponse, RequestOrigin},
    services::{AuditEmitter, PrincipalStore, ServiceError},
};

#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn PrincipalStore>,
    audit: AuditEmitter,
}

impl AdminService {
    pub fn new(store: Arc<dyn PrincipalStore>, audit: AuditEmitter) -> Self {
        Self { store, audit }
    }

    /// Assign a new application role. Tokens already issued keep the role
    /// they were minted with until they expire.
    pub async fn change_role(
        &self,
        actor: &Identity,
        target_id: i64,
        req: UpdateRoleRequest,
        origin: &RequestOrigin,
    ) -> Result<PrincipalResponse, ServiceError> {
        if !actor.is_admin() || !actor.is_trusted() {
            return Err(ServiceError::AdminRequired);
        }

        let role = AppRole::from(req.role.trim().to_lowercase());
        if !role.is_assignable() {
            return Err(ServiceError::Validation(
                "role must be one of: user, admin, devops".to_string(),
            ));
        }

        let updated = self
            .store
            .update_role(target_id, &role)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        tracing::info!(
            actor_id = actor.principal_id,
            user_id = updated.id,
            role = %updated.role,
            "Application role changed"
        );
        self.audit.emit(AuditRecord::event(
            AuditEventKind::RoleChange,
            Some(actor.principal_id),
            Some(&actor.role),
            &format!("user:{}", updated.id),
            true,
            "admin-role-change",
            format!("role set to {}", updated.role),
            origin,
        ));

        Ok(updated.sanitized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewPrincipal;
    use crate::services::jwt::TokenTier;
    use crate::services::store::{MockPrincipalStore, RecordingAuditSink};

    async fn setup() -> (AdminService, i64) {
        let store = Arc::new(MockPrincipalStore::new());
        let target = store
            .insert_principal(NewPrincipal {
                email: "bob@example.com".to_string(),
                full_name: "Bob".to_string(),
                role: AppRole::User,
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap()
            .unwrap();
        let service = AdminService::new(store, AuditEmitter::new(Arc::new(RecordingAuditSink::new())));
        (service, target.id)
    }

    fn admin() -> Identity {
        Identity {
            principal_id: 99,
            role: AppRole::Admin,
            tier: TokenTier::Trusted,
        }
    }

    fn origin() -> RequestOrigin {
        RequestOrigin::new("PATCH", "/users/1/role", None)
    }

    #[tokio::test]
    async fn admin_can_promote() {
        let (service, id) = setup().await;
        let updated = service
            .change_role(&admin(), id, UpdateRoleRequest { role: "DevOps".to_string() }, &origin())
            .await
            .unwrap();
        assert_eq!(updated.role, "devops");
    }

    #[tokio::test]
    async fn rejects_unknown_role_and_unknown_user() {
        let (service, id) = setup().await;
        assert!(matches!(
            service
                .change_role(&admin(), id, UpdateRoleRequest { role: "root".to_string() }, &origin())
                .await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            service
                .change_role(&admin(), 12345, UpdateRoleRequest { role: "admin".to_string() }, &origin())
                .await,
            Err(ServiceError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn non_admin_or_provisional_is_refused() {
        let (service, id) = setup().await;
        let user = Identity {
            role: AppRole::User,
            ..admin()
        };
        let provisional_admin = Identity {
            tier: TokenTier::Provisional,
            ..admin()
        };
        for actor in [user, provisional_admin] {
            assert!(matches!(
                service
                    .change_role(&actor, id, UpdateRoleRequest { role: "admin".to_string() }, &origin())
                    .await,
                Err(ServiceError::AdminRequired)
            ));
        }
    }
}
