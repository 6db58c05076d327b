//! Session lifecycle: signup and login yield a provisional token, TOTP
//! enrollment and verification lead to a trusted one.
//!
//! Failed steps reject the request and leave stored state untouched. There
//! is no lockout after repeated bad codes and a code may be replayed within
//! its window.

use std::sync::Arc;

use crate::{
    dtos::auth::{AuthResponse, LoginRequest, LoginResponse, MfaEnrollResponse, MfaVerifyRequest, SignupRequest},
    models::{AppRole, AuditEventKind, AuditRecord, Identity, NewPrincipal, Principal, RequestOrigin},
    services::{AuditEmitter, JwtService, MfaService, PrincipalStore, ServiceError},
    utils::{hash_password, verify_password, Password, PasswordHashString},
};

const SESSION_RESOURCE: &str = "session";
const MFA_RESOURCE: &str = "mfa";

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn PrincipalStore>,
    jwt: JwtService,
    mfa: MfaService,
    audit: AuditEmitter,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn PrincipalStore>,
        jwt: JwtService,
        mfa: MfaService,
        audit: AuditEmitter,
    ) -> Self {
        Self {
            store,
            jwt,
            mfa,
            audit,
        }
    }

    /// Anonymous -> provisional. New principals always start as `user`
    /// with MFA unenrolled.
    pub async fn signup(
        &self,
        req: SignupRequest,
        origin: &RequestOrigin,
    ) -> Result<AuthResponse, ServiceError> {
        let email = req.email.trim().to_lowercase();
        let password = Password::new(req.password);
        if email.is_empty() || password.is_empty() {
            return Err(ServiceError::Validation(
                "email and password are required".to_string(),
            ));
        }

        let password_hash = hash_blocking(password).await?;

        let principal = self
            .store
            .insert_principal(NewPrincipal {
                email,
                full_name: req.full_name.trim().to_string(),
                role: AppRole::User,
                password_hash: password_hash.into_string(),
            })
            .await?
            .ok_or(ServiceError::EmailAlreadyRegistered)?;

        let token = self.jwt.issue_provisional(&principal)?;

        tracing::info!(user_id = principal.id, "Principal signed up");
        self.audit.emit(AuditRecord::event(
            AuditEventKind::Signup,
            Some(principal.id),
            Some(&principal.role),
            SESSION_RESOURCE,
            true,
            "signup",
            "principal created",
            origin,
        ));

        Ok(AuthResponse {
            token,
            user: principal.sanitized(),
        })
    }

    /// Anonymous -> provisional. Never returns a trusted token.
    pub async fn login(
        &self,
        req: LoginRequest,
        origin: &RequestOrigin,
    ) -> Result<LoginResponse, ServiceError> {
        let email = req.email.trim().to_lowercase();
        let password = Password::new(req.password);
        if email.is_empty() || password.is_empty() {
            return Err(ServiceError::Validation(
                "email and password are required".to_string(),
            ));
        }

        let Some(principal) = self.store.find_principal_by_email(&email).await? else {
            // Spend the same hashing cost as a real check.
            let _ = hash_blocking(password).await;
            self.audit_login_failure(None, origin);
            return Err(ServiceError::InvalidCredentials);
        };

        let stored = PasswordHashString::new(principal.password_hash.clone());
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
            .await
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("password check task failed: {}", e)))?
            .map_err(ServiceError::Internal)?;

        if !matches {
            self.audit_login_failure(Some(&principal), origin);
            return Err(ServiceError::InvalidCredentials);
        }

        let temp_token = self.jwt.issue_provisional(&principal)?;
        let enrollment_required = principal.enrollment_required();

        tracing::info!(
            user_id = principal.id,
            enrollment_required,
            "Password accepted, MFA pending"
        );
        self.audit.emit(AuditRecord::event(
            AuditEventKind::Login,
            Some(principal.id),
            Some(&principal.role),
            SESSION_RESOURCE,
            true,
            "password",
            "credentials accepted; MFA pending",
            origin,
        ));

        Ok(LoginResponse {
            mfa_required: true,
            enrollment_required,
            temp_token,
            user: principal.sanitized(),
        })
    }

    /// Provisional -> enrolling. Any existing secret is replaced and MFA
    /// stays disabled until the next successful verify.
    pub async fn enroll_mfa(
        &self,
        identity: &Identity,
        origin: &RequestOrigin,
    ) -> Result<MfaEnrollResponse, ServiceError> {
        let principal = self.load(identity).await?;
        let enrollment = self.mfa.enroll(&principal.email)?;

        self.store
            .set_mfa_secret(principal.id, &enrollment.secret)
            .await?;

        tracing::info!(user_id = principal.id, "MFA secret enrolled");
        self.audit.emit(AuditRecord::event(
            AuditEventKind::MfaEnroll,
            Some(principal.id),
            Some(&principal.role),
            MFA_RESOURCE,
            true,
            "mfa-enroll",
            "TOTP secret issued",
            origin,
        ));

        Ok(MfaEnrollResponse {
            secret: enrollment.secret,
            provisioning_uri: enrollment.provisioning_uri,
        })
    }

    /// Enrolling (or already verified) -> trusted.
    pub async fn verify_mfa(
        &self,
        identity: &Identity,
        req: MfaVerifyRequest,
        origin: &RequestOrigin,
    ) -> Result<AuthResponse, ServiceError> {
        let code = req.code.trim();
        if code.is_empty() {
            return Err(ServiceError::Validation("code is required".to_string()));
        }

        let mut principal = self.load(identity).await?;
        let secret = match principal.mfa_secret.as_deref() {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => return Err(ServiceError::MfaNotEnrolled),
        };

        if !self.mfa.verify(&secret, &principal.email, code)? {
            tracing::warn!(user_id = principal.id, "Invalid MFA code");
            self.audit.emit(AuditRecord::event(
                AuditEventKind::MfaVerify,
                Some(principal.id),
                Some(&principal.role),
                MFA_RESOURCE,
                false,
                "mfa-verify",
                "invalid TOTP code",
                origin,
            ));
            return Err(ServiceError::InvalidMfaCode);
        }

        // The secret may have been replaced by a concurrent enroll.
        if !self.store.enable_mfa(principal.id, &secret).await? {
            tracing::warn!(user_id = principal.id, "MFA secret changed during verification");
            return Err(ServiceError::InvalidMfaCode);
        }
        principal.mfa_enabled = true;

        let token = self.jwt.issue_trusted(&principal)?;

        tracing::info!(user_id = principal.id, "MFA verified, trusted session issued");
        self.audit.emit(AuditRecord::event(
            AuditEventKind::MfaVerify,
            Some(principal.id),
            Some(&principal.role),
            MFA_RESOURCE,
            true,
            "mfa-verify",
            "TOTP code accepted",
            origin,
        ));

        Ok(AuthResponse {
            token,
            user: principal.sanitized(),
        })
    }

    /// Current record for the token's subject. A token for a principal that
    /// no longer exists is treated as invalid.
    async fn load(&self, identity: &Identity) -> Result<Principal, ServiceError> {
        self.store
            .find_principal_by_id(identity.principal_id)
            .await?
            .ok_or(ServiceError::InvalidToken)
    }

    fn audit_login_failure(&self, principal: Option<&Principal>, origin: &RequestOrigin) {
        tracing::warn!(user_id = ?principal.map(|p| p.id), "Login failed");
        self.audit.emit(AuditRecord::event(
            AuditEventKind::Login,
            principal.map(|p| p.id),
            principal.map(|p| &p.role),
            SESSION_RESOURCE,
            false,
            "password",
            "invalid credentials",
            origin,
        ));
    }
}

async fn hash_blocking(password: Password) -> Result<PasswordHashString, ServiceError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("password hash task failed: {}", e)))?
        .map_err(ServiceError::Internal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenConfig;
    use crate::models::MfaState;
    use crate::services::jwt::TokenTier;
    use crate::services::store::{MockPrincipalStore, RecordingAuditSink};
    use totp_rs::{Algorithm, Secret, TOTP};

    struct Harness {
        service: SessionService,
        store: Arc<MockPrincipalStore>,
        jwt: JwtService,
    }

    /// Replaces the secret just before the verified flag is written, the
    /// way an enroll request landing mid-verify would.
    struct ReenrollDuringVerify(Arc<MockPrincipalStore>);

    #[async_trait::async_trait]
    impl PrincipalStore for ReenrollDuringVerify {
        async fn health_check(&self) -> Result<(), ServiceError> {
            self.0.health_check().await
        }

        async fn find_principal_by_email(&self, email: &str) -> Result<Option<Principal>, ServiceError> {
            self.0.find_principal_by_email(email).await
        }

        async fn find_principal_by_id(&self, id: i64) -> Result<Option<Principal>, ServiceError> {
            self.0.find_principal_by_id(id).await
        }

        async fn insert_principal(&self, new: NewPrincipal) -> Result<Option<Principal>, ServiceError> {
            self.0.insert_principal(new).await
        }

        async fn set_mfa_secret(&self, id: i64, secret: &str) -> Result<(), ServiceError> {
            self.0.set_mfa_secret(id, secret).await
        }

        async fn enable_mfa(&self, id: i64, secret: &str) -> Result<bool, ServiceError> {
            self.0.set_mfa_secret(id, "JBSWY3DPEHPK3PXPJBSWY3DPEHPK3PXP").await?;
            self.0.enable_mfa(id, secret).await
        }

        async fn update_role(&self, id: i64, role: &AppRole) -> Result<Option<Principal>, ServiceError> {
            self.0.update_role(id, role).await
        }

        async fn role_grants_for(
            &self,
            principal_id: i64,
            role: &AppRole,
        ) -> Result<Vec<crate::models::RoleGrant>, ServiceError> {
            self.0.role_grants_for(principal_id, role).await
        }

        async fn resources_visible_to(
            &self,
            principal_id: i64,
            role: &AppRole,
        ) -> Result<Vec<crate::models::Resource>, ServiceError> {
            self.0.resources_visible_to(principal_id, role).await
        }
    }

    fn harness() -> Harness {
        harness_over(|store| store as Arc<dyn PrincipalStore>)
    }

    fn harness_over(
        wrap: impl FnOnce(Arc<MockPrincipalStore>) -> Arc<dyn PrincipalStore>,
    ) -> Harness {
        let store = Arc::new(MockPrincipalStore::new());
        let jwt = JwtService::new(&TokenConfig {
            secret: "unit-secret".to_string(),
            provisional_expiry_minutes: 10,
            trusted_expiry_minutes: 60,
        })
        .unwrap();
        let service = SessionService::new(
            wrap(store.clone()),
            jwt.clone(),
            MfaService::new("ZeroTrustApp"),
            AuditEmitter::new(Arc::new(RecordingAuditSink::new())),
        );
        Harness {
            service,
            store,
            jwt,
        }
    }

    fn origin() -> RequestOrigin {
        RequestOrigin::new("POST", "/auth", None)
    }

    fn signup_req(email: &str, password: &str) -> SignupRequest {
        SignupRequest {
            email: email.to_string(),
            full_name: "Alice".to_string(),
            password: password.to_string(),
        }
    }

    fn login_req(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    fn code_for(secret: &str) -> String {
        let bytes = Secret::Encoded(secret.to_string()).to_bytes().unwrap();
        TOTP::new(Algorithm::SHA1, 6, 1, 30, bytes, None, "x".to_string())
            .unwrap()
            .generate_current()
            .unwrap()
    }

    fn identity_from(jwt: &JwtService, token: &str) -> Identity {
        let claims = jwt.validate(token).unwrap();
        Identity {
            principal_id: claims.principal_id().unwrap(),
            role: AppRole::from(claims.role),
            tier: claims.tier,
        }
    }

    #[tokio::test]
    async fn signup_issues_provisional_token_for_new_user() {
        let h = harness();
        let resp = h.service.signup(signup_req("Alice@Example.com", "pw"), &origin()).await.unwrap();
        assert_eq!(resp.user.role, "user");
        assert_eq!(resp.user.email, "alice@example.com");
        assert!(!resp.user.mfa_enabled);
        assert_eq!(h.jwt.validate(&resp.token).unwrap().tier, TokenTier::Provisional);

        let stored = h.store.find_principal_by_id(resp.user.id).await.unwrap().unwrap();
        assert_ne!(stored.password_hash, "pw");
        assert_eq!(stored.mfa_state(), MfaState::NotEnrolled);
    }

    #[tokio::test]
    async fn signup_rejects_empty_fields_and_duplicates() {
        let h = harness();
        assert!(matches!(
            h.service.signup(signup_req("", "pw"), &origin()).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            h.service.signup(signup_req("a@b.io", ""), &origin()).await,
            Err(ServiceError::Validation(_))
        ));
        h.service.signup(signup_req("a@b.io", "pw"), &origin()).await.unwrap();
        assert!(matches!(
            h.service.signup(signup_req("a@b.io", "pw2"), &origin()).await,
            Err(ServiceError::EmailAlreadyRegistered)
        ));
    }

    #[tokio::test]
    async fn login_failures_do_not_reveal_which_field() {
        let h = harness();
        h.service.signup(signup_req("a@b.io", "pw"), &origin()).await.unwrap();

        let wrong_password = h.service.login(login_req("a@b.io", "nope"), &origin()).await;
        let unknown_email = h.service.login(login_req("z@b.io", "pw"), &origin()).await;
        assert!(matches!(wrong_password, Err(ServiceError::InvalidCredentials)));
        assert!(matches!(unknown_email, Err(ServiceError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn login_normalizes_email_before_lookup() {
        let h = harness();
        h.service.signup(signup_req("Mixed@Example.com", "pw"), &origin()).await.unwrap();

        let login = h
            .service
            .login(login_req("  MIXED@example.COM ", "pw"), &origin())
            .await
            .unwrap();
        assert_eq!(login.user.email, "mixed@example.com");
    }

    #[tokio::test]
    async fn full_lifecycle_reaches_trusted_and_clears_enrollment_flag() {
        let h = harness();
        h.service.signup(signup_req("a@b.io", "pw"), &origin()).await.unwrap();

        let login = h.service.login(login_req("a@b.io", "pw"), &origin()).await.unwrap();
        assert!(login.mfa_required);
        assert!(login.enrollment_required);
        let identity = identity_from(&h.jwt, &login.temp_token);
        assert_eq!(identity.tier, TokenTier::Provisional);

        let enrollment = h.service.enroll_mfa(&identity, &origin()).await.unwrap();
        let stored = h.store.find_principal_by_id(identity.principal_id).await.unwrap().unwrap();
        assert_eq!(stored.mfa_state(), MfaState::EnrolledUnverified);

        let verified = h
            .service
            .verify_mfa(
                &identity,
                MfaVerifyRequest {
                    code: code_for(&enrollment.secret),
                },
                &origin(),
            )
            .await
            .unwrap();
        assert!(verified.user.mfa_enabled);
        assert_eq!(h.jwt.validate(&verified.token).unwrap().tier, TokenTier::Trusted);

        let again = h.service.login(login_req("a@b.io", "pw"), &origin()).await.unwrap();
        assert!(again.mfa_required);
        assert!(!again.enrollment_required);
        assert_eq!(h.jwt.validate(&again.temp_token).unwrap().tier, TokenTier::Provisional);
    }

    #[tokio::test]
    async fn invalid_code_leaves_state_unchanged() {
        let h = harness();
        let signup = h.service.signup(signup_req("a@b.io", "pw"), &origin()).await.unwrap();
        let identity = identity_from(&h.jwt, &signup.token);
        let enrollment = h.service.enroll_mfa(&identity, &origin()).await.unwrap();

        let valid = code_for(&enrollment.secret);
        let wrong = if valid == "000000" { "111111" } else { "000000" };
        let result = h
            .service
            .verify_mfa(&identity, MfaVerifyRequest { code: wrong.to_string() }, &origin())
            .await;
        assert!(matches!(result, Err(ServiceError::InvalidMfaCode)));

        let stored = h.store.find_principal_by_id(identity.principal_id).await.unwrap().unwrap();
        assert_eq!(stored.mfa_state(), MfaState::EnrolledUnverified);
    }

    #[tokio::test]
    async fn verify_without_enrollment_is_rejected() {
        let h = harness();
        let signup = h.service.signup(signup_req("a@b.io", "pw"), &origin()).await.unwrap();
        let identity = identity_from(&h.jwt, &signup.token);
        let result = h
            .service
            .verify_mfa(&identity, MfaVerifyRequest { code: "123456".to_string() }, &origin())
            .await;
        assert!(matches!(result, Err(ServiceError::MfaNotEnrolled)));
    }

    #[tokio::test]
    async fn re_enrollment_requires_fresh_verification() {
        let h = harness();
        let signup = h.service.signup(signup_req("a@b.io", "pw"), &origin()).await.unwrap();
        let identity = identity_from(&h.jwt, &signup.token);
        let first = h.service.enroll_mfa(&identity, &origin()).await.unwrap();
        h.service
            .verify_mfa(&identity, MfaVerifyRequest { code: code_for(&first.secret) }, &origin())
            .await
            .unwrap();

        let second = h.service.enroll_mfa(&identity, &origin()).await.unwrap();
        assert_ne!(first.secret, second.secret);
        let stored = h.store.find_principal_by_id(identity.principal_id).await.unwrap().unwrap();
        assert_eq!(stored.mfa_state(), MfaState::EnrolledUnverified);
    }

    #[tokio::test]
    async fn invalid_code_keeps_verified_principal_enrolled() {
        let h = harness();
        let signup = h.service.signup(signup_req("a@b.io", "pw"), &origin()).await.unwrap();
        let identity = identity_from(&h.jwt, &signup.token);
        let enrollment = h.service.enroll_mfa(&identity, &origin()).await.unwrap();
        let valid = code_for(&enrollment.secret);
        h.service
            .verify_mfa(&identity, MfaVerifyRequest { code: valid.clone() }, &origin())
            .await
            .unwrap();

        let wrong = if valid == "000000" { "111111" } else { "000000" };
        let result = h
            .service
            .verify_mfa(&identity, MfaVerifyRequest { code: wrong.to_string() }, &origin())
            .await;
        assert!(matches!(result, Err(ServiceError::InvalidMfaCode)));

        let stored = h.store.find_principal_by_id(identity.principal_id).await.unwrap().unwrap();
        assert_eq!(stored.mfa_state(), MfaState::EnrolledVerified);
    }

    #[tokio::test]
    async fn secret_replaced_mid_verify_is_not_marked_verified() {
        let h = harness_over(|store| Arc::new(ReenrollDuringVerify(store)) as Arc<dyn PrincipalStore>);
        let signup = h.service.signup(signup_req("a@b.io", "pw"), &origin()).await.unwrap();
        let identity = identity_from(&h.jwt, &signup.token);
        let enrollment = h.service.enroll_mfa(&identity, &origin()).await.unwrap();

        let result = h
            .service
            .verify_mfa(
                &identity,
                MfaVerifyRequest {
                    code: code_for(&enrollment.secret),
                },
                &origin(),
            )
            .await;
        assert!(matches!(result, Err(ServiceError::InvalidMfaCode)));

        let stored = h.store.find_principal_by_id(identity.principal_id).await.unwrap().unwrap();
        assert_eq!(stored.mfa_state(), MfaState::EnrolledUnverified);
        assert_ne!(stored.mfa_secret.as_deref(), Some(enrollment.secret.as_str()));
    }
}
