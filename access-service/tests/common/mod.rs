//! Shared harness for access-service integration tests.
//!
//! Serves the real router on a random local port over the in-memory store,
//! a recording audit sink and counting federation fakes.

#![allow(dead_code)]

use access_service::{
    build_router,
    config::{
        AccessConfig, DatabaseConfig, Environment, FederationConfig, MfaConfig, RateLimitConfig,
        SecurityConfig, TokenConfig,
    },
    models::{AppRole, RoleGrant, Sensitivity},
    services::{
        federation::fakes::{FakeCredentialIssuer, FakeSigninExchange},
        store::Assignee,
        MockPrincipalStore, PrincipalStore, RecordingAuditSink,
    },
    AppState,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use totp_rs::{Algorithm, Secret, TOTP};

pub const PASSWORD: &str = "correct horse battery staple";
pub const MFA_ISSUER: &str = "ZeroTrustApp";
pub const SIGNIN_TOKEN: &str = "fake-signin-token";

pub fn test_config() -> AccessConfig {
    AccessConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "access-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "warn".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://localhost/unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        token: TokenConfig {
            secret: "integration-test-secret".to_string(),
            provisional_expiry_minutes: 10,
            trusted_expiry_minutes: 60,
        },
        mfa: MfaConfig {
            issuer: MFA_ISSUER.to_string(),
        },
        federation: FederationConfig {
            region: "us-east-1".to_string(),
            signin_url: "https://signin.aws.amazon.com/federation".to_string(),
            console_destination: "https://console.aws.amazon.com/".to_string(),
            issuer: "https://zero-trust-console.local".to_string(),
            default_session_seconds: 3600,
            timeout_seconds: 5,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            trusted_proxies: Vec::new(),
        },
        rate_limit: RateLimitConfig {
            login_attempts: 1000,
            login_window_seconds: 60,
            signup_attempts: 1000,
            signup_window_seconds: 60,
            global_ip_limit: 10_000,
            global_ip_window_seconds: 60,
        },
    }
}

pub fn grant(id: i64, name: &str, risk: Sensitivity) -> RoleGrant {
    RoleGrant {
        id,
        name: name.to_string(),
        arn: format!("arn:aws:iam::123456789012:role/{name}"),
        description: format!("{name} access"),
        env: "prod".to_string(),
        risk_level: risk,
    }
}

/// Current TOTP code for a base32 secret returned by enrollment.
pub fn totp_code(secret: &str, email: &str) -> String {
    let bytes = Secret::Encoded(secret.to_string())
        .to_bytes()
        .expect("enrolled secret should be base32");
    TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        bytes,
        Some(MFA_ISSUER.to_string()),
        email.to_string(),
    )
    .expect("valid TOTP parameters")
    .generate_current()
    .expect("system clock")
}

pub struct TestApp {
    pub address: String,
    pub store: Arc<MockPrincipalStore>,
    pub audit: Arc<RecordingAuditSink>,
    pub issuer: Arc<FakeCredentialIssuer>,
    pub exchange: Arc<FakeSigninExchange>,
    client: reqwest::Client,
}

pub struct TestOptions {
    pub store: MockPrincipalStore,
    pub issuer: FakeCredentialIssuer,
    pub config: AccessConfig,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            store: MockPrincipalStore::new(),
            issuer: FakeCredentialIssuer::default(),
            config: test_config(),
        }
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(TestOptions::default()).await
    }

    /// Spawn with grants assigned to application roles.
    pub async fn spawn_with_grants(grants: Vec<(AppRole, RoleGrant)>) -> Self {
        let store = grants
            .into_iter()
            .fold(MockPrincipalStore::new(), |store, (role, g)| {
                store.with_grant(Assignee::Role(role), g)
            });
        Self::spawn_with(TestOptions {
            store,
            ..TestOptions::default()
        })
        .await
    }

    pub async fn spawn_with(options: TestOptions) -> Self {
        let store = Arc::new(options.store);
        let audit = Arc::new(RecordingAuditSink::new());
        let issuer = Arc::new(options.issuer);
        let exchange = Arc::new(FakeSigninExchange::returning(SIGNIN_TOKEN));

        let state = AppState::new(
            options.config,
            store.clone(),
            audit.clone(),
            issuer.clone(),
            exchange.clone(),
        )
        .expect("Failed to build app state");
        let app = build_router(state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().expect("local addr");

        tokio::spawn(async move {
            service_core::axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("server error");
        });

        Self {
            address: format!("http://{}", addr),
            store,
            audit,
            issuer,
            exchange,
            client: reqwest::Client::new(),
        }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> reqwest::Response {
        let mut req = self.client.get(format!("{}{}", self.address, path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req.send().await.expect("Failed to execute request")
    }

    pub async fn post(&self, path: &str, token: Option<&str>, body: Value) -> reqwest::Response {
        self.send(reqwest::Method::POST, path, token, body).await
    }

    pub async fn patch(&self, path: &str, token: Option<&str>, body: Value) -> reqwest::Response {
        self.send(reqwest::Method::PATCH, path, token, body).await
    }

    async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        token: Option<&str>,
        body: Value,
    ) -> reqwest::Response {
        let mut req = self
            .client
            .request(method, format!("{}{}", self.address, path))
            .json(&body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req.send().await.expect("Failed to execute request")
    }

    /// Sign up and return `(provisional token, user id)`.
    pub async fn signup(&self, email: &str) -> (String, i64) {
        let res = self
            .post(
                "/auth/signup",
                None,
                json!({ "email": email, "full_name": "Test User", "password": PASSWORD }),
            )
            .await;
        assert_eq!(res.status(), 201, "signup failed");
        let body: Value = res.json().await.expect("signup body");
        (
            body["token"].as_str().expect("token").to_string(),
            body["user"]["id"].as_i64().expect("user id"),
        )
    }

    /// Enroll and verify TOTP with a provisional token; returns the trusted token.
    pub async fn enroll_and_verify(&self, email: &str, provisional: &str) -> String {
        let res = self.post("/auth/mfa/enroll", Some(provisional), json!({})).await;
        assert_eq!(res.status(), 200, "enroll failed");
        let body: Value = res.json().await.expect("enroll body");
        let secret = body["secret"].as_str().expect("secret").to_string();

        let res = self
            .post(
                "/auth/mfa/verify",
                Some(provisional),
                json!({ "code": totp_code(&secret, email) }),
            )
            .await;
        assert_eq!(res.status(), 200, "verify failed");
        let body: Value = res.json().await.expect("verify body");
        body["token"].as_str().expect("trusted token").to_string()
    }

    /// Full flow to a trusted token, with the application role set first.
    pub async fn trusted_user(&self, email: &str, role: AppRole) -> (String, i64) {
        let (provisional, id) = self.signup(email).await;
        if role != AppRole::User {
            self.store
                .update_role(id, &role)
                .await
                .expect("store update")
                .expect("principal exists");
        }
        let res = self
            .post(
                "/auth/login",
                None,
                json!({ "email": email, "password": PASSWORD }),
            )
            .await;
        assert_eq!(res.status(), 200, "login failed");
        let body: Value = res.json().await.expect("login body");
        let temp = body["temp_token"].as_str().unwrap_or(&provisional).to_string();

        (self.enroll_and_verify(email, &temp).await, id)
    }

    /// Wait for fire-and-forget audit writes to land.
    pub async fn settle_audit(&self, expected: usize) {
        for _ in 0..100 {
            if self.audit.snapshot().len() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
