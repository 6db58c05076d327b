//! Federated console sessions.
//!
//! Three sequential steps, each failing the whole flow:
//! 1. assume the target role for temporary credentials (STS),
//! 2. trade the packaged credentials for a one-time sign-in token,
//! 3. compose the console login URL around that token.
//!
//! No state is kept between calls and nothing is retried.

use async_trait::async_trait;
use aws_sdk_sts::error::DisplayErrorContext;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::config::FederationConfig;
use crate::models::RoleGrant;

#[derive(Debug, Error)]
pub enum FederationError {
    #[error("role assumption failed: {0}")]
    AssumeRole(String),

    #[error("provider returned no credentials")]
    MissingCredentials,

    #[error("failed to encode session descriptor: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("sign-in token request failed: {0}")]
    SigninRequest(String),

    #[error("sign-in token response was empty")]
    EmptySigninToken,
}

/// Short-lived credential set returned by the provider. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct TemporaryCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
}

impl fmt::Debug for TemporaryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporaryCredentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

/// JSON shape the federation endpoint expects in its `Session` parameter.
#[derive(Serialize)]
struct SessionDescriptor<'a> {
    #[serde(rename = "sessionId")]
    session_id: &'a str,
    #[serde(rename = "sessionKey")]
    session_key: &'a str,
    #[serde(rename = "sessionToken")]
    session_token: &'a str,
}

impl<'a> From<&'a TemporaryCredentials> for SessionDescriptor<'a> {
    fn from(creds: &'a TemporaryCredentials) -> Self {
        Self {
            session_id: &creds.access_key_id,
            session_key: &creds.secret_access_key,
            session_token: &creds.session_token,
        }
    }
}

/// Step 1: temporary credentials for a role.
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        duration_seconds: i32,
    ) -> Result<TemporaryCredentials, FederationError>;
}

/// Step 2: session descriptor JSON in, sign-in token out.
#[async_trait]
pub trait SigninTokenExchange: Send + Sync {
    async fn signin_token(&self, session_json: &str) -> Result<String, FederationError>;
}

/// Issues credentials through AWS STS `AssumeRole`.
pub struct StsCredentialIssuer {
    client: aws_sdk_sts::Client,
}

impl StsCredentialIssuer {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_sts::Client::new(sdk_config),
        }
    }
}

#[async_trait]
impl CredentialIssuer for StsCredentialIssuer {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        duration_seconds: i32,
    ) -> Result<TemporaryCredentials, FederationError> {
        let output = self
            .client
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(session_name)
            .duration_seconds(duration_seconds)
            .send()
            .await
            .map_err(|e| FederationError::AssumeRole(DisplayErrorContext(&e).to_string()))?;

        let creds = output
            .credentials()
            .ok_or(FederationError::MissingCredentials)?;

        Ok(TemporaryCredentials {
            access_key_id: creds.access_key_id().to_string(),
            secret_access_key: creds.secret_access_key().to_string(),
            session_token: creds.session_token().to_string(),
        })
    }
}

#[derive(Deserialize)]
struct SigninTokenResponse {
    #[serde(rename = "SigninToken", default)]
    signin_token: String,
}

/// Calls the provider's unauthenticated federation endpoint.
pub struct FederationEndpoint {
    client: reqwest::Client,
    signin_url: String,
}

impl FederationEndpoint {
    pub fn new(signin_url: impl Into<String>, timeout: Duration) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build federation HTTP client: {}", e))?;

        Ok(Self {
            client,
            signin_url: signin_url.into(),
        })
    }
}

#[async_trait]
impl SigninTokenExchange for FederationEndpoint {
    async fn signin_token(&self, session_json: &str) -> Result<String, FederationError> {
        let response = self
            .client
            .get(&self.signin_url)
            .query(&[
                ("Action", "getSigninToken"),
                ("SessionType", "json"),
                ("Session", session_json),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FederationError::SigninRequest(e.without_url().to_string()))?;

        let body: SigninTokenResponse = response
            .json()
            .await
            .map_err(|e| FederationError::SigninRequest(e.to_string()))?;

        Ok(body.signin_token)
    }
}

/// Result of a successful flow.
#[derive(Debug, Clone)]
pub struct FederatedSession {
    pub url: String,
    pub duration_seconds: i32,
}

#[derive(Clone)]
pub struct FederationService {
    credentials: Arc<dyn CredentialIssuer>,
    exchange: Arc<dyn SigninTokenExchange>,
    signin_url: String,
    console_destination: String,
    issuer: String,
    default_session_seconds: i32,
}

impl FederationService {
    pub fn new(
        config: &FederationConfig,
        credentials: Arc<dyn CredentialIssuer>,
        exchange: Arc<dyn SigninTokenExchange>,
    ) -> Self {
        Self {
            credentials,
            exchange,
            signin_url: config.signin_url.clone(),
            console_destination: config.console_destination.clone(),
            issuer: config.issuer.clone(),
            default_session_seconds: config.default_session_seconds,
        }
    }

    /// Exchange an already-authorized grant for a console sign-in URL.
    ///
    /// `duration_seconds` of `None` or `<= 0` selects the configured default.
    pub async fn issue_external_session(
        &self,
        principal_id: i64,
        grant: &RoleGrant,
        duration_seconds: Option<i32>,
    ) -> Result<FederatedSession, FederationError> {
        let duration = match duration_seconds {
            Some(d) if d > 0 => d,
            _ => self.default_session_seconds,
        };
        let session_name = format!("zt-{}-{}", principal_id, grant.id);

        let creds = self
            .credentials
            .assume_role(&grant.arn, &session_name, duration)
            .await?;

        let descriptor = Zeroizing::new(serde_json::to_string(&SessionDescriptor::from(&creds))?);
        let token = self.exchange.signin_token(&descriptor).await?;
        if token.trim().is_empty() {
            return Err(FederationError::EmptySigninToken);
        }

        let url = format!(
            "{}?Action=login&Issuer={}&Destination={}&SigninToken={}",
            self.signin_url,
            urlencoding::encode(&self.issuer),
            urlencoding::encode(&self.console_destination),
            urlencoding::encode(&token),
        );

        tracing::info!(
            user_id = principal_id,
            role_id = grant.id,
            session_name = %session_name,
            duration_seconds = duration,
            "Federated console session issued"
        );

        Ok(FederatedSession {
            url,
            duration_seconds: duration,
        })
    }
}

/// Test doubles for both provider calls, counting invocations.
pub mod fakes {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeCredentialIssuer {
        pub calls: AtomicUsize,
        pub fail: bool,
        /// (role_arn, session_name, duration) of each call.
        pub requests: Mutex<Vec<(String, String, i32)>>,
    }

    impl FakeCredentialIssuer {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CredentialIssuer for FakeCredentialIssuer {
        async fn assume_role(
            &self,
            role_arn: &str,
            session_name: &str,
            duration_seconds: i32,
        ) -> Result<TemporaryCredentials, FederationError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Ok(mut requests) = self.requests.lock() {
                requests.push((role_arn.to_string(), session_name.to_string(), duration_seconds));
            }
            if self.fail {
                return Err(FederationError::AssumeRole(
                    "AccessDenied: not authorized to perform sts:AssumeRole".to_string(),
                ));
            }
            Ok(TemporaryCredentials {
                access_key_id: format!("ASIAFAKE{n}"),
                secret_access_key: "fake-secret-key".to_string(),
                session_token: "fake-session-token".to_string(),
            })
        }
    }

    #[derive(Default)]
    pub struct FakeSigninExchange {
        pub calls: AtomicUsize,
        /// Token to return; `None` answers with an empty token.
        pub token: Option<String>,
        pub last_session: Mutex<Option<String>>,
    }

    impl FakeSigninExchange {
        pub fn returning(token: &str) -> Self {
            Self {
                token: Some(token.to_string()),
                ..Self::default()
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SigninTokenExchange for FakeSigninExchange {
        async fn signin_token(&self, session_json: &str) -> Result<String, FederationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut last) = self.last_session.lock() {
                *last = Some(session_json.to_string());
            }
            Ok(self.token.clone().unwrap_or_default())
        }
    }
}
