use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::TokenConfig;
use crate::models::{MfaState, Principal};

use super::ServiceError;

/// Trust weight of a session token. Both tiers share one claim layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenTier {
    /// Issued after password check; only good for MFA enroll/verify.
    Provisional,
    /// Issued after a successful TOTP verification.
    Trusted,
}

/// Claims carried by every session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (principal ID)
    pub sub: String,
    /// Application role at issuance
    pub role: String,
    pub tier: TokenTier,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// JWT ID
    pub jti: String,
}

impl SessionClaims {
    pub fn principal_id(&self) -> Result<i64, ServiceError> {
        self.sub.parse().map_err(|_| ServiceError::InvalidToken)
    }
}

/// Issues and validates HS256 session tokens from the shared signing secret.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    provisional_expiry_minutes: i64,
    trusted_expiry_minutes: i64,
}

impl JwtService {
    pub fn new(config: &TokenConfig) -> Result<Self, anyhow::Error> {
        if config.secret.is_empty() {
            anyhow::bail!("token signing secret must not be empty");
        }

        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        tracing::info!("JWT service initialized with HS256 shared secret");

        Ok(Self {
            encoding_key,
            decoding_key,
            provisional_expiry_minutes: config.provisional_expiry_minutes,
            trusted_expiry_minutes: config.trusted_expiry_minutes,
        })
    }

    /// Token for a principal that has passed the password check only.
    pub fn issue_provisional(&self, principal: &Principal) -> Result<String, ServiceError> {
        self.issue(principal, TokenTier::Provisional, self.provisional_expiry_minutes)
    }

    /// Token for a principal whose TOTP enrollment is verified. Refuses
    /// anyone else.
    pub fn issue_trusted(&self, principal: &Principal) -> Result<String, ServiceError> {
        if principal.mfa_state() != MfaState::EnrolledVerified {
            tracing::warn!(
                user_id = principal.id,
                "Refusing trusted token for principal without verified MFA"
            );
            return Err(ServiceError::MfaRequired);
        }
        self.issue(principal, TokenTier::Trusted, self.trusted_expiry_minutes)
    }

    fn issue(
        &self,
        principal: &Principal,
        tier: TokenTier,
        expiry_minutes: i64,
    ) -> Result<String, ServiceError> {
        let now = Utc::now();
        let exp = now + Duration::minutes(expiry_minutes);

        let claims = SessionClaims {
            sub: principal.id.to_string(),
            role: principal.role.to_string(),
            tier,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Failed to encode token: {}", e)))
    }

    /// Check signature and expiry. No I/O.
    pub fn validate(&self, token: &str) -> Result<SessionClaims, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Session token rejected");
                ServiceError::InvalidToken
            })
    }
}
