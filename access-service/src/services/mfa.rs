//! TOTP enrollment and code checks (RFC 6238: SHA-1, 6 digits, 30s step).

use totp_rs::{Algorithm, Secret, TOTP};

use super::ServiceError;

const DIGITS: usize = 6;
const STEP_SECONDS: u64 = 30;
/// Accept the previous and next step as well as the current one.
const SKEW_STEPS: u8 = 1;
const SECRET_BYTES: usize = 20;

/// Material handed back to the caller on enrollment.
#[derive(Debug, Clone)]
pub struct Enrollment {
    pub secret: String,
    pub provisioning_uri: String,
}

#[derive(Debug, Clone)]
pub struct MfaService {
    issuer: String,
}

impl MfaService {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }

    /// Generate a fresh shared secret for `account`.
    pub fn enroll(&self, account: &str) -> Result<Enrollment, ServiceError> {
        let bytes: [u8; SECRET_BYTES] = rand::random();
        let totp = self.totp(bytes.to_vec(), account)?;

        Ok(Enrollment {
            secret: totp.get_secret_base32(),
            provisioning_uri: totp.get_url(),
        })
    }

    /// Check `code` against a base32 `secret` within the skew window.
    pub fn verify(&self, secret: &str, account: &str, code: &str) -> Result<bool, ServiceError> {
        if code.len() != DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(false);
        }

        let bytes = Secret::Encoded(secret.to_string())
            .to_bytes()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("stored MFA secret is malformed: {:?}", e)))?;
        let totp = self.totp(bytes, account)?;

        totp.check_current(code)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("system clock error: {}", e)))
    }

    fn totp(&self, secret: Vec<u8>, account: &str) -> Result<TOTP, ServiceError> {
        TOTP::new(
            Algorithm::SHA1,
            DIGITS,
            SKEW_STEPS,
            STEP_SECONDS,
            secret,
            Some(self.issuer.clone()),
            account.to_string(),
        )
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("failed to build TOTP: {:?}", e)))
    }
}
