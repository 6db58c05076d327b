use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::PrincipalResponse;

// Bodies carrying passwords must not derive Debug.

#[derive(Deserialize, Validate, ToSchema)]
pub struct SignupRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "alice@example.com")]
    pub email: String,

    #[serde(default)]
    #[validate(length(max = 200, message = "Full name is too long"))]
    #[schema(example = "Alice Admin")]
    pub full_name: String,

    #[validate(length(min = 1, max = 1024, message = "Password is required"))]
    #[schema(example = "correct horse battery staple")]
    pub password: String,
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    #[schema(example = "alice@example.com")]
    pub email: String,

    #[validate(length(min = 1, max = 1024, message = "Password is required"))]
    #[schema(example = "correct horse battery staple")]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct MfaVerifyRequest {
    #[validate(length(min = 1, message = "Code is required"))]
    #[schema(example = "123456")]
    pub code: String,
}

/// Token plus the principal it was issued to.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: PrincipalResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    /// Always true: every principal must pass TOTP.
    #[schema(example = true)]
    pub mfa_required: bool,
    /// True when no TOTP secret exists yet.
    #[schema(example = false)]
    pub enrollment_required: bool,
    /// Provisional token, good only for the MFA endpoints.
    pub temp_token: String,
    pub user: PrincipalResponse,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct MfaEnrollResponse {
    #[schema(example = "JBSWY3DPEHPK3PXPJBSWY3DPEHPK3PXP")]
    pub secret: String,
    #[schema(example = "otpauth://totp/ZeroTrustApp:alice%40example.com?secret=...&issuer=ZeroTrustApp")]
    pub provisioning_uri: String,
}
