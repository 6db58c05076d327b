pub mod access;
pub mod admin;
pub mod audit;
pub mod database;
pub mod error;
pub mod federation;
pub mod jwt;
pub mod metrics;
pub mod mfa;
pub mod policy;
pub mod session;
pub mod store;

pub use access::AccessService;
pub use admin::AdminService;
pub use audit::AuditEmitter;
pub use database::Database;
pub use error::ServiceError;
pub use federation::{
    CredentialIssuer, FederationEndpoint, FederationError, FederationService, SigninTokenExchange,
    StsCredentialIssuer,
};
pub use jwt::{JwtService, SessionClaims, TokenTier};
pub use mfa::MfaService;
pub use policy::{AccessRequest, Decision};
pub use session::SessionService;
pub use store::{AuditSink, MockPrincipalStore, PrincipalStore, RecordingAuditSink};
