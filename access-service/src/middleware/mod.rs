pub mod admin;
pub mod auth;
pub mod origin;

pub use admin::require_admin;
pub use auth::{auth_middleware, require_trusted, AuthUser};
