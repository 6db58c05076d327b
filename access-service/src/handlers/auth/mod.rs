pub mod mfa;
pub mod registration;
pub mod session;

pub use mfa::{enroll, verify};
pub use registration::signup;
pub use session::login;
