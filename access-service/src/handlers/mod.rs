//! HTTP handlers for access-service.

pub mod auth;
pub mod aws_roles;
pub mod metrics;
pub mod resources;
pub mod users;
