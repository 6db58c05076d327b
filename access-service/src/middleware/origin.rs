use axum::{
    extract::{FromRequestParts, OriginalUri},
    http::request::Parts,
};
use service_core::middleware::rate_limit::request_client_ip;
use std::convert::Infallible;

use crate::models::RequestOrigin;

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestOrigin
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let path = parts
            .extensions
            .get::<OriginalUri>()
            .map(|OriginalUri(uri)| uri.path().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());

        Ok(RequestOrigin::new(
            parts.method.as_str(),
            path,
            request_client_ip(&parts.extensions).map(|ip| ip.to_string()),
        ))
    }
}
