pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
    Json, Router,
};
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{
        client_ip_middleware, create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter,
        TrustedProxies,
    },
    security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{AccessConfig, Environment};
use crate::dtos::HealthResponse;
use crate::services::{
    AccessService, AdminService, AuditEmitter, AuditSink, CredentialIssuer, FederationService,
    JwtService, MfaService, PrincipalStore, SessionService, SigninTokenExchange,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::registration::signup,
        handlers::auth::session::login,
        handlers::auth::mfa::enroll,
        handlers::auth::mfa::verify,
        handlers::aws_roles::list_roles,
        handlers::aws_roles::create_role_session,
        handlers::aws_roles::role_session,
        handlers::resources::list_resources,
        handlers::users::update_role,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::HealthResponse,
            dtos::auth::SignupRequest,
            dtos::auth::LoginRequest,
            dtos::auth::MfaVerifyRequest,
            dtos::auth::AuthResponse,
            dtos::auth::LoginResponse,
            dtos::auth::MfaEnrollResponse,
            dtos::access::RoleSessionRequest,
            dtos::access::RoleSessionResponse,
            dtos::access::RoleGrantListResponse,
            dtos::access::ResourceListResponse,
            dtos::admin::UpdateRoleRequest,
            models::PrincipalResponse,
            models::RoleGrantResponse,
            models::Resource,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Signup and password login"),
        (name = "MFA", description = "TOTP enrollment and verification"),
        (name = "AWS", description = "Granted roles and federated console sessions"),
        (name = "Resources", description = "Policy-filtered resource listing"),
        (name = "Users", description = "Application role administration"),
        (name = "Observability", description = "Health and metrics")
    ),
    info(
        title = "Access Service API",
        version = "1.0.0",
        description = "Zero-trust access: policy decisions, MFA-gated sessions and federated cloud console sign-in"
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AccessConfig,
    pub store: Arc<dyn PrincipalStore>,
    pub jwt: JwtService,
    pub session_service: SessionService,
    pub access_service: AccessService,
    pub admin_service: AdminService,
    pub login_rate_limiter: IpRateLimiter,
    pub signup_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wire the services over the given collaborators. The signing secret is
    /// read from `config.token` here and nowhere else.
    pub fn new(
        config: AccessConfig,
        store: Arc<dyn PrincipalStore>,
        audit_sink: Arc<dyn AuditSink>,
        credentials: Arc<dyn CredentialIssuer>,
        exchange: Arc<dyn SigninTokenExchange>,
    ) -> Result<Self, anyhow::Error> {
        let jwt = JwtService::new(&config.token)?;
        let audit = AuditEmitter::new(audit_sink);
        let mfa = MfaService::new(config.mfa.issuer.clone());
        let federation = FederationService::new(&config.federation, credentials, exchange);

        let session_service =
            SessionService::new(store.clone(), jwt.clone(), mfa, audit.clone());
        let access_service = AccessService::new(store.clone(), federation, audit.clone());
        let admin_service = AdminService::new(store.clone(), audit);

        let limits = &config.rate_limit;
        let login_rate_limiter =
            create_ip_rate_limiter(limits.login_attempts, limits.login_window_seconds);
        let signup_rate_limiter =
            create_ip_rate_limiter(limits.signup_attempts, limits.signup_window_seconds);
        let ip_rate_limiter =
            create_ip_rate_limiter(limits.global_ip_limit, limits.global_ip_window_seconds);

        Ok(Self {
            config,
            store,
            jwt,
            session_service,
            access_service,
            admin_service,
            login_rate_limiter,
            signup_rate_limiter,
            ip_rate_limiter,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let login_route = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let signup_route = Router::new()
        .route("/auth/signup", post(handlers::auth::signup))
        .layer(from_fn_with_state(
            state.signup_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    // Either token tier
    let mfa_routes = Router::new()
        .route("/auth/mfa/enroll", post(handlers::auth::enroll))
        .route("/auth/mfa/verify", post(handlers::auth::verify))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let trusted_routes = Router::new()
        .route("/me/aws/roles", get(handlers::aws_roles::list_roles))
        .route(
            "/me/aws/roles/:role_id/session",
            post(handlers::aws_roles::create_role_session),
        )
        .route("/aws-role-session", post(handlers::aws_roles::role_session))
        .route("/resources", get(handlers::resources::list_resources))
        .layer(from_fn(middleware::require_trusted))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/users/:id/role", patch(handlers::users::update_role))
        .layer(from_fn(middleware::require_admin))
        .layer(from_fn(middleware::require_trusted))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics));

    if state.config.environment == Environment::Dev {
        app = app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        );
    }

    app.merge(login_route)
        .merge(signup_route)
        .merge(mfa_routes)
        .merge(trusted_routes)
        .merge(admin_routes)
        .with_state(state.clone())
        .layer(from_fn_with_state(
            state.ip_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ))
        // Resolved before any limiter or handler reads the client address
        .layer(from_fn_with_state(
            TrustedProxies::new(state.config.security.trusted_proxies.iter().copied()),
            client_ip_middleware,
        ))
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri().path(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config.security.allowed_origins))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(600))
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Principal store unreachable", body = HealthResponse)
    ),
    tag = "Observability"
)]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (status, label) = match state.store.health_check().await {
        Ok(()) => (StatusCode::OK, "healthy"),
        Err(e) => {
            tracing::error!(error = %e, "Principal store health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
        }
    };

    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            service: state.config.service_name.clone(),
            version: state.config.service_version.clone(),
            environment: state.config.environment.to_string(),
        }),
    )
}
