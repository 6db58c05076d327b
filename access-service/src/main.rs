use access_service::{
    build_router,
    config::AccessConfig,
    db,
    services::{
        AuditSink, CredentialIssuer, Database, FederationEndpoint, PrincipalStore,
        SigninTokenExchange, StsCredentialIssuer,
    },
    AppState,
};
use aws_config::{timeout::TimeoutConfig, BehaviorVersion, Region};
use service_core::error::AppError;
use service_core::observability::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    // Fail fast on invalid configuration
    let config = AccessConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );
    access_service::services::metrics::init_metrics();

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = %config.environment,
        "Starting access service"
    );

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;
    tracing::info!("Database initialized");

    let database = Arc::new(Database::new(pool));
    let store: Arc<dyn PrincipalStore> = database.clone();
    let audit_sink: Arc<dyn AuditSink> = database;

    let provider_timeout = Duration::from_secs(config.federation.timeout_seconds);
    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.federation.region.clone()))
        .timeout_config(
            TimeoutConfig::builder()
                .operation_timeout(provider_timeout)
                .build(),
        )
        .load()
        .await;
    let credentials: Arc<dyn CredentialIssuer> = Arc::new(StsCredentialIssuer::new(&sdk_config));
    let exchange: Arc<dyn SigninTokenExchange> = Arc::new(FederationEndpoint::new(
        config.federation.signin_url.clone(),
        provider_timeout,
    )?);
    tracing::info!(region = %config.federation.region, "Federation providers initialized");

    let state = AppState::new(config.clone(), store, audit_sink, credentials, exchange)?;
    let app = build_router(state);

    let addr = config.common.bind_addr();
    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = %config.environment,
    );
    let _guard = service_span.enter();

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    service_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
