//! Salon gateway server
//!
//! Authentication gateway and appointment API for the salon booking app.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::Router;
use chrono::Duration as ChronoDuration;
use sqlx::PgPool;
use tokio::signal;
use tower_http::cors::CorsLayer;

use salon_gateway::appointments::{AppointmentStore, InMemoryAppointmentStore, PgAppointmentStore};
use salon_gateway::auth::janitor::refresh_token_janitor;
use salon_gateway::auth::{
    AccessGuard, AuthService, Clock, KeySetVerifier, LocalSessions, SystemClock, TokenIssuer,
    TokenVerifier,
};
use salon_gateway::config::{AuthMode, Config};
use salon_gateway::provider::SupabaseClient;
use salon_gateway::store::{
    CredentialStore, InMemoryCredentialStore, InMemoryRefreshTokenStore, PgCredentialStore,
    PgRefreshTokenStore, RefreshTokenStore,
};
use salon_gateway::{db, middleware, routes, state::AppState};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    if let Err(e) = run(config).await {
        tracing::error!("Server failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        environment = config.environment.as_str(),
        auth_mode = config.auth_mode.as_str(),
        "Starting salon gateway"
    );

    let db_pool = db::connect(&config).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (auth_service, verifier) = build_auth(&config, db_pool.as_ref(), clock)?;

    let appointments: Arc<dyn AppointmentStore> = match &db_pool {
        Some(pool) => Arc::new(PgAppointmentStore::new(pool.clone())),
        None => Arc::new(InMemoryAppointmentStore::new()),
    };

    let app_state = AppState::new(
        Arc::new(auth_service),
        Arc::new(AccessGuard::new(verifier)),
        appointments,
        db_pool,
    );

    let mut app: Router = routes::build_router(app_state);
    if config.environment.is_production() {
        app = app.layer(axum::middleware::from_fn(middleware::hsts_header));
    }
    let app = app.layer(configure_cors(config.cors_allowed_origins.as_deref()));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.host, config.port))?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check at http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wire the session manager and token verifier for the configured trust model.
fn build_auth(
    config: &Config,
    db_pool: Option<&PgPool>,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<(AuthService, TokenVerifier)> {
    match config.auth_mode {
        AuthMode::Local => {
            let issuer = TokenIssuer::new(
                &config.secret_key,
                config.algorithm,
                ChronoDuration::try_minutes(config.access_token_expire_minutes)
                    .context("ACCESS_TOKEN_EXPIRE_MINUTES out of range")?,
            )?
            .with_leeway(config.token_leeway_seconds)
            .with_clock(clock.clone());

            let (credentials, refresh_tokens): (Arc<dyn CredentialStore>, Arc<dyn RefreshTokenStore>) =
                match db_pool {
                    Some(pool) => (
                        Arc::new(PgCredentialStore::new(pool.clone())),
                        Arc::new(PgRefreshTokenStore::new(pool.clone())),
                    ),
                    None => (
                        Arc::new(InMemoryCredentialStore::new()),
                        Arc::new(InMemoryRefreshTokenStore::new()),
                    ),
                };

            // Start refresh token janitor in background
            let janitor_store = refresh_tokens.clone();
            let janitor_clock = clock.clone();
            let interval = Duration::from_secs(config.refresh_token_purge_interval_seconds.max(1));
            tokio::spawn(async move {
                refresh_token_janitor(janitor_store, janitor_clock, interval).await;
                tracing::error!("Refresh token janitor exited unexpectedly");
            });

            let sessions = LocalSessions::new(
                credentials,
                refresh_tokens,
                issuer.clone(),
                ChronoDuration::try_days(config.refresh_token_expire_days)
                    .context("REFRESH_TOKEN_EXPIRE_DAYS out of range")?,
            )
            .with_clock(clock);

            Ok((AuthService::local(sessions), TokenVerifier::Local(issuer)))
        }
        AuthMode::Provider => {
            let provider_config = config
                .provider
                .as_ref()
                .context("Provider mode requires SUPABASE_URL and SUPABASE_KEY")?;
            let client = Arc::new(SupabaseClient::new(provider_config));

            tracing::info!(jwks_url = client.jwks_url(), "Verifying provider tokens against key set");

            let verifier = KeySetVerifier::new(client.clone(), provider_config.jwt_algorithm)
                .with_audience(provider_config.jwt_audience.clone())
                .with_leeway(config.token_leeway_seconds)
                .with_cache_ttl(Duration::from_secs(config.jwks_cache_ttl_seconds))
                .with_refetch_cooldown(Duration::from_secs(config.jwks_refetch_cooldown_seconds))
                .with_clock(clock);

            Ok((AuthService::provider(client), TokenVerifier::KeySet(verifier)))
        }
    }
}

fn configure_cors(allowed_origins: Option<&str>) -> CorsLayer {
    let Some(allowed_origins) = allowed_origins else {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    };

    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([HeaderName::from_static("x-request-id")])
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
