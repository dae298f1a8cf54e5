//! # HTTP Server
//!
//! [`create_app`] builds the router around an [`AppState`];
//! [`run_server`] wires up the database, the storage backend and the
//! listener from a [`Config`] and serves until Ctrl-C.

use crate::{auth::auth_middleware, config::Config, npm, state::AppState, storage};
use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, put},
    Router,
};
use registry_store::{
    db::{create_pool, run_migrations},
    MetadataStore,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub fn create_app(state: AppState) -> Router {
    let body_limit = state.config.max_body_size_bytes();

    let publish = put(npm::publish_package).route_layer(middleware::from_fn_with_state(
        state.clone(),
        auth_middleware,
    ));

    Router::new()
        .route("/-/ping", get(npm::ping))
        .route("/{package}", get(npm::package_metadata).merge(publish))
        .route("/{package}/{name}", get(npm::scoped_package_metadata))
        .route("/{package}/-/{filename}", get(npm::download_tarball))
        .route(
            "/{package}/{name}/-/{filename}",
            get(npm::scoped_download_tarball),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the application state described by `config`.
pub async fn build_state(config: Config) -> Result<AppState> {
    let pool = create_pool(&config.db_path)
        .await
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;
    info!("Running database migrations...");
    run_migrations(&pool).await.context("Failed to run migrations")?;

    let storage = storage::from_config(&config.storage_driver, &config.storage_driver_opts)
        .context("Failed to initialize storage driver")?;
    info!(driver = storage.name(), "Storage driver ready");

    Ok(AppState::new(MetadataStore::new(pool), storage, config))
}

pub async fn run_server(config: Config) -> Result<()> {
    info!("Starting package registry");

    if config.user_keys.is_empty() {
        info!("No user keys configured, publishing is disabled");
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| {
            error!(host = %config.host, port = config.port, error = %e, "Invalid socket address");
            anyhow::anyhow!("Invalid socket address {}:{}: {}", config.host, config.port, e)
        })?;

    let state = build_state(config).await?;
    let app = create_app(state);

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        error!(addr = %addr, error = %e, "Failed to bind to address");
        anyhow::anyhow!("Failed to bind to {}: {}", addr, e)
    })?;

    info!("Server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!(error = %e, "Server error");
            anyhow::anyhow!("Server error: {}", e)
        })?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
