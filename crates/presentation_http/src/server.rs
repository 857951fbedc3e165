//! Process bootstrap shared by the service binaries
//!
//! Configuration and logging setup, database opening, the outer HTTP layers
//! and graceful shutdown.

use std::{future::IntoFuture, sync::Arc, time::Duration};

use axum::{
    Router,
    http::{HeaderValue, Method},
};
use infrastructure::{
    AppConfig, AsyncDatabase, AsyncDatabaseConfig, DatabaseConfig, ServerConfig, init_tracing,
};
use tokio::{net::TcpListener, signal, sync::Notify};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Default port of the inventory service
pub const INVENTORY_PORT: u16 = 3002;
/// Default port of the order service
pub const ORDER_PORT: u16 = 3001;

const MAX_BODY_BYTES: usize = 64 * 1024;

/// Load and validate configuration, then install logging
///
/// A configuration that fails to load falls back to defaults with a warning;
/// one that loads but fails validation stops the process.
pub fn bootstrap(service_name: &str) -> anyhow::Result<AppConfig> {
    let (config, load_error) = match AppConfig::load() {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    init_tracing(service_name, &config.server.logging())?;
    if let Some(e) = load_error {
        warn!(error = %e, "Failed to load configuration, using defaults");
    }

    config.validate()?;
    Ok(config)
}

/// Open the database and apply migrations if configured
pub async fn open_database(config: &DatabaseConfig) -> anyhow::Result<AsyncDatabase> {
    let database = AsyncDatabase::new(&AsyncDatabaseConfig::from(config)).await?;
    if config.run_migrations {
        database.migrate().await?;
    }
    info!(path = %config.path, "Database ready");
    Ok(database)
}

/// CORS policy from the server configuration
///
/// An empty origin list allows any origin.
pub fn cors_layer(server: &ServerConfig) -> CorsLayer {
    if server.allowed_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = server
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
}

/// Wrap a service router in the outer HTTP layers
pub fn with_outer_layers(app: Router, server: &ServerConfig) -> Router {
    let app = app
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http());
    if server.cors_enabled {
        app.layer(cors_layer(server))
    } else {
        app
    }
}

/// Serve `app` until a shutdown signal, then drain for at most the configured timeout
pub async fn serve(app: Router, server: &ServerConfig, default_port: u16) -> anyhow::Result<()> {
    let addr = server.bind_address(default_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "Server listening");

    let shutdown_timeout = Duration::from_secs(server.shutdown_timeout_secs);
    let stopping = Arc::new(Notify::new());
    let signalled = Arc::clone(&stopping);

    let graceful = axum::serve(listener, with_outer_layers(app, server))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            signalled.notify_one();
        })
        .into_future();

    tokio::select! {
        result = graceful => result?,
        () = async {
            stopping.notified().await;
            info!(?shutdown_timeout, "Waiting for connections to close");
            tokio::time::sleep(shutdown_timeout).await;
        } => {
            warn!(?shutdown_timeout, "Connections still open after shutdown timeout, exiting");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
