//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, ResolverDomainAdapter, StaticCatalog},
    config::Config,
    error::ApiError,
    web::{self, rest::ApiDoc, AppState},
};
use axum::Router;
use kuberstack_core::ports::SessionStore;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Open the Session Store & Run Migrations ---
    info!(url = %config.database_url, "Opening session store...");
    let store = Arc::new(DbAdapter::connect(&config.database_url, config.auth_expire).await?);
    info!("Running database migrations...");
    store.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(
        config.clone(),
        store.clone(),
        Arc::new(StaticCatalog::new()),
        Arc::new(ResolverDomainAdapter::new(config.known_domains.clone())),
    ));

    let interrupted = app_state.installer.reconcile_interrupted().await?;
    if interrupted > 0 {
        warn!(interrupted, "Installations interrupted by the last shutdown were marked failed");
    }

    // --- 4. Start the Cleanup Loop ---
    let cancel = CancellationToken::new();
    let cleanup = app_state
        .auth
        .spawn_cleanup_loop(config.cleanup_interval, cancel.clone());

    // --- 5. Create the Web Router ---
    let app = Router::new()
        .merge(web::router(app_state.clone()))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Serve Until Shutdown ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // --- 7. Stop Background Work, Then Close the Store ---
    cancel.cancel();
    if let Err(e) = cleanup.await {
        error!(error = %e, "Cleanup loop ended abnormally");
    }
    store.close().await;
    info!("Session store closed. Bye.");

    served?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
