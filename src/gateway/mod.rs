pub mod handlers;
pub mod state;
pub mod types;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::auth::middleware::{jwt_auth_middleware, require_admin};
use state::AppState;

/// Assemble the full router. Split out from [`run_server`] so tests can
/// drive it in-process.
pub fn build_router(state: Arc<AppState>) -> Router {
    // ==========================================================================
    // Public routes (no auth required)
    // ==========================================================================
    let public_routes = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/verify", post(handlers::auth::verify))
        .route("/flash-sale/status", get(handlers::sale::flash_sale_status))
        .route("/health", get(handlers::health::health))
        .route("/health/ready", get(handlers::health::ready))
        .route("/health/live", get(handlers::health::live));

    // ==========================================================================
    // User routes (JWT required)
    // ==========================================================================
    let user_routes = Router::new()
        .route("/purchase", post(handlers::purchase::create_purchase))
        .route("/purchase/status", get(handlers::purchase::purchase_status))
        .route("/purchase/job/{job_id}", get(handlers::purchase::job_status))
        .layer(from_fn_with_state(state.clone(), jwt_auth_middleware));

    // ==========================================================================
    // Admin routes (JWT + admin role). Layers run bottom-up: the JWT layer
    // added last executes first.
    // ==========================================================================
    let admin_routes = Router::new()
        .route("/admin/flash-sale", post(handlers::admin::create_sale))
        .route("/admin/flash-sale/{sale_id}", get(handlers::admin::get_sale))
        .route(
            "/admin/flash-sale/{sale_id}/stats",
            get(handlers::admin::sale_stats),
        )
        .layer(axum::middleware::from_fn(require_admin))
        .layer(from_fn_with_state(state.clone(), jwt_auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(user_routes)
        .merge(admin_routes)
        .with_state(state)
}

/// Start the HTTP gateway. Resolves when the shutdown signal fires and all
/// connections have drained.
pub async fn run_server(state: Arc<AppState>, port: u16) -> anyhow::Result<()> {
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {} (port already in use?)", addr, e))?;

    tracing::info!("Gateway listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install shutdown handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received, draining connections");
}
