//! HTTP control surface
//!
//! ```text
//! GET  /api/v1/health
//! POST /api/v1/wallet
//! GET  /api/v1/balance/{address}
//! POST /api/v1/treasury/withdraw
//! POST /api/v1/treasury/withdraw-native
//! POST /api/v1/user/withdraw
//! POST /api/v1/user/withdraw-native
//! POST /api/v1/admin/reset            (X-Admin-Secret)
//! ```

pub mod handlers;
pub mod state;
pub mod types;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tracing::info;

use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/wallet", post(handlers::create_wallet))
        .route("/balance/{address}", get(handlers::get_balance))
        .route("/treasury/withdraw", post(handlers::treasury_withdraw))
        .route(
            "/treasury/withdraw-native",
            post(handlers::treasury_withdraw_native),
        )
        .route("/user/withdraw", post(handlers::user_withdraw))
        .route(
            "/user/withdraw-native",
            post(handlers::user_withdraw_native),
        )
        .route("/admin/reset", post(handlers::admin_reset));

    Router::new().nest("/api/v1", api).with_state(state)
}

/// Serve the control surface until the listener fails
pub async fn run_server(host: &str, port: u16, state: Arc<AppState>) -> std::io::Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Control surface listening");
    axum::serve(listener, router(state)).await
}
