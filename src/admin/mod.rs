//! Read-only monitoring API.
//!
//! Every route requires `Authorization: Bearer <admin.api_key>`.
//!
//! - `GET /admin/status` process summary
//! - `GET /admin/targets` target snapshots with paired counts
//! - `GET /admin/pairs` snapshots of every pair
//! - `GET /admin/pairs/{target_id}` pairs attached to one target

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::lifecycle::TaskSupervisor;
use crate::load_balancer::TargetRegistry;
use crate::net::listener::AcceptGate;
use crate::pairing::PairRegistry;

/// Shared state behind the monitoring API.
#[derive(Debug, Clone)]
pub struct AdminState {
    pub pairs: Arc<PairRegistry>,
    pub targets: Arc<TargetRegistry>,
    pub gate: AcceptGate,
    pub supervisor: TaskSupervisor,
    pub api_key: Arc<str>,
    pub started: Instant,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/targets", get(get_targets))
        .route("/admin/pairs", get(get_pairs))
        .route("/admin/pairs/{target_id}", get(get_target_pairs))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `router` on `listener` until shutdown is signalled.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(address = %addr, "Monitoring API listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}
