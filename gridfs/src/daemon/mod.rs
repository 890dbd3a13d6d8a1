//! Diagnostics endpoint served next to the mount.
//!
//! - `GET /healthz`: probes the backing store with a single metadata read.
//! - `GET /stats`: FUSE operation counters as JSON.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::fuse::stats::{OpStats, StatsSnapshot};
use crate::meta::path;
use crate::store::Region;
use crate::vfs::GridFs;

#[derive(Clone)]
pub struct DiagState {
    fs: GridFs,
    stats: Arc<OpStats>,
}

impl DiagState {
    pub fn new(fs: GridFs, stats: Arc<OpStats>) -> Self {
        Self { fs, stats }
    }
}

pub fn router(state: Arc<DiagState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/stats", get(stats))
        .with_state(state)
}

/// Serve diagnostics on `addr` until `shutdown` resolves.
pub async fn serve<F>(addr: SocketAddr, state: Arc<DiagState>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("diagnostics listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn healthz(State(state): State<Arc<DiagState>>) -> (StatusCode, Json<Value>) {
    match state.fs.store().get_bytes(Region::Metadata, path::ROOT).await {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => {
            warn!(error = %e, "health probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "msg": e.to_string() })),
            )
        }
    }
}

async fn stats(State(state): State<Arc<DiagState>>) -> Json<StatsSnapshot> {
    Json(state.stats.snapshot())
}
