//! Local status HTTP surface (spec §10.5): `/healthz`, `/readyz`, `/stats`.
//!
//! # Readiness contract
//! `/readyz` reflects local prerequisites only (blob store opened, controller
//! started). Peer/relay connectivity does NOT affect readiness, mirroring
//! `services/forwarder/src/status_http.rs`'s "uplink connectivity does NOT
//! affect readiness" contract.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use hashswarm_protocol::{PeerStats, StorageStats};
use tokio::net::TcpListener;

/// Read-only snapshot the main loop refreshes periodically; the HTTP
/// handlers never reach back into the controller directly (spec §5: the
/// controller is mutated only on its single owner task).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StatsSnapshot {
    pub storage: Option<StorageStats>,
    pub peers: std::collections::HashMap<String, PeerStats>,
    pub in_flight_forwards: usize,
}

#[derive(Clone)]
struct AppState {
    ready: Arc<AtomicBool>,
    stats: Arc<Mutex<StatsSnapshot>>,
}

pub struct StatusServer {
    local_addr: SocketAddr,
}

impl StatusServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn start(
        bind: &str,
        ready: Arc<AtomicBool>,
        stats: Arc<Mutex<StatsSnapshot>>,
    ) -> Result<Self, std::io::Error> {
        let state = AppState { ready, stats };
        let router = Router::new()
            .route("/healthz", get(healthz))
            .route("/readyz", get(readyz))
            .route("/stats", get(stats_handler))
            .with_state(state);

        let listener = TcpListener::bind(bind).await?;
        let local_addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router).await {
                tracing::error!(%err, "status http server exited");
            }
        });
        Ok(Self { local_addr })
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    if state.ready.load(Ordering::Relaxed) {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.stats.lock().unwrap().clone();
    Json(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn readyz_reflects_the_shared_flag() {
        let ready = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(Mutex::new(StatsSnapshot::default()));
        let server = StatusServer::start("127.0.0.1:0", ready.clone(), stats).await.unwrap();

        let url = format!("http://{}/readyz", server.local_addr());
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        ready.store(true, Ordering::Relaxed);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
