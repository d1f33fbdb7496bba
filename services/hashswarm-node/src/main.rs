// hashswarm-node: runs the blob store, forwarding machine, and peer
// controller as a single owned task (spec §5), plus a small status HTTP
// surface for local operational visibility (spec §10.5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hashswarm_forwarding::{ForwardingConfig, QueryForwardingMachine, SystemClock, TokioTimer};
use hashswarm_node::status_http::{StatsSnapshot, StatusServer};
use hashswarm_node::transport::UnconnectedPeerTransport;
use hashswarm_node::{config, NodeError};
use hashswarm_peer::{ReqwestContentServerClient, WebRtcController};
use hashswarm_store::{BlobStore, SqlitePersistenceDriver};
use tracing::info;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "hashswarm-node starting");

    if let Err(err) = run().await {
        eprintln!("FATAL: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), NodeError> {
    let cfg = config::load_config()?;
    info!(
        content_servers = cfg.content_servers.len(),
        max_bytes = cfg.store.max_bytes,
        "config loaded"
    );

    let driver = SqlitePersistenceDriver::open(std::path::Path::new(&cfg.store.sqlite_path))?;
    let store = BlobStore::new(driver, cfg.store.max_bytes);

    let (timer, mut fired) = TokioTimer::new();
    let forwarding = QueryForwardingMachine::new(
        ForwardingConfig {
            max_forwards_per_peer_window: cfg.forwarding.max_forwards_per_peer_window,
            forward_rate_limit_window: cfg.forwarding.forward_rate_limit_window,
            request_timeout: cfg.forwarding.request_timeout,
        },
        SystemClock,
        timer,
    );

    let mut controller = WebRtcController::new(
        Arc::new(UnconnectedPeerTransport),
        Arc::new(ReqwestContentServerClient::new()),
        forwarding,
        store,
        cfg.peer.reassembly_window,
    );
    controller.set_content_servers(cfg.content_servers.clone());

    let ready = Arc::new(AtomicBool::new(false));
    let stats = Arc::new(Mutex::new(StatsSnapshot::default()));
    let status_server = StatusServer::start(&cfg.status_http.bind, ready.clone(), stats.clone())
        .await
        .map_err(NodeError::StatusHttp)?;
    info!(addr = %status_server.local_addr(), "status http listening");

    ready.store(true, Ordering::Relaxed);
    info!("node ready");

    let mut refresh = tokio::time::interval(Duration::from_secs(5));
    let mut reassembly_sweep = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            token = fired.recv() => {
                match token {
                    Some(hash_key) => {
                        controller.on_timer_fired(&hash_key);
                        controller.drain_forward_timeouts();
                    }
                    None => break,
                }
            }
            _ = reassembly_sweep.tick() => {
                controller.drain_reassembly_timeouts(std::time::Instant::now());
            }
            _ = refresh.tick() => {
                refresh_stats(&controller, &stats);
            }
            () = shutdown_signal() => {
                info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn refresh_stats<C, T, D>(
    controller: &hashswarm_peer::WebRtcController<C, T, D>,
    stats: &Arc<Mutex<StatsSnapshot>>,
) where
    C: hashswarm_forwarding::Clock,
    T: hashswarm_forwarding::Timer,
    D: hashswarm_store::PersistenceDriver,
{
    let storage = controller.stats().ok();
    let peers = controller.peer_stats();
    let in_flight_forwards = controller.in_flight_forwards();
    *stats.lock().unwrap() = StatsSnapshot {
        storage,
        peers,
        in_flight_forwards,
    };
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
