use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{info, warn};

use heph_core::docker::DockerRuntime;
use heph_core::hub::StatusHub;
use heph_core::manager::DeploymentManager;
use heph_core::poller::HealthPoller;
use heph_core::runtime::ContainerRuntime;

mod config;
mod error;
mod routes;
mod state;
mod storage;
mod telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    let cfg = config::ServerConfig::load();

    let store = storage::FileStore::new(&cfg.data_dir)?;

    let runtime = Arc::new(DockerRuntime::from_local_defaults()?);
    match runtime.ping().await {
        Ok(()) => info!("container engine reachable"),
        Err(e) => warn!(error = %e, "container engine unreachable; deploys will fail until it is up"),
    }

    let manager = Arc::new(DeploymentManager::new(runtime.clone()));
    let hub = Arc::new(StatusHub::new());

    // Health poller feeds the hub: every snapshot becomes one broadcast.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = {
        let manager = manager.clone();
        let hub = hub.clone();
        HealthPoller::new(
            runtime.clone(),
            cfg.poll_interval,
            Box::new(move |statuses| {
                let message = manager.build_status_message(&statuses);
                let hub = hub.clone();
                tokio::spawn(async move {
                    hub.broadcast(&message).await;
                });
            }),
        )
    };
    let poller_handle = tokio::spawn(poller.run(shutdown_rx));

    let app_state = state::AppState {
        cfg: Arc::new(cfg.clone()),
        manager: manager.clone(),
        hub,
        store: Arc::new(store),
    };
    let router = routes::router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    info!(%addr, "heph server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop polling before touching containers so no broadcast races the
    // teardown.
    let _ = shutdown_tx.send(true);
    let _ = poller_handle.await;

    info!("tearing down managed containers");
    if let Err(e) = runtime.teardown_all().await {
        warn!(error = %e, "teardown on shutdown reported errors");
    }

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
