/**
 * HOSTWATCH KERNEL - Entry point of the host inventory service
 *
 * ROLE: Wires config, store, prober, reconciler, shutdown invoker and the
 * HTTP router, then serves until Ctrl-C.
 *
 * ARCHITECTURE: JSON-file record store + TCP reachability prober +
 * single-flighted health reconciler + templated remote shutdown, behind axum.
 */

mod config;
mod error;
mod health;
mod http;
mod images;
mod inventory;
mod models;
mod probe;
mod response;
mod seed;
mod shutdown;
mod singleflight;
mod store;

use crate::config::load_config;
use crate::health::HealthReconciler;
use crate::http::AppState;
use crate::images::{ImageLibrary, ImageRotation};
use crate::inventory::Inventory;
use crate::probe::TcpProber;
use crate::shutdown::{ProcessRunner, ShutdownInvoker};
use crate::store::{HostStore, JsonHostStore};

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hostwatch_kernel=info")),
        )
        .init();

    let cfg = load_config().await;

    let store: Arc<dyn HostStore> = match &cfg.storage.path {
        Some(path) => Arc::new(
            JsonHostStore::open(path).with_context(|| format!("failed to open host store at {}", path.display()))?,
        ),
        None => {
            warn!("no storage path configured, inventory is kept in memory");
            Arc::new(JsonHostStore::new_in_memory())
        }
    };

    let rotation = Arc::new(ImageRotation::new(&cfg.http.public_url, &cfg.images.names));
    let inventory = Arc::new(Inventory::new(store.clone(), rotation));
    if cfg.seed {
        seed::seed_demo_hosts(&inventory).context("failed to seed demo hosts")?;
    }

    let prober = Arc::new(TcpProber::new(cfg.probe.ports.clone()));
    let reconciler = HealthReconciler::new(store.clone(), prober, cfg.probe.timeout());

    let runner = Arc::new(ProcessRunner::new(cfg.shutdown.timeout()));
    let shutdown = Arc::new(ShutdownInvoker::new(store.clone(), runner, cfg.shutdown.command.clone()));

    let app_state = AppState {
        inventory,
        reconciler,
        shutdown,
        images: Arc::new(ImageLibrary::new(&cfg.images.dir)),
    };
    let app = http::build_router(app_state, &cfg.http.cors_origins);

    let listener = TcpListener::bind(&cfg.http.bind)
        .await
        .with_context(|| format!("failed to bind {}", cfg.http.bind))?;
    info!(addr = %cfg.http.bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("cannot listen for ctrl-c: {e}");
                std::future::pending::<()>().await;
            }
            info!("shutting down");
        })
        .await
        .context("http server failed")?;
    Ok(())
}
