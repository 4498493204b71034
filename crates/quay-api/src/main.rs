//! `quay-api` binary entrypoint.
//!
//! Loads configuration from environment variables, wires the store, hub,
//! worker pool, watcher, and registrations together, and serves until a
//! termination signal. Shutdown is ordered: HTTP drain, hub close, worker
//! drain, router unregister.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use std::sync::Arc;

use anyhow::{Context as _, Result};

use quay_api::config::Config;
use quay_api::server::AppState;
use quay_api::{serve, serve_task_listener};
use quay_core::observability::init_logging;
use quay_runtime::registration::{run_presence_heartbeat, run_router_registration};
use quay_runtime::{CallbackWorkerPool, Hub, run_watcher, shutdown_channel};
use quay_store::{MemoryStore, PresenceKeeper, ReceptorPresence, Store};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_logging(config.log_format);
    tracing::info!(?config, "Starting quay-api");

    let memory_store = Arc::new(MemoryStore::new());
    let store: Arc<dyn Store> = memory_store.clone();
    let keeper: Arc<dyn PresenceKeeper> = memory_store;

    let hub = Hub::new(config.event_buffer_size);
    let (shutdown_handle, shutdown) = shutdown_channel();

    let pool = CallbackWorkerPool::start(Arc::clone(&store), &config.callback_config(), &shutdown);

    let watcher = tokio::spawn(run_watcher(
        Arc::clone(&store),
        hub.clone(),
        shutdown.clone(),
    ));

    let presence = ReceptorPresence {
        receptor_id: ulid::Ulid::new().to_string(),
        receptor_url: format!("http://{}", config.address),
    };
    let heartbeat = tokio::spawn(run_presence_heartbeat(
        keeper,
        presence,
        config.presence_ttl,
        config.heartbeat_retry_interval,
        shutdown.clone(),
    ));

    let registration = config
        .router_registration()?
        .map(|registration| tokio::spawn(run_router_registration(registration, shutdown.clone())));

    let listener = tokio::spawn({
        let address = config.task_handler_address.clone();
        let queue = pool.queue();
        let shutdown = shutdown.clone();
        async move { serve_task_listener(&address, queue, shutdown).await }
    });

    let state = Arc::new(AppState {
        config,
        store,
        hub: hub.clone(),
        callbacks: pool.queue(),
        shutdown: shutdown.clone(),
    });

    let server = tokio::spawn(serve(state));

    tokio::signal::ctrl_c()
        .await
        .context("listening for termination signal")?;
    tracing::info!("Termination signal received; shutting down");
    shutdown_handle.trigger();

    // ordered drain: HTTP first, then the hub, then the workers, then the bus
    server.await?.context("API server failed")?;
    listener.await?.context("task listener failed")?;
    hub.close();
    pool.drain().await;
    if let Some(registration) = registration {
        let _ = registration.await;
    }
    let _ = watcher.await;
    let _ = heartbeat.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
