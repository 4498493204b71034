//! Store watcher: bridges the store's change stream into the hub.

use std::sync::Arc;

use tokio::sync::broadcast;

use quay_store::Store;

use crate::hub::Hub;
use crate::shutdown::Shutdown;

/// Forwards store change events into the hub until shutdown or until the
/// store's stream closes.
///
/// A lagged receiver skips the missed events and keeps going; per-consumer
/// backpressure is the hub's concern, not the watcher's.
pub async fn run_watcher(store: Arc<dyn Store>, hub: Hub, mut shutdown: Shutdown) {
    let mut events = store.watch();
    tracing::debug!("Store watcher started");
    loop {
        tokio::select! {
            () = shutdown.triggered() => break,
            received = events.recv() => match received {
                Ok(event) => hub.publish(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Store watcher lagged behind the change stream");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    tracing::debug!("Store watcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::time::Duration;

    use quay_models::DesiredLRP;
    use quay_store::MemoryStore;

    use crate::shutdown::shutdown_channel;

    #[tokio::test]
    async fn test_store_changes_reach_hub_subscribers() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let hub = Hub::new(16);
        let (handle, shutdown) = shutdown_channel();
        let watcher = tokio::spawn(run_watcher(store.clone(), hub.clone(), shutdown));
        tokio::task::yield_now().await;

        let mut source = hub.subscribe()?;
        store
            .desire_lrp(DesiredLRP {
                process_guid: "p1".to_string(),
                domain: "test-domain".to_string(),
                rootfs: "docker:///lucid64".to_string(),
                instances: 1,
                ..DesiredLRP::default()
            })
            .await?;

        let event = tokio::time::timeout(Duration::from_secs(2), source.next()).await??;
        assert_eq!(event.event_type(), "desired_lrp_created");
        assert_eq!(event.key(), "p1");

        handle.trigger();
        watcher.await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_watcher_stops_on_shutdown() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let (handle, shutdown) = shutdown_channel();
        let watcher = tokio::spawn(run_watcher(store, Hub::new(16), shutdown));

        handle.trigger();
        tokio::time::timeout(Duration::from_secs(2), watcher).await??;
        Ok(())
    }
}
