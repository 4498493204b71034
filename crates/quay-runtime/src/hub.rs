//! Event hub: multi-consumer fan-out of the store's change stream.
//!
//! One publisher, N independent subscriptions. Each subscription has its
//! own bounded buffer; a subscription that falls behind is evicted so the
//! publisher is never blocked. Every subscription observes the same prefix
//! of the publish order.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use metrics::counter;
use tokio::sync::mpsc;

use quay_models::Event;

/// Default per-subscription buffer capacity.
pub const DEFAULT_PENDING_EVENT_BUFFER: usize = 1024;

/// Errors surfaced by the hub and its subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// `subscribe` was called after the hub closed.
    #[error("subscribed to closed hub")]
    SubscribedToClosedHub,
    /// `next` was called on a closed subscription (own close or hub close).
    #[error("read from closed source")]
    ReadFromClosedSource,
    /// `close` was called on an already-closed subscription.
    #[error("source already closed")]
    SourceAlreadyClosed,
    /// The subscription was evicted for falling behind the publisher.
    #[error("slow consumer")]
    SlowConsumer,
}

struct Subscriber {
    sender: mpsc::Sender<Event>,
    evicted: Arc<AtomicBool>,
}

struct HubState {
    closed: bool,
    next_id: u64,
    subscribers: HashMap<u64, Subscriber>,
}

/// Fan-out multiplexer for change events.
#[derive(Clone)]
pub struct Hub {
    state: Arc<Mutex<HubState>>,
    buffer: usize,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(DEFAULT_PENDING_EVENT_BUFFER)
    }
}

impl Hub {
    /// Creates an open hub with the given per-subscription buffer capacity.
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState {
                closed: false,
                next_id: 0,
                subscribers: HashMap::new(),
            })),
            buffer: buffer.max(1),
        }
    }

    /// Delivers an event to every live subscription.
    ///
    /// Never blocks. A subscription whose buffer is full is evicted: its
    /// buffered events are discarded and its next `next()` reports
    /// [`HubError::SlowConsumer`]. Publishing to a closed hub is a no-op.
    pub fn publish(&self, event: &Event) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.subscribers.retain(|id, subscriber| {
            match subscriber.sender.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    subscriber.evicted.store(true, Ordering::SeqCst);
                    counter!("quay_hub_slow_consumers_evicted_total").increment(1);
                    tracing::warn!(subscription = *id, "Evicting slow event subscriber");
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    /// Opens a new subscription.
    ///
    /// # Errors
    ///
    /// Fails with [`HubError::SubscribedToClosedHub`] after `close`.
    pub fn subscribe(&self) -> Result<EventSource, HubError> {
        let mut state = self.lock();
        if state.closed {
            return Err(HubError::SubscribedToClosedHub);
        }
        let id = state.next_id;
        state.next_id += 1;

        let (sender, receiver) = mpsc::channel(self.buffer);
        let evicted = Arc::new(AtomicBool::new(false));
        state.subscribers.insert(
            id,
            Subscriber {
                sender,
                evicted: Arc::clone(&evicted),
            },
        );

        Ok(EventSource {
            id,
            receiver,
            evicted,
            closed: false,
            hub: Arc::clone(&self.state),
        })
    }

    /// Closes the hub: wakes every pending `next()`, rejects further
    /// subscriptions, and turns `publish` into a no-op. Terminal.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        // dropping the senders wakes every blocked next()
        state.subscribers.clear();
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubState> {
        // the mutex is only held for map mutations; poisoning is unreachable
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// One subscription to the hub.
pub struct EventSource {
    id: u64,
    receiver: mpsc::Receiver<Event>,
    evicted: Arc<AtomicBool>,
    closed: bool,
    hub: Arc<Mutex<HubState>>,
}

impl EventSource {
    /// Waits for the next event in publish order.
    ///
    /// # Errors
    ///
    /// - [`HubError::SlowConsumer`] once after eviction; buffered events
    ///   are discarded.
    /// - [`HubError::ReadFromClosedSource`] after this source's `close`
    ///   or the hub's close.
    pub async fn next(&mut self) -> Result<Event, HubError> {
        if self.closed {
            return Err(HubError::ReadFromClosedSource);
        }
        if self.evicted.load(Ordering::SeqCst) {
            return Err(self.discard_buffer());
        }
        match self.receiver.recv().await {
            Some(event) => {
                // eviction may have struck while we were parked; the event
                // just handed over belongs to the discarded buffer
                if self.evicted.load(Ordering::SeqCst) {
                    return Err(self.discard_buffer());
                }
                Ok(event)
            }
            None => {
                if self.evicted.load(Ordering::SeqCst) {
                    Err(HubError::SlowConsumer)
                } else {
                    Err(HubError::ReadFromClosedSource)
                }
            }
        }
    }

    fn discard_buffer(&mut self) -> HubError {
        while self.receiver.try_recv().is_ok() {}
        HubError::SlowConsumer
    }

    /// Closes this subscription.
    ///
    /// # Errors
    ///
    /// Fails with [`HubError::SourceAlreadyClosed`] on a second close.
    pub fn close(&mut self) -> Result<(), HubError> {
        if self.closed {
            return Err(HubError::SourceAlreadyClosed);
        }
        self.closed = true;
        if let Ok(mut state) = self.hub.lock() {
            state.subscribers.remove(&self.id);
        }
        Ok(())
    }
}

impl fmt::Debug for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .field("evicted", &self.evicted.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use quay_models::DesiredLRP;

    fn event(guid: &str) -> Event {
        Event::desired_lrp_created(DesiredLRP {
            process_guid: guid.to_string(),
            domain: "test-domain".to_string(),
            rootfs: "docker:///lucid64".to_string(),
            ..DesiredLRP::default()
        })
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_the_publish_order() -> Result<()> {
        let hub = Hub::new(16);
        let mut first = hub.subscribe()?;
        let mut second = hub.subscribe()?;

        for guid in ["a", "b", "c"] {
            hub.publish(&event(guid));
        }
        for source in [&mut first, &mut second] {
            assert_eq!(source.next().await?.key(), "a");
            assert_eq!(source.next().await?.key(), "b");
            assert_eq!(source.next().await?.key(), "c");
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_subscribe_after_close_fails() {
        let hub = Hub::new(16);
        hub.close();
        assert_eq!(hub.subscribe().unwrap_err(), HubError::SubscribedToClosedHub);
    }

    #[tokio::test]
    async fn test_hub_close_wakes_pending_next() -> Result<()> {
        let hub = Hub::new(16);
        let mut source = hub.subscribe()?;

        let reader = tokio::spawn(async move { source.next().await });
        tokio::task::yield_now().await;
        hub.close();

        assert_eq!(reader.await?.unwrap_err(), HubError::ReadFromClosedSource);
        Ok(())
    }

    #[tokio::test]
    async fn test_publish_after_close_is_a_no_op() {
        let hub = Hub::new(16);
        hub.close();
        hub.publish(&event("a"));
    }

    #[tokio::test]
    async fn test_own_close_is_reported_once() -> Result<()> {
        let hub = Hub::new(16);
        let mut source = hub.subscribe()?;
        source.close()?;
        assert_eq!(source.close().unwrap_err(), HubError::SourceAlreadyClosed);
        assert_eq!(
            source.next().await.unwrap_err(),
            HubError::ReadFromClosedSource
        );
        assert_eq!(hub.subscriber_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_slow_consumer_is_evicted_without_harming_others() -> Result<()> {
        let hub = Hub::new(2);
        let mut slow = hub.subscribe()?;
        let mut healthy = hub.subscribe()?;

        // the healthy subscriber keeps draining; the slow one never reads
        hub.publish(&event("a"));
        assert_eq!(healthy.next().await?.key(), "a");
        hub.publish(&event("b"));
        assert_eq!(healthy.next().await?.key(), "b");
        hub.publish(&event("c")); // overflows slow (capacity 2)

        assert_eq!(slow.next().await.unwrap_err(), HubError::SlowConsumer);
        assert_eq!(healthy.next().await?.key(), "c");
        Ok(())
    }

    #[tokio::test]
    async fn test_eviction_discards_buffered_events() -> Result<()> {
        let hub = Hub::new(1);
        let mut slow = hub.subscribe()?;
        hub.publish(&event("a")); // buffered
        hub.publish(&event("b")); // overflow, evicts

        assert_eq!(slow.next().await.unwrap_err(), HubError::SlowConsumer);
        Ok(())
    }

    #[tokio::test]
    async fn test_event_received_while_parked_is_discarded_on_eviction() -> Result<()> {
        // current-thread scheduler: the reader parks in next(), both
        // publishes land before it runs again, so the event handed to the
        // parked recv must be dropped in favor of SlowConsumer
        let hub = Hub::new(1);
        let mut slow = hub.subscribe()?;
        let reader = tokio::spawn(async move { slow.next().await });
        tokio::task::yield_now().await;

        hub.publish(&event("a")); // buffered, wakes the reader
        hub.publish(&event("b")); // overflow, evicts

        assert_eq!(reader.await?.unwrap_err(), HubError::SlowConsumer);
        Ok(())
    }

    #[tokio::test]
    async fn test_source_debug_names_the_subscription() -> Result<()> {
        let hub = Hub::new(4);
        let source = hub.subscribe()?;
        let rendered = format!("{source:?}");
        assert!(rendered.contains("EventSource"));
        assert!(rendered.contains("closed: false"));
        Ok(())
    }

    #[tokio::test]
    async fn test_publisher_is_never_blocked() -> Result<()> {
        let hub = Hub::new(1);
        let _slow = hub.subscribe()?;
        for i in 0..100 {
            hub.publish(&event(&format!("e{i}")));
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_dropping_a_source_unsubscribes_it() -> Result<()> {
        let hub = Hub::new(4);
        let source = hub.subscribe()?;
        assert_eq!(hub.subscriber_count(), 1);
        drop(source);
        assert_eq!(hub.subscriber_count(), 0);
        Ok(())
    }

    #[test]
    fn test_healthy_next_then_evicted_wait_wakes() {
        // regression shape: a reader blocked in recv() when eviction
        // happens must wake with SlowConsumer, not hang
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let hub = Hub::new(1);
            let mut slow = hub.subscribe().unwrap();
            let reader = tokio::spawn(async move { slow.next().await });
            tokio::task::yield_now().await;

            hub.publish(&event("a"));
            hub.publish(&event("b"));

            let first = reader.await.unwrap();
            assert!(matches!(first, Ok(_) | Err(HubError::SlowConsumer)));
        });
    }
}
