//! Process-wide shutdown signal.
//!
//! Every long-lived task (SSE loops, callback workers, the watcher, the
//! registrations) holds a [`Shutdown`] receiver and stops when the handle
//! triggers.

use tokio::sync::watch;

/// Creates a linked shutdown handle and receiver.
#[must_use]
pub fn shutdown_channel() -> (ShutdownHandle, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, Shutdown { rx })
}

/// The triggering side, held by the process supervisor.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Signals every receiver to stop.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// A new receiver linked to this handle.
    #[must_use]
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

/// The observing side, cloned into every long-lived task.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Completes once shutdown has been triggered. Also completes when the
    /// handle is dropped, so orphaned tasks never hang.
    pub async fn triggered(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Whether shutdown has already been triggered.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}
