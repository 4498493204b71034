//! # quay-runtime
//!
//! Long-running members of the quay facade:
//!
//! - **Event hub**: fan-out of the store's change stream to SSE subscribers
//! - **Callback worker pool**: POSTs completion callbacks and resolves tasks
//! - **Watcher**: bridges the store watch into the hub
//! - **Registration**: presence heartbeat and router-tier advertisement
//! - **Shutdown**: the process-wide stop signal every member observes

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod hub;
pub mod registration;
pub mod shutdown;
pub mod watcher;
pub mod worker;

pub use hub::{EventSource, Hub, HubError};
pub use registration::{RouterRegistration, run_presence_heartbeat, run_router_registration};
pub use shutdown::{Shutdown, ShutdownHandle, shutdown_channel};
pub use watcher::run_watcher;
pub use worker::{CallbackConfig, CallbackQueue, CallbackWorkerPool};
