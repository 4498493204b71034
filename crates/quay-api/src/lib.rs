//! # quay-api
//!
//! The HTTP + SSE surface of the quay facade:
//!
//! - `/v1` routes for tasks, desired and actual LRPs, cells, domains,
//!   the event stream, and cookie minting
//! - middleware for CORS, cookie-carried credentials, and basic auth
//! - the loopback task-completion listener
//! - environment-driven configuration and the binary entrypoint

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod task_listener;

pub use config::{Config, ConfigError};
pub use error::{ApiError, ApiErrorBody, ApiResult};
pub use server::{AppState, create_router, serve};
pub use task_listener::serve_task_listener;
