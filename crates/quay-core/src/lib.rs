//! # quay-core
//!
//! Shared primitives for the quay API facade.
//!
//! This crate provides the foundations used across all quay components:
//!
//! - **Error Types**: the store-facing error taxonomy and result alias
//! - **Observability**: logging initialization helpers
//!
//! ## Crate Boundary
//!
//! `quay-core` is the only crate allowed to define shared primitives.
//! Domain types live in `quay-models`; everything above it depends on the
//! error vocabulary defined here.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod observability;

pub use error::{Error, Result};
pub use observability::{LogFormat, init_logging};
