//! Server internals.
//!
//! - [`config`] - CLI and environment configuration.
//! - [`error`] - mapping of [`fyllo::Error`] onto HTTP responses.
//! - [`service`] - axum routes and handlers.
//! - [`telemetry`] - logging, tracing and metrics setup.

pub mod config;
pub mod error;
pub mod service;
pub mod telemetry;
