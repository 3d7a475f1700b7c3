//! Observability module providing logging and metrics.
//!
//! This module initializes and configures:
//! - Structured logging with configurable formats (pretty, compact, JSON)
//! - Prometheus metrics for jobs, history cleanup and batches
//!
//! Engine metrics that the management API reports on are additionally written
//! to the meter log table (see [`crate::engine::EngineContext::record_meter`]).

pub mod metrics;
#[cfg(feature = "server")]
mod tracing_init;

#[cfg(feature = "server")]
pub use tracing_init::*;
