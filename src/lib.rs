//! History cleanup, batch operations and removal-time bookkeeping for a
//! workflow engine's history store.
//!
//! The [`engine::Engine`] bundles the services ([`services::HistoryService`],
//! [`services::ManagementService`], [`services::RepositoryService`]) with the
//! [`jobs::JobExecutor`] that runs cleanup, batch seed, batch monitor and
//! batch execution jobs. [`routes`] exposes the engine over HTTP.

pub mod authz;
pub mod batch;
pub mod clock;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod history_cleanup;
pub mod jobs;
pub mod models;
pub mod observability;
pub mod removal_time;
pub mod routes;
pub mod services;

pub use engine::{Engine, EngineContext};
pub use error::{EngineError, EngineResult};
