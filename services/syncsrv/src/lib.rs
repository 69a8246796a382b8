//! Portal Sync Service
//!
//! Keeps the portal database in line with the cloud device registry:
//!
//! - **jobs**: device, edge device, concentrator and gateway ID sync, metric
//!   loaders/exporters and planning command dispatch
//! - **repository**: SQLite tables written through one unit of work per run
//! - **scheduler**: cron-driven job loops
//! - **api**: admin endpoints (health, metrics, job status and triggers)

pub mod api;
pub mod app_state;
pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod jobs;
pub mod metrics;
pub mod repository;
pub mod runner;
pub mod scheduler;
pub mod schema;
pub mod state;

pub use app_state::AppState;
pub use config::PortalConfig;
pub use jobs::{run_job, JobContext, JobKind, SyncReport};
pub use runner::JobRunner;
pub use scheduler::JobScheduler;
