//! Application State Management
//!
//! Shared by all API handlers and the scheduler

use crate::config::PortalConfig;
use crate::jobs::JobContext;
use crate::runner::JobRunner;
use crate::state::JobBoard;
use common::sqlite::SqliteClient;
use std::sync::Arc;
use std::time::Instant;

pub struct AppState {
    pub config: Arc<PortalConfig>,

    pub sqlite_client: SqliteClient,

    /// Runs jobs for the scheduler and the manual trigger endpoint
    pub runner: Arc<JobRunner>,

    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Arc<PortalConfig>, sqlite_client: SqliteClient, ctx: JobContext) -> Self {
        let board = Arc::new(JobBoard::new());
        Self {
            config,
            sqlite_client,
            runner: Arc::new(JobRunner::new(ctx, board)),
            started_at: Instant::now(),
        }
    }

    pub fn context(&self) -> &JobContext {
        self.runner.context()
    }

    pub fn board(&self) -> &JobBoard {
        self.runner.board()
    }
}
