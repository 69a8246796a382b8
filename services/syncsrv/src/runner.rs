//! Runs jobs while keeping the status board and job counters current

use crate::jobs::{run_job, JobContext, JobKind, SyncReport};
use crate::state::JobBoard;
use errors::{PortalError, PortalResult};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, Instrument};

pub struct JobRunner {
    ctx: JobContext,
    board: Arc<JobBoard>,
}

impl JobRunner {
    pub fn new(ctx: JobContext, board: Arc<JobBoard>) -> Self {
        Self { ctx, board }
    }

    pub fn context(&self) -> &JobContext {
        &self.ctx
    }

    pub fn board(&self) -> &Arc<JobBoard> {
        &self.board
    }

    /// Run `kind` now, unless a run of the same job is in progress
    pub async fn execute(&self, kind: JobKind) -> PortalResult<SyncReport> {
        let Some(guard) = self.board.try_start(kind) else {
            return Err(PortalError::JobBusy(kind.name().to_string()));
        };

        let started = Instant::now();
        let result = run_job(kind, &self.ctx)
            .instrument(tracing::info_span!("job", name = kind.name()))
            .await;
        let seconds = started.elapsed().as_secs_f64();

        match result {
            Ok(report) => {
                let status = if report.failures.is_empty() { "success" } else { "partial" };
                self.ctx.gauges.record_run(kind.name(), status, seconds);
                info!("Job {} finished in {:.2}s ({})", kind, seconds, status);
                guard.succeeded(report.clone());
                Ok(report)
            },
            Err(e) => {
                self.ctx.gauges.record_run(kind.name(), "failed", seconds);
                error!("Job {} failed after {:.2}s: {}", kind, seconds, e);
                guard.failed(e.to_string());
                Err(e)
            },
        }
    }
}
