//! Cron-driven job scheduler
//!
//! One task per enabled job. A task sleeps until the next cron tick, runs
//! the job to completion and sleeps again, so a job never overlaps itself.
//! Cancellation is checked between runs; a run in progress finishes first.

use crate::jobs::JobKind;
use crate::runner::JobRunner;
use chrono::Utc;
use common::CancellationToken;
use cron::Schedule;
use errors::PortalError;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct JobScheduler {
    runner: Arc<JobRunner>,
    jobs: Vec<(JobKind, Schedule)>,
}

impl JobScheduler {
    pub fn new(runner: Arc<JobRunner>, jobs: Vec<(JobKind, Schedule)>) -> Self {
        Self { runner, jobs }
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Spawn every job loop; the handles finish once `token` is cancelled
    pub fn start(self, token: CancellationToken) -> Vec<JoinHandle<()>> {
        info!("Starting scheduler with {} jobs", self.jobs.len());
        self.jobs
            .into_iter()
            .map(|(kind, schedule)| {
                let runner = Arc::clone(&self.runner);
                let token = token.clone();
                tokio::spawn(run_schedule(runner, kind, schedule, token))
            })
            .collect()
    }
}

/// Time to wait before the next tick, `None` when the schedule is exhausted
fn until_next(schedule: &Schedule) -> Option<Duration> {
    let next = schedule.upcoming(Utc).next()?;
    Some((next - Utc::now()).to_std().unwrap_or(Duration::ZERO))
}

async fn run_schedule(runner: Arc<JobRunner>, kind: JobKind, schedule: Schedule, token: CancellationToken) {
    debug!("Job {} scheduled: {}", kind, schedule);

    loop {
        let Some(wait) = until_next(&schedule) else {
            warn!("Job {} has no upcoming run, stopping its loop", kind);
            break;
        };

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = token.cancelled() => {
                debug!("Job {} loop cancelled", kind);
                break;
            }
        }

        // Failures are logged and recorded by the runner
        if let Err(PortalError::JobBusy(_)) = runner.execute(kind).await {
            warn!("Job {} still running from a manual trigger, tick skipped", kind);
        }
    }
}
