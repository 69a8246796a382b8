//! Shared in-memory state read by the API and written by jobs

use crate::jobs::{JobKind, SyncReport};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

/// LoRaWAN gateway IDs, swapped atomically by the gateway job
#[derive(Debug, Default)]
pub struct GatewayIdList {
    ids: ArcSwap<Vec<String>>,
}

impl GatewayIdList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<Vec<String>> {
        self.ids.load_full()
    }

    pub fn replace(&self, ids: Vec<String>) {
        self.ids.store(Arc::new(ids));
    }
}

/// Portal counts computed by the metric loaders
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalMetricsSnapshot {
    pub device_count: i64,
    pub connected_device_count: i64,
    pub edge_device_count: i64,
    pub connected_edge_device_count: i64,
    pub failed_deployment_count: i64,
    pub concentrator_count: i64,
    pub connected_concentrator_count: i64,
}

#[derive(Debug, Default)]
pub struct PortalMetrics {
    inner: RwLock<PortalMetricsSnapshot>,
}

impl PortalMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> PortalMetricsSnapshot {
        *self.inner.read()
    }

    /// Apply a change to the counts, other fields keep their value
    pub fn update(&self, f: impl FnOnce(&mut PortalMetricsSnapshot)) {
        f(&mut self.inner.write());
    }
}

/// Last known state of a job
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job: &'static str,
    pub running: bool,
    pub runs: u64,
    pub last_started: Option<DateTime<Utc>>,
    pub last_report: Option<SyncReport>,
    pub last_error: Option<String>,
}

impl JobStatus {
    fn new(kind: JobKind) -> Self {
        Self {
            job: kind.name(),
            running: false,
            runs: 0,
            last_started: None,
            last_report: None,
            last_error: None,
        }
    }
}

/// Per-job status board; at most one run of a job at a time
#[derive(Debug, Default)]
pub struct JobBoard {
    jobs: DashMap<JobKind, JobStatus>,
}

impl JobBoard {
    pub fn new() -> Self {
        let board = Self::default();
        for kind in JobKind::ALL {
            board.jobs.insert(*kind, JobStatus::new(*kind));
        }
        board
    }

    /// Mark the job running, `None` when a run is already in progress
    pub fn try_start(&self, kind: JobKind) -> Option<RunGuard<'_>> {
        let mut status = self.jobs.entry(kind).or_insert_with(|| JobStatus::new(kind));
        if status.running {
            return None;
        }
        status.running = true;
        status.runs += 1;
        status.last_started = Some(Utc::now());
        Some(RunGuard { board: self, kind })
    }

    pub fn status(&self, kind: JobKind) -> Option<JobStatus> {
        self.jobs.get(&kind).map(|s| s.clone())
    }

    /// Every job in declaration order
    pub fn all(&self) -> Vec<JobStatus> {
        JobKind::ALL.iter().filter_map(|kind| self.status(*kind)).collect()
    }
}

/// Clears the running flag when dropped, even if the run was cancelled
pub struct RunGuard<'a> {
    board: &'a JobBoard,
    kind: JobKind,
}

impl RunGuard<'_> {
    pub fn succeeded(self, report: SyncReport) {
        if let Some(mut status) = self.board.jobs.get_mut(&self.kind) {
            status.last_report = Some(report);
            status.last_error = None;
        }
    }

    pub fn failed(self, error: String) {
        if let Some(mut status) = self.board.jobs.get_mut(&self.kind) {
            status.last_error = Some(error);
        }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut status) = self.board.jobs.get_mut(&self.kind) {
            status.running = false;
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_gateway_list_replace() {
        let list = GatewayIdList::new();
        assert!(list.snapshot().is_empty());
        let before = list.snapshot();
        list.replace(vec!["gw-1".into(), "gw-2".into()]);
        assert_eq!(list.snapshot().as_slice(), ["gw-1", "gw-2"]);
        // Readers keep the list they loaded
        assert!(before.is_empty());
    }

    #[test]
    fn test_metrics_update_keeps_other_fields() {
        let metrics = PortalMetrics::new();
        metrics.update(|m| m.device_count = 4);
        metrics.update(|m| m.concentrator_count = 2);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.device_count, 4);
        assert_eq!(snapshot.concentrator_count, 2);
    }

    #[test]
    fn test_board_rejects_overlapping_runs() {
        let board = JobBoard::new();
        let guard = board.try_start(JobKind::SyncDevices).unwrap();
        assert!(board.try_start(JobKind::SyncDevices).is_none());
        // Other jobs are independent
        assert!(board.try_start(JobKind::SyncConcentrators).is_some());

        guard.failed("registry down".into());
        let status = board.status(JobKind::SyncDevices).unwrap();
        assert!(!status.running);
        assert_eq!(status.runs, 1);
        assert_eq!(status.last_error.as_deref(), Some("registry down"));
        assert!(board.try_start(JobKind::SyncDevices).is_some());
    }
}
