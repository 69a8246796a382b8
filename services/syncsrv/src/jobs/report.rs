//! Outcome of a single job run

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

/// What reconciliation did with one remote item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Inserted,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Item ignored on purpose (missing model, mismatched command)
    Skipped,
    /// Item hit an error, other items were still processed
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub id: String,
    pub kind: FailureKind,
    pub reason: String,
}

/// Counters and per-item failures of a job run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub job: &'static str,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Items listed by the registry
    pub remote_total: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    /// Commands sent by the planning job
    pub dispatched: usize,
    /// Values loaded by metric jobs
    pub loaded: usize,
    pub failures: Vec<ItemFailure>,
}

impl SyncReport {
    pub fn start(job: &'static str) -> Self {
        Self {
            job,
            started_at: Utc::now(),
            finished_at: None,
            remote_total: 0,
            inserted: 0,
            updated: 0,
            unchanged: 0,
            deleted: 0,
            dispatched: 0,
            loaded: 0,
            failures: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Inserted => self.inserted += 1,
            ItemOutcome::Updated => self.updated += 1,
            ItemOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn skip(&mut self, id: impl Into<String>, reason: impl Into<String>) {
        let failure = ItemFailure {
            id: id.into(),
            kind: FailureKind::Skipped,
            reason: reason.into(),
        };
        warn!("{}: skipped {}: {}", self.job, failure.id, failure.reason);
        self.failures.push(failure);
    }

    pub fn fail(&mut self, id: impl Into<String>, reason: impl Into<String>) {
        let failure = ItemFailure {
            id: id.into(),
            kind: FailureKind::Failed,
            reason: reason.into(),
        };
        warn!("{}: {} failed: {}", self.job, failure.id, failure.reason);
        self.failures.push(failure);
    }

    pub fn skipped(&self) -> usize {
        self.count(FailureKind::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(FailureKind::Failed)
    }

    fn count(&self, kind: FailureKind) -> usize {
        self.failures.iter().filter(|f| f.kind == kind).count()
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_counters() {
        let mut report = SyncReport::start("sync-devices");
        report.record(ItemOutcome::Inserted);
        report.record(ItemOutcome::Inserted);
        report.record(ItemOutcome::Unchanged);
        report.skip("dev-3", "no modelId tag");
        report.fail("dev-4", "timeout");
        report.fail("dev-5", "timeout");

        let report = report.finish();
        assert_eq!(report.inserted, 2);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failed(), 2);
        assert!(report.finished_at.is_some());
    }

    #[test]
    #[traced_test]
    fn test_failures_are_logged() {
        let mut report = SyncReport::start("sync-edge-devices");
        report.skip("edge-7", "no modelId tag");
        report.fail("edge-8", "module twin timeout");

        assert!(logs_contain("skipped edge-7: no modelId tag"));
        assert!(logs_contain("edge-8 failed: module twin timeout"));
    }
}
