//! Reconciliation and maintenance jobs
//!
//! Every job is a plain async function over a [`JobContext`]. A run returns
//! a [`SyncReport`]; per-item problems are recorded in the report while a
//! total failure (registry unreachable, database error) is returned as an
//! error and leaves the local store untouched.

pub mod metrics_exporter;
pub mod metrics_loader;
pub mod reconcile;
pub mod report;
pub mod send_planning_command;
pub mod sync_concentrators;
pub mod sync_devices;
pub mod sync_edge_devices;
pub mod sync_gateway_ids;

use crate::clock::Clock;
use crate::metrics::PortalGauges;
use crate::state::{GatewayIdList, PortalMetrics};
use errors::{PortalError, PortalResult};
use portal_registry::{CommandDispatcher, DeviceRegistry};
use serde::Serialize;
use sqlx::SqlitePool;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use report::{FailureKind, ItemFailure, ItemOutcome, SyncReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    SyncDevices,
    SyncEdgeDevices,
    SyncConcentrators,
    SyncGatewayIds,
    DeviceMetricLoader,
    EdgeDeviceMetricLoader,
    ConcentratorMetricLoader,
    DeviceMetricExporter,
    EdgeDeviceMetricExporter,
    ConcentratorMetricExporter,
    SendPlanningCommand,
}

impl JobKind {
    pub const ALL: &'static [JobKind] = &[
        JobKind::SyncDevices,
        JobKind::SyncEdgeDevices,
        JobKind::SyncConcentrators,
        JobKind::SyncGatewayIds,
        JobKind::DeviceMetricLoader,
        JobKind::EdgeDeviceMetricLoader,
        JobKind::ConcentratorMetricLoader,
        JobKind::DeviceMetricExporter,
        JobKind::EdgeDeviceMetricExporter,
        JobKind::ConcentratorMetricExporter,
        JobKind::SendPlanningCommand,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            JobKind::SyncDevices => "sync-devices",
            JobKind::SyncEdgeDevices => "sync-edge-devices",
            JobKind::SyncConcentrators => "sync-concentrators",
            JobKind::SyncGatewayIds => "sync-gateway-ids",
            JobKind::DeviceMetricLoader => "device-metric-loader",
            JobKind::EdgeDeviceMetricLoader => "edge-device-metric-loader",
            JobKind::ConcentratorMetricLoader => "concentrator-metric-loader",
            JobKind::DeviceMetricExporter => "device-metric-exporter",
            JobKind::EdgeDeviceMetricExporter => "edge-device-metric-exporter",
            JobKind::ConcentratorMetricExporter => "concentrator-metric-exporter",
            JobKind::SendPlanningCommand => "send-planning-command",
        }
    }

    /// Cron expression (with seconds) used when the config names none
    pub fn default_cron(&self) -> &'static str {
        match self {
            JobKind::SyncDevices | JobKind::SyncEdgeDevices | JobKind::SyncConcentrators => "0 */5 * * * *",
            JobKind::SyncGatewayIds => "0 */10 * * * *",
            JobKind::DeviceMetricLoader
            | JobKind::EdgeDeviceMetricLoader
            | JobKind::ConcentratorMetricLoader => "30 */5 * * * *",
            JobKind::DeviceMetricExporter
            | JobKind::EdgeDeviceMetricExporter
            | JobKind::ConcentratorMetricExporter => "0 * * * * *",
            JobKind::SendPlanningCommand => "0 */10 * * * *",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for JobKind {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobKind::ALL
            .iter()
            .find(|kind| kind.name() == s)
            .copied()
            .ok_or_else(|| PortalError::not_found(format!("job {}", s)))
    }
}

/// Everything a job run needs
#[derive(Clone)]
pub struct JobContext {
    pub pool: SqlitePool,
    pub registry: Arc<dyn DeviceRegistry>,
    /// Absent when LoRaWAN is disabled
    pub dispatcher: Option<Arc<dyn CommandDispatcher>>,
    pub gateway_ids: Arc<GatewayIdList>,
    pub metrics: Arc<PortalMetrics>,
    pub gauges: Arc<PortalGauges>,
    pub clock: Arc<dyn Clock>,
    pub page_size: usize,
}

/// Run one job to completion
pub async fn run_job(kind: JobKind, ctx: &JobContext) -> PortalResult<SyncReport> {
    let report = match kind {
        JobKind::SyncDevices => sync_devices::run(ctx).await?,
        JobKind::SyncEdgeDevices => sync_edge_devices::run(ctx).await?,
        JobKind::SyncConcentrators => sync_concentrators::run(ctx).await?,
        JobKind::SyncGatewayIds => sync_gateway_ids::run(ctx).await?,
        JobKind::DeviceMetricLoader => metrics_loader::load_device_metrics(ctx).await?,
        JobKind::EdgeDeviceMetricLoader => metrics_loader::load_edge_device_metrics(ctx).await?,
        JobKind::ConcentratorMetricLoader => metrics_loader::load_concentrator_metrics(ctx).await?,
        JobKind::DeviceMetricExporter => metrics_exporter::export_device_metrics(ctx),
        JobKind::EdgeDeviceMetricExporter => metrics_exporter::export_edge_device_metrics(ctx),
        JobKind::ConcentratorMetricExporter => metrics_exporter::export_concentrator_metrics(ctx),
        JobKind::SendPlanningCommand => send_planning_command::run(ctx).await?,
    };
    Ok(report.finish())
}
