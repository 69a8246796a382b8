//! Copy the loaded portal counts into the Prometheus gauges
//!
//! Each exporter only touches the gauges of its own entity.

use super::{JobContext, JobKind, SyncReport};
use tracing::debug;

pub fn export_device_metrics(ctx: &JobContext) -> SyncReport {
    let mut report = SyncReport::start(JobKind::DeviceMetricExporter.name());
    let snapshot = ctx.metrics.snapshot();
    ctx.gauges.publish_devices(&snapshot);
    report.loaded = 2;
    debug!("Exported device gauges: {} / {}", snapshot.connected_device_count, snapshot.device_count);
    report
}

pub fn export_edge_device_metrics(ctx: &JobContext) -> SyncReport {
    let mut report = SyncReport::start(JobKind::EdgeDeviceMetricExporter.name());
    let snapshot = ctx.metrics.snapshot();
    ctx.gauges.publish_edge_devices(&snapshot);
    report.loaded = 3;
    debug!(
        "Exported edge gauges: {} / {}, {} failed deployments",
        snapshot.connected_edge_device_count, snapshot.edge_device_count, snapshot.failed_deployment_count
    );
    report
}

pub fn export_concentrator_metrics(ctx: &JobContext) -> SyncReport {
    let mut report = SyncReport::start(JobKind::ConcentratorMetricExporter.name());
    let snapshot = ctx.metrics.snapshot();
    ctx.gauges.publish_concentrators(&snapshot);
    report.loaded = 2;
    debug!(
        "Exported concentrator gauges: {} / {}",
        snapshot.connected_concentrator_count, snapshot.concentrator_count
    );
    report
}
