//! Load portal counts into the shared [`PortalMetrics`](crate::state::PortalMetrics)
//!
//! Each count is loaded on its own. A failing count keeps its previous value
//! and is recorded in the report, the others are still refreshed.

use super::{JobContext, JobKind, SyncReport};
use crate::repository::{
    ConcentratorRepository, CountFilter, DeviceRepository, EdgeDeviceRepository, VersionedRepository,
};
use crate::state::PortalMetricsSnapshot;
use errors::PortalResult;
use sqlx::SqlitePool;
use tracing::{debug, error};

type Field = fn(&mut PortalMetricsSnapshot) -> &mut i64;

async fn local_count<R: VersionedRepository>(
    pool: &SqlitePool,
    repo: &R,
    filter: CountFilter,
) -> PortalResult<i64> {
    let mut conn = pool.acquire().await?;
    repo.count(&mut conn, filter).await
}

/// Store `value` in `field`, or record why it could not be loaded
fn apply(ctx: &JobContext, report: &mut SyncReport, name: &str, field: Field, value: PortalResult<i64>) {
    match value {
        Ok(count) => {
            ctx.metrics.update(|m| *field(m) = count);
            report.loaded += 1;
            debug!("{} = {}", name, count);
        },
        Err(e) => {
            error!("Failed to load {}: {}", name, e);
            report.fail(name, e.to_string());
        },
    }
}

pub async fn load_device_metrics(ctx: &JobContext) -> PortalResult<SyncReport> {
    let mut report = SyncReport::start(JobKind::DeviceMetricLoader.name());

    let total = local_count(&ctx.pool, &DeviceRepository, CountFilter::All).await;
    apply(ctx, &mut report, "device_count", |m| &mut m.device_count, total);

    let connected = local_count(&ctx.pool, &DeviceRepository, CountFilter::Connected).await;
    apply(ctx, &mut report, "connected_device_count", |m| &mut m.connected_device_count, connected);

    Ok(report)
}

pub async fn load_edge_device_metrics(ctx: &JobContext) -> PortalResult<SyncReport> {
    let mut report = SyncReport::start(JobKind::EdgeDeviceMetricLoader.name());

    let total = local_count(&ctx.pool, &EdgeDeviceRepository, CountFilter::All).await;
    apply(ctx, &mut report, "edge_device_count", |m| &mut m.edge_device_count, total);

    let connected = local_count(&ctx.pool, &EdgeDeviceRepository, CountFilter::Connected).await;
    apply(
        ctx,
        &mut report,
        "connected_edge_device_count",
        |m| &mut m.connected_edge_device_count,
        connected,
    );

    let failed = ctx.registry.failed_deployments_count().await;
    apply(ctx, &mut report, "failed_deployment_count", |m| &mut m.failed_deployment_count, failed);

    Ok(report)
}

pub async fn load_concentrator_metrics(ctx: &JobContext) -> PortalResult<SyncReport> {
    let mut report = SyncReport::start(JobKind::ConcentratorMetricLoader.name());

    let total = local_count(&ctx.pool, &ConcentratorRepository, CountFilter::All).await;
    apply(ctx, &mut report, "concentrator_count", |m| &mut m.concentrator_count, total);

    let connected = local_count(&ctx.pool, &ConcentratorRepository, CountFilter::Connected).await;
    apply(
        ctx,
        &mut report,
        "connected_concentrator_count",
        |m| &mut m.connected_concentrator_count,
        connected,
    );

    Ok(report)
}
