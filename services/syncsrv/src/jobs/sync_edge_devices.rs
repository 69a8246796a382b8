//! Mirror IoT Edge devices with their module and client counts
//!
//! Twins without a known model are skipped. A failure on one edge device
//! (module twin lookup, write error) is recorded and the loop moves on;
//! only the initial listing and the final commit can fail the run.

use super::reconcile::{delete_absent, upsert_item};
use super::{ItemOutcome, JobContext, JobKind, SyncReport};
use crate::repository::models::get_edge_device_model;
use crate::repository::{EdgeDeviceRepository, UnitOfWork};
use errors::PortalResult;
use portal_model::{DeviceTwin, EdgeDevice};
use portal_registry::{collect_all_pages, DeviceRegistry};
use std::collections::HashSet;
use tracing::info;

pub async fn run(ctx: &JobContext) -> PortalResult<SyncReport> {
    let mut report = SyncReport::start(JobKind::SyncEdgeDevices.name());

    let registry = ctx.registry.as_ref();
    let twins = collect_all_pages(ctx.page_size, move |token, size| async move {
        registry.list_edge_device_twins(token.as_deref(), size).await
    })
    .await?;
    report.remote_total = twins.len();

    let mut uow = UnitOfWork::begin(&ctx.pool).await?;
    let mut observed = HashSet::with_capacity(twins.len());

    for twin in &twins {
        observed.insert(twin.device_id.clone());

        let Some(model_id) = twin.model_id() else {
            report.skip(&twin.device_id, "no modelId tag");
            continue;
        };
        match get_edge_device_model(uow.conn(), &model_id).await {
            Ok(Some(_)) => {},
            Ok(None) => {
                report.skip(&twin.device_id, format!("unknown edge device model {}", model_id));
                continue;
            },
            Err(e) => {
                report.fail(&twin.device_id, format!("edge device model {}: {}", model_id, e));
                continue;
            },
        }

        match sync_edge_device(registry, &mut uow, twin, &model_id).await {
            Ok(outcome) => report.record(outcome),
            Err(e) => report.fail(&twin.device_id, e.to_string()),
        }
    }

    report.deleted += delete_absent(&EdgeDeviceRepository, uow.conn(), &observed).await?;
    uow.save().await?;

    info!(
        "Edge devices synced: {} remote, {} inserted, {} updated, {} deleted, {} skipped, {} failed",
        report.remote_total,
        report.inserted,
        report.updated,
        report.deleted,
        report.skipped(),
        report.failed()
    );
    Ok(report)
}

async fn sync_edge_device(
    registry: &dyn DeviceRegistry,
    uow: &mut UnitOfWork,
    twin: &DeviceTwin,
    model_id: &str,
) -> PortalResult<ItemOutcome> {
    let agent = registry.get_twin_with_modules(&twin.device_id).await?;
    let hub = registry.get_twin_with_edge_hub(&twin.device_id).await?;
    let edge = EdgeDevice::from_twins(twin, &agent, &hub, model_id);

    upsert_item(uow, &EdgeDeviceRepository, &edge).await
}
