//! Mirror LoRa concentrator twins

use super::reconcile::{delete_absent, upsert_item};
use super::{JobContext, JobKind, SyncReport};
use crate::repository::{ConcentratorRepository, UnitOfWork};
use errors::PortalResult;
use portal_model::twin::CONCENTRATOR_DEVICE_TYPE;
use portal_model::Concentrator;
use portal_registry::{collect_all_pages, TwinFilter};
use std::collections::HashSet;
use tracing::info;

pub async fn run(ctx: &JobContext) -> PortalResult<SyncReport> {
    let mut report = SyncReport::start(JobKind::SyncConcentrators.name());

    let registry = ctx.registry.as_ref();
    let filter = TwinFilter::DeviceType(CONCENTRATOR_DEVICE_TYPE.to_string());
    let filter = &filter;
    let twins = collect_all_pages(ctx.page_size, move |token, size| async move {
        registry.list_device_twins(filter, token.as_deref(), size).await
    })
    .await?;
    report.remote_total = twins.len();

    let mut uow = UnitOfWork::begin(&ctx.pool).await?;
    let mut observed = HashSet::with_capacity(twins.len());

    for twin in &twins {
        observed.insert(twin.device_id.clone());
        let concentrator = Concentrator::from_twin(twin);
        match upsert_item(&mut uow, &ConcentratorRepository, &concentrator).await {
            Ok(outcome) => report.record(outcome),
            Err(e) => report.fail(&twin.device_id, e.to_string()),
        }
    }

    report.deleted += delete_absent(&ConcentratorRepository, uow.conn(), &observed).await?;
    uow.save().await?;

    info!(
        "Concentrators synced: {} remote, {} inserted, {} updated, {} deleted",
        report.remote_total, report.inserted, report.updated, report.deleted
    );
    Ok(report)
}
