//! Mirror registry device twins into the `devices` tables
//!
//! Concentrators and edge devices have their own jobs. The device model
//! decides whether a twin is stored as a standard or a LoRaWAN device.

use super::reconcile::{delete_absent, upsert_item};
use super::{JobContext, JobKind, SyncReport};
use crate::repository::models::get_device_model;
use crate::repository::{DeviceRepository, LorawanDeviceRepository, UnitOfWork};
use errors::PortalResult;
use portal_model::twin::CONCENTRATOR_DEVICE_TYPE;
use portal_model::{Device, DeviceKind, DeviceModel, DeviceTwin, LorawanDevice};
use portal_registry::{collect_all_pages, TwinFilter};
use std::collections::{HashMap, HashSet};
use tracing::info;

pub async fn run(ctx: &JobContext) -> PortalResult<SyncReport> {
    let mut report = SyncReport::start(JobKind::SyncDevices.name());

    let registry = ctx.registry.as_ref();
    let filter = TwinFilter::ExcludeDeviceType(CONCENTRATOR_DEVICE_TYPE.to_string());
    let filter = &filter;
    let twins = collect_all_pages(ctx.page_size, move |token, size| async move {
        registry.list_device_twins(filter, token.as_deref(), size).await
    })
    .await?;
    report.remote_total = twins.len();

    let mut uow = UnitOfWork::begin(&ctx.pool).await?;
    let mut observed = HashSet::with_capacity(twins.len());
    let mut models: HashMap<String, Option<DeviceModel>> = HashMap::new();

    for twin in &twins {
        observed.insert(twin.device_id.clone());

        let Some(model_id) = twin.model_id() else {
            report.skip(&twin.device_id, "no modelId tag");
            continue;
        };

        let model = match models.get(&model_id) {
            Some(model) => model.clone(),
            None => match get_device_model(uow.conn(), &model_id).await {
                Ok(model) => {
                    models.insert(model_id.clone(), model.clone());
                    model
                },
                Err(e) => {
                    report.fail(&twin.device_id, format!("device model {}: {}", model_id, e));
                    continue;
                },
            },
        };
        let Some(model) = model else {
            report.skip(&twin.device_id, format!("unknown device model {}", model_id));
            continue;
        };

        match sync_twin(&mut uow, twin, &model).await {
            Ok(outcome) => report.record(outcome),
            Err(e) => report.fail(&twin.device_id, e.to_string()),
        }
    }

    report.deleted += delete_absent(&LorawanDeviceRepository, uow.conn(), &observed).await?;
    report.deleted += delete_absent(&DeviceRepository, uow.conn(), &observed).await?;
    uow.save().await?;

    info!(
        "Devices synced: {} remote, {} inserted, {} updated, {} deleted, {} skipped, {} failed",
        report.remote_total,
        report.inserted,
        report.updated,
        report.deleted,
        report.skipped(),
        report.failed()
    );
    Ok(report)
}

async fn sync_twin(
    uow: &mut UnitOfWork,
    twin: &DeviceTwin,
    model: &DeviceModel,
) -> PortalResult<super::ItemOutcome> {
    match model.kind() {
        DeviceKind::Standard => upsert_item(uow, &DeviceRepository, &Device::from_twin(twin, &model.id)).await,
        DeviceKind::Lorawan => {
            upsert_item(uow, &LorawanDeviceRepository, &LorawanDevice::from_twin(twin, &model.id)).await
        },
    }
}
