//! Dispatch planning commands to the devices of each layer
//!
//! A device follows the planning of its layer, or of the nearest ancestor
//! layer that has one. Devices without an active planning or an open
//! schedule window are left alone. Dispatch failures are recorded per
//! device and never stop the loop.

use super::{JobContext, JobKind, SyncReport};
use crate::repository::models::list_commands;
use crate::repository::planning::{list_layered_devices, list_layers, list_plannings, list_schedules};
use errors::{PortalError, PortalResult};
use portal_model::{due_commands, effective_planning, DeviceModelCommand};
use std::collections::HashMap;
use tracing::{debug, info};

pub async fn run(ctx: &JobContext) -> PortalResult<SyncReport> {
    let dispatcher = ctx
        .dispatcher
        .as_ref()
        .ok_or_else(|| PortalError::Configuration("No command dispatcher, LoRaWAN is disabled".to_string()))?;

    let mut report = SyncReport::start(JobKind::SendPlanningCommand.name());
    let now = ctx.clock.now();

    let mut conn = ctx.pool.acquire().await?;
    let layers = list_layers(&mut conn).await?;
    let plannings = list_plannings(&mut conn).await?;
    let schedules = list_schedules(&mut conn).await?;
    let commands: HashMap<String, DeviceModelCommand> = list_commands(&mut conn)
        .await?
        .into_iter()
        .map(|c| (c.id.clone(), c))
        .collect();
    let devices = list_layered_devices(&mut conn).await?;
    drop(conn);

    report.remote_total = devices.len();
    debug!("Evaluating plannings at {} for {} devices", now, devices.len());

    for device in &devices {
        let Some(planning_id) = effective_planning(&layers, &device.layer_id) else {
            debug!("{}: layer {} has no planning", device.id, device.layer_id);
            continue;
        };
        let Some(planning) = plannings.get(planning_id) else {
            report.skip(&device.id, format!("unknown planning {}", planning_id));
            continue;
        };
        let planning_schedules = schedules.get(planning_id).map(Vec::as_slice).unwrap_or(&[]);

        for command_id in due_commands(planning, planning_schedules, now) {
            let Some(command) = commands.get(&command_id) else {
                report.fail(&device.id, format!("unknown command {}", command_id));
                continue;
            };
            if command.device_model_id != device.device_model_id {
                report.skip(
                    &device.id,
                    format!("command {} belongs to model {}", command.id, command.device_model_id),
                );
                continue;
            }

            match dispatcher.send_command(&device.id, command).await {
                Ok(()) => {
                    report.dispatched += 1;
                    debug!("{}: sent {} ({})", device.id, command.name, planning.name);
                },
                Err(e) => report.fail(&device.id, format!("command {}: {}", command.id, e)),
            }
        }
    }

    info!(
        "Planning commands: {} dispatched, {} failed over {} devices",
        report.dispatched,
        report.failed(),
        report.remote_total
    );
    Ok(report)
}
