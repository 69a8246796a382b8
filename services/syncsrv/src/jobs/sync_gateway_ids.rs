//! Refresh the shared list of LoRaWAN gateway IDs

use super::{JobContext, JobKind, SyncReport};
use errors::PortalResult;
use tracing::{error, info};

/// Replace the list on success; on error the previous list stays in place
/// and the run still completes.
pub async fn run(ctx: &JobContext) -> PortalResult<SyncReport> {
    let mut report = SyncReport::start(JobKind::SyncGatewayIds.name());

    match ctx.registry.list_gateway_ids().await {
        Ok(ids) => {
            report.remote_total = ids.len();
            report.loaded = ids.len();
            info!("Gateway IDs refreshed: {}", ids.len());
            ctx.gateway_ids.replace(ids);
        },
        Err(e) => {
            error!("Gateway ID refresh failed, keeping {} known IDs: {}", ctx.gateway_ids.snapshot().len(), e);
            report.fail("gateway-ids", e.to_string());
        },
    }

    Ok(report)
}
