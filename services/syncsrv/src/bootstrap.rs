//! Service Bootstrap and Initialization
//!
//! Configuration, logging, database and backend setup for the sync service.

use crate::api::create_routes;
use crate::app_state::AppState;
use crate::clock::SystemClock;
use crate::config::{PortalConfig, DEFAULT_PORT};
use crate::jobs::JobContext;
use crate::metrics::PortalGauges;
use crate::schema::init_schema;
use crate::state::{GatewayIdList, PortalMetrics};
use common::service_bootstrap::{get_config_path, get_service_port, ServiceInfo};
use common::sqlite::SqliteClient;
use common::CancellationToken;
use errors::{PortalError, PortalResult};
use portal_registry::{CommandDispatcher, DeviceRegistry, HttpRegistry, LorawanCommandClient};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub fn create_service_info() -> ServiceInfo {
    ServiceInfo::new(
        "syncsrv",
        "Portal Sync Service - Registry Reconciliation & Planning Commands",
        DEFAULT_PORT,
    )
}

/// Load configuration: explicit path > `PORTAL_CONFIG` > `config/syncsrv.yaml`
pub fn load_configuration(service_info: &ServiceInfo, explicit: Option<&str>) -> PortalResult<PortalConfig> {
    common::service_bootstrap::load_development_env();

    let path = get_config_path(service_info, explicit);
    let mut config = PortalConfig::load(Some(Path::new(&path)))?;
    config.api.port = get_service_port(config.api.port, service_info);
    Ok(config)
}

/// Initialize logging and print the banner
pub fn init_environment(service_info: &ServiceInfo, config: &PortalConfig) -> PortalResult<()> {
    common::service_bootstrap::init_logging(service_info, Some(&config.logging))
        .map_err(|e| PortalError::Configuration(format!("Failed to initialize logging: {}", e)))?;
    common::service_bootstrap::print_startup_banner(service_info);
    info!("SyncSrv starting");
    Ok(())
}

/// Fail on configuration errors, log warnings
pub fn validate_configuration(config: &PortalConfig) -> PortalResult<()> {
    debug!("Validating config");
    let validation = config.validate();
    for warning in &validation.warnings {
        warn!("Config: {}", warning);
    }
    if !validation.is_valid {
        for e in &validation.errors {
            error!("Config: {}", e);
        }
        return Err(PortalError::Configuration(validation.errors.join("; ")));
    }
    debug!("Config valid");
    Ok(())
}

/// Open the database and create missing tables
pub async fn setup_database(config: &PortalConfig) -> PortalResult<SqliteClient> {
    info!("SQLite: {}", config.database.path);
    let client = SqliteClient::new(&config.database)
        .await
        .map_err(|e| PortalError::Database(format!("Failed to open {}: {}", config.database.path, e)))?;
    init_schema(client.pool()).await?;
    Ok(client)
}

pub fn build_registry(config: &PortalConfig) -> PortalResult<Arc<dyn DeviceRegistry>> {
    let registry = HttpRegistry::new(config.registry.clone())?;
    info!("Registry: {}", config.registry.host_name);
    Ok(Arc::new(registry))
}

/// `None` when LoRaWAN is disabled
pub fn build_dispatcher(config: &PortalConfig) -> PortalResult<Option<Arc<dyn CommandDispatcher>>> {
    if !config.lorawan.enabled {
        info!("LoRaWAN disabled, planning commands off");
        return Ok(None);
    }
    let client = LorawanCommandClient::new(&config.lorawan)?;
    info!("LoRaWAN API: {}", config.lorawan.api_url);
    Ok(Some(Arc::new(client)))
}

pub fn build_context(
    config: &PortalConfig,
    sqlite_client: &SqliteClient,
    registry: Arc<dyn DeviceRegistry>,
    dispatcher: Option<Arc<dyn CommandDispatcher>>,
) -> PortalResult<JobContext> {
    Ok(JobContext {
        pool: sqlite_client.pool().clone(),
        registry,
        dispatcher,
        gateway_ids: Arc::new(GatewayIdList::new()),
        metrics: Arc::new(PortalMetrics::new()),
        gauges: Arc::new(PortalGauges::new()?),
        clock: Arc::new(SystemClock),
        page_size: config.registry.page_size,
    })
}

/// Build everything the service needs from a validated configuration
pub async fn build_app_state(config: PortalConfig) -> PortalResult<Arc<AppState>> {
    let sqlite_client = setup_database(&config).await?;
    let registry = build_registry(&config)?;
    let dispatcher = build_dispatcher(&config)?;
    let ctx = build_context(&config, &sqlite_client, registry, dispatcher)?;
    Ok(Arc::new(AppState::new(Arc::new(config), sqlite_client, ctx)))
}

/// Bind the admin API and serve it until `token` is cancelled
pub async fn start_api_server(state: Arc<AppState>, token: CancellationToken) -> PortalResult<JoinHandle<()>> {
    let addr: SocketAddr = format!("{}:{}", state.config.api.host, state.config.api.port)
        .parse()
        .map_err(|e| PortalError::InvalidConfig {
            field: "api.host".to_string(),
            reason: format!("{}", e),
        })?;

    let socket = if addr.is_ipv4() {
        tokio::net::TcpSocket::new_v4()?
    } else {
        tokio::net::TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    let listener = socket.listen(1024)?;

    info!("API server listening on http://{}", addr);

    let app = create_routes(state);
    let server = axum::serve(listener, app);
    Ok(tokio::spawn(async move {
        let shutdown = async move { token.cancelled().await };
        if let Err(e) = server.with_graceful_shutdown(shutdown).await {
            error!("Server error: {}", e);
        }
    }))
}
