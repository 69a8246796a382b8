//! Portal Sync Service (`syncsrv`)
//!
//! Runs the registry reconciliation jobs on their cron schedules and serves
//! the admin API.

use clap::{Parser, Subcommand};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

use common::shutdown::shutdown_token;
use errors::{PortalError, PortalResult};
use portal_registry::DeviceCountQuery;
use syncsrv::bootstrap;
use syncsrv::{JobKind, JobScheduler};

/// Command-line arguments for syncsrv
#[derive(Parser, Clone)]
#[command(
    name = "syncsrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Portal Sync Service",
    long_about = None
)]
struct Args {
    /// Configuration file (default: $PORTAL_CONFIG or config/syncsrv.yaml)
    #[arg(short = 'c', long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone)]
enum Command {
    /// Start the scheduler and the API server (default)
    Run,
    /// Validate configuration, database and registry access, then exit
    Check,
    /// Run a single job and print its report as JSON
    Once {
        /// Job name, e.g. sync-devices
        job: String,
    },
}

#[tokio::main]
async fn main() -> PortalResult<()> {
    let args = Args::parse();
    let service_info = bootstrap::create_service_info();

    let config = bootstrap::load_configuration(&service_info, args.config.as_deref())?;
    bootstrap::init_environment(&service_info, &config)?;
    bootstrap::validate_configuration(&config)?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Check => check(config).await,
        Command::Once { job } => once(config, &job).await,
    }
}

async fn run(config: syncsrv::PortalConfig) -> PortalResult<()> {
    let jobs = config.enabled_jobs()?;
    let api_enabled = config.api.enabled;
    let state = bootstrap::build_app_state(config).await?;

    let token = shutdown_token();
    let scheduler = JobScheduler::new(Arc::clone(&state.runner), jobs);
    let mut handles = scheduler.start(token.clone());

    if api_enabled {
        handles.push(bootstrap::start_api_server(Arc::clone(&state), token.clone()).await?);
    } else {
        info!("API disabled");
    }

    token.cancelled().await;
    info!("Shutting down, waiting for running jobs");

    for result in futures::future::join_all(handles).await {
        if let Err(e) = result {
            error!("Task ended abnormally: {}", e);
        }
    }

    info!("SyncSrv stopped");
    Ok(())
}

async fn check(config: syncsrv::PortalConfig) -> PortalResult<()> {
    let jobs = config.enabled_jobs()?;
    let sqlite_client = bootstrap::setup_database(&config).await?;
    sqlite_client
        .ping()
        .await
        .map_err(|e| PortalError::Database(e.to_string()))?;

    let registry = bootstrap::build_registry(&config)?;
    let devices = registry.count_devices(DeviceCountQuery::default()).await?;
    let edge = registry
        .count_devices(DeviceCountQuery {
            edge: true,
            connected_only: false,
        })
        .await?;
    bootstrap::build_dispatcher(&config)?;

    info!(
        "Check passed: {} jobs scheduled, registry has {} devices and {} edge devices",
        jobs.len(),
        devices,
        edge
    );
    Ok(())
}

async fn once(config: syncsrv::PortalConfig, job: &str) -> PortalResult<()> {
    let kind = JobKind::from_str(job)?;
    let state = bootstrap::build_app_state(config).await?;
    let report = state.runner.execute(kind).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
