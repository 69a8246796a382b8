//! SQLite repositories for the mirrored registry
//!
//! Synced tables implement [`VersionedRepository`] so reconciliation is
//! written once. Repositories take a `&mut SqliteConnection`, which can be
//! the job's transaction or a per-item savepoint.

pub mod concentrators;
pub mod devices;
pub mod edge_devices;
pub mod models;
pub mod planning;
mod tags;
pub mod unit_of_work;

use async_trait::async_trait;
use errors::PortalResult;
use portal_model::Versioned;
use sqlx::SqliteConnection;

pub use concentrators::ConcentratorRepository;
pub use devices::{DeviceRepository, LorawanDeviceRepository};
pub use edge_devices::EdgeDeviceRepository;
pub use unit_of_work::UnitOfWork;

/// Rows counted by the metric loaders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountFilter {
    All,
    Connected,
}

/// Table mirrored from registry twins, keyed by device ID
#[async_trait]
pub trait VersionedRepository: Send + Sync {
    type Entity: Versioned + Send + Sync;

    /// Name used in logs and reports
    fn name(&self) -> &'static str;

    async fn get_by_id(&self, conn: &mut SqliteConnection, id: &str) -> PortalResult<Option<Self::Entity>>;

    /// Insert the entity and the rows it owns
    async fn insert(&self, conn: &mut SqliteConnection, entity: &Self::Entity) -> PortalResult<()>;

    /// Overwrite scalar fields and insert the owned rows of `entity`
    async fn update(&self, conn: &mut SqliteConnection, entity: &Self::Entity) -> PortalResult<()>;

    async fn delete(&self, conn: &mut SqliteConnection, id: &str) -> PortalResult<bool>;

    async fn list_ids(&self, conn: &mut SqliteConnection) -> PortalResult<Vec<String>>;

    async fn count(&self, conn: &mut SqliteConnection, filter: CountFilter) -> PortalResult<i64>;

    /// Remove the rows owned by an entity (tags), returns how many went away
    async fn delete_owned(&self, _conn: &mut SqliteConnection, _id: &str) -> PortalResult<u64> {
        Ok(0)
    }
}
