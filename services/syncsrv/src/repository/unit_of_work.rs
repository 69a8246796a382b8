//! One transaction per job run

use errors::PortalResult;
use sqlx::{Connection, Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::debug;

/// Collects every write of a job run and commits them once
///
/// Dropping a unit of work without [`UnitOfWork::save`] rolls everything back.
pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

impl UnitOfWork {
    pub async fn begin(pool: &SqlitePool) -> PortalResult<Self> {
        Ok(Self {
            tx: pool.begin().await?,
        })
    }

    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// Savepoint for a single item; rolling it back keeps the rest of the run
    pub async fn item(&mut self) -> PortalResult<Transaction<'_, Sqlite>> {
        Ok(Connection::begin(&mut *self.tx).await?)
    }

    pub async fn save(self) -> PortalResult<()> {
        self.tx.commit().await?;
        debug!("Unit of work committed");
        Ok(())
    }
}
