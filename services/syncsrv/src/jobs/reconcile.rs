//! Version-driven upsert and delete-by-absence

use super::report::ItemOutcome;
use crate::repository::{UnitOfWork, VersionedRepository};
use errors::PortalResult;
use portal_model::Versioned;
use sqlx::SqliteConnection;
use std::collections::HashSet;
use tracing::debug;

/// Insert the entity, or replace the stored one when the remote version is newer
///
/// Versions equal to or older than the stored one leave the row untouched.
pub async fn upsert_versioned<R>(
    repo: &R,
    conn: &mut SqliteConnection,
    entity: &R::Entity,
) -> PortalResult<ItemOutcome>
where
    R: VersionedRepository,
{
    let Some(stored) = repo.get_by_id(conn, entity.id()).await? else {
        repo.insert(conn, entity).await?;
        debug!("{}: inserted {} v{}", repo.name(), entity.id(), entity.version());
        return Ok(ItemOutcome::Inserted);
    };

    if entity.version() <= stored.version() {
        return Ok(ItemOutcome::Unchanged);
    }

    repo.delete_owned(conn, entity.id()).await?;
    repo.update(conn, entity).await?;
    debug!(
        "{}: updated {} v{} -> v{}",
        repo.name(),
        entity.id(),
        stored.version(),
        entity.version()
    );
    Ok(ItemOutcome::Updated)
}

/// [`upsert_versioned`] inside its own savepoint
///
/// A failing item is rolled back alone; the run's transaction stays usable.
pub async fn upsert_item<R>(
    uow: &mut UnitOfWork,
    repo: &R,
    entity: &R::Entity,
) -> PortalResult<ItemOutcome>
where
    R: VersionedRepository,
{
    let mut item = uow.item().await?;
    match upsert_versioned(repo, &mut item, entity).await {
        Ok(outcome) => {
            item.commit().await?;
            Ok(outcome)
        },
        Err(e) => {
            item.rollback().await?;
            Err(e)
        },
    }
}

/// Delete local rows whose ID the registry no longer lists
///
/// `observed` must hold every ID of a complete listing.
pub async fn delete_absent<R>(
    repo: &R,
    conn: &mut SqliteConnection,
    observed: &HashSet<String>,
) -> PortalResult<usize>
where
    R: VersionedRepository,
{
    let mut deleted = 0;
    for id in repo.list_ids(conn).await? {
        if observed.contains(&id) {
            continue;
        }
        if repo.delete(conn, &id).await? {
            debug!("{}: deleted {}", repo.name(), id);
            deleted += 1;
        }
    }
    Ok(deleted)
}
