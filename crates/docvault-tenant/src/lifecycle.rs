//! Soft-Delete Lifecycle
//!
//! Active (tombstone NULL) → Deleted (tombstone set) → Active (restored).
//! Transitions are state-guarded conditional updates, so repeating one is a
//! no-op and a concurrent duplicate never overwrites the first tombstone.

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::UnitOfWork;
use crate::error::{DataError, DataResult};
use crate::isolation;
use crate::model::{Entity, SoftDelete};

/// Outcome of a lifecycle transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition<E> {
    pub entity: E,
    /// `false` when the record was already in the target state
    pub changed: bool,
}

/// Load a record of the caller's tenant, including soft-deleted ones
pub async fn fetch<E: Entity>(uow: &mut UnitOfWork, id: Uuid) -> DataResult<E> {
    let sql = format!(
        "SELECT * FROM {} WHERE {} AND id = $2",
        E::TABLE,
        isolation::scoped::<E>()
    );
    let tenant_id = uow.tenant_id();
    uow.fetch_optional(sqlx::query_as::<_, E>(&sql).bind(tenant_id).bind(id))
        .await?
        .ok_or_else(|| DataError::not_found(E::KIND, id))
}

/// Load a live record of the caller's tenant
pub async fn fetch_live<E: SoftDelete>(uow: &mut UnitOfWork, id: Uuid) -> DataResult<E> {
    let sql = format!(
        "SELECT * FROM {} WHERE {} AND id = $2",
        E::TABLE,
        isolation::scoped_live::<E>()
    );
    let tenant_id = uow.tenant_id();
    uow.fetch_optional(sqlx::query_as::<_, E>(&sql).bind(tenant_id).bind(id))
        .await?
        .ok_or_else(|| DataError::not_found(E::KIND, id))
}

/// Set the tombstone. Fails with `ReferentialRestriction` while live
/// dependents reference the record.
pub async fn soft_delete<E: SoftDelete>(uow: &mut UnitOfWork, id: Uuid) -> DataResult<Transition<E>> {
    let sql = format!(
        "UPDATE {table} SET {tomb} = NOW() WHERE {scope} AND id = $2 AND {tomb} IS NULL RETURNING *",
        table = E::TABLE,
        tomb = E::TOMBSTONE,
        scope = isolation::scoped::<E>(),
    );
    let tenant_id = uow.tenant_id();
    let updated = uow
        .fetch_optional(sqlx::query_as::<_, E>(&sql).bind(tenant_id).bind(id))
        .await?;

    match updated {
        Some(entity) => {
            info!(kind = E::KIND, %id, "soft deleted");
            Ok(Transition {
                entity,
                changed: true,
            })
        }
        None => {
            debug!(kind = E::KIND, %id, "already deleted");
            Ok(Transition {
                entity: fetch(uow, id).await?,
                changed: false,
            })
        }
    }
}

/// Clear the tombstone. Fails with `Conflict` when an active record has
/// since claimed one of this record's unique keys, and with `Invalid` when
/// a parent it references is no longer live.
pub async fn restore<E: SoftDelete>(uow: &mut UnitOfWork, id: Uuid) -> DataResult<Transition<E>> {
    let sql = format!(
        "UPDATE {table} SET {tomb} = NULL WHERE {scope} AND id = $2 AND {tomb} IS NOT NULL RETURNING *",
        table = E::TABLE,
        tomb = E::TOMBSTONE,
        scope = isolation::scoped::<E>(),
    );
    let tenant_id = uow.tenant_id();
    let updated = uow
        .fetch_optional(sqlx::query_as::<_, E>(&sql).bind(tenant_id).bind(id))
        .await?;

    match updated {
        Some(entity) => {
            info!(kind = E::KIND, %id, "restored");
            Ok(Transition {
                entity,
                changed: true,
            })
        }
        None => {
            debug!(kind = E::KIND, %id, "already active");
            Ok(Transition {
                entity: fetch(uow, id).await?,
                changed: false,
            })
        }
    }
}
