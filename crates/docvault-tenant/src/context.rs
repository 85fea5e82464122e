//! Tenant-context propagation
//!
//! The tenant performing an operation is bound to the transaction serving
//! it, as the setting [`CURRENT_TENANT_SETTING`], for exactly one unit of
//! work. Row-security policies read that setting; nothing else carries
//! tenant state.
//!
//! [`UnitOfWork`] owns one database transaction. The binding is made with
//! `set_config(.., true)`, which is transaction local: it ends on commit,
//! on rollback, and on drop, which rolls back. A cancelled or timed-out
//! request therefore cannot hand a bound connection back to the pool, and
//! its writes are discarded together with their audit entries.

use docvault_store::{CURRENT_TENANT_SETTING as SETTING, EF_SEARCH_SETTING};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgArguments, PgConnection, PgQueryResult, PgRow};
use sqlx::query::{Query, QueryAs};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{debug, info_span, warn, Instrument, Span};

use crate::error::{DataError, DataResult};
use crate::model::{TenantId, UserId, SYSTEM_TENANT_ID};

/// Setting read by the isolation policies
pub const CURRENT_TENANT_SETTING: &str = SETTING;

/// Accepted `hnsw.ef_search` range
pub const EF_SEARCH_RANGE: std::ops::RangeInclusive<u32> = 1..=1000;

/// Verified identity of the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: TenantId,
    /// `None` for system actions
    pub user_id: Option<UserId>,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            user_id: None,
        }
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Context of the seeded system tenant
    pub fn system() -> Self {
        Self::new(SYSTEM_TENANT_ID)
    }
}

/// Bind `tenant_id` for the rest of the current transaction
pub async fn bind(conn: &mut PgConnection, tenant_id: TenantId) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT set_config($1, $2, true)")
        .bind(CURRENT_TENANT_SETTING)
        .bind(tenant_id.to_string())
        .execute(conn)
        .await?;
    Ok(())
}

/// Remove the tenant binding for the rest of the current transaction
pub async fn clear(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT set_config($1, '', true)")
        .bind(CURRENT_TENANT_SETTING)
        .execute(conn)
        .await?;
    Ok(())
}

/// Tenant currently bound to the connection, if any
pub async fn bound_tenant(conn: &mut PgConnection) -> Result<Option<TenantId>, sqlx::Error> {
    let setting: Option<String> = sqlx::query_scalar("SELECT NULLIF(current_setting($1, true), '')")
        .bind(CURRENT_TENANT_SETTING)
        .fetch_one(conn)
        .await?;
    Ok(setting.and_then(|s| s.parse().ok()))
}

/// One tenant-scoped transaction
pub struct UnitOfWork {
    tx: Transaction<'static, Postgres>,
    context: TenantContext,
    span: Span,
}

impl UnitOfWork {
    /// Begin a transaction and bind the tenant before any statement runs
    pub async fn begin(pool: &PgPool, context: TenantContext) -> DataResult<Self> {
        let mut tx = pool.begin().await?;
        bind(&mut tx, context.tenant_id).await?;

        let span = info_span!(
            "unit_of_work",
            tenant_id = %context.tenant_id,
            user_id = ?context.user_id,
        );
        span.in_scope(|| debug!("tenant bound"));

        Ok(Self { tx, context, span })
    }

    pub fn context(&self) -> &TenantContext {
        &self.context
    }

    pub fn tenant_id(&self) -> TenantId {
        self.context.tenant_id
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.context.user_id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// The transaction's connection, for statements the repositories do
    /// not cover. The tenant binding applies to them as well.
    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    /// Override the similarity index search breadth for this unit of work
    pub async fn set_ef_search(&mut self, ef_search: u32) -> DataResult<()> {
        if !EF_SEARCH_RANGE.contains(&ef_search) {
            return Err(DataError::Invalid(format!(
                "ef_search must be between {} and {}, got {ef_search}",
                EF_SEARCH_RANGE.start(),
                EF_SEARCH_RANGE.end()
            )));
        }
        self.execute(
            sqlx::query("SELECT set_config($1, $2, true)")
                .bind(EF_SEARCH_SETTING)
                .bind(ef_search.to_string()),
        )
        .await?;
        Ok(())
    }

    pub async fn execute<'q>(
        &mut self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> DataResult<PgQueryResult> {
        let result = query.execute(&mut *self.tx).instrument(self.span.clone()).await;
        self.check(result)
    }

    pub async fn fetch_one<'q, O>(&mut self, query: QueryAs<'q, Postgres, O, PgArguments>) -> DataResult<O>
    where
        O: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let result = query.fetch_one(&mut *self.tx).instrument(self.span.clone()).await;
        self.check(result)
    }

    pub async fn fetch_optional<'q, O>(
        &mut self,
        query: QueryAs<'q, Postgres, O, PgArguments>,
    ) -> DataResult<Option<O>>
    where
        O: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let result = query
            .fetch_optional(&mut *self.tx)
            .instrument(self.span.clone())
            .await;
        self.check(result)
    }

    pub async fn fetch_all<'q, O>(
        &mut self,
        query: QueryAs<'q, Postgres, O, PgArguments>,
    ) -> DataResult<Vec<O>>
    where
        O: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let result = query.fetch_all(&mut *self.tx).instrument(self.span.clone()).await;
        self.check(result)
    }

    /// Classify a database result, logging security events
    pub fn check<T>(&self, result: Result<T, sqlx::Error>) -> DataResult<T> {
        result.map_err(|e| {
            let err = DataError::from(e);
            if err.is_security_event() {
                warn!(
                    target: "docvault::security",
                    parent: &self.span,
                    tenant_id = %self.context.tenant_id,
                    user_id = ?self.context.user_id,
                    error = %err,
                    "statement rejected"
                );
            }
            err
        })
    }

    /// Make every write of the unit of work durable
    pub async fn commit(self) -> DataResult<()> {
        let span = self.span.clone();
        self.tx.commit().instrument(span.clone()).await?;
        span.in_scope(|| debug!("committed"));
        Ok(())
    }

    /// Discard every write of the unit of work; dropping it does the same
    pub async fn rollback(self) -> DataResult<()> {
        let span = self.span.clone();
        self.tx.rollback().instrument(span.clone()).await?;
        span.in_scope(|| debug!("rolled back"));
        Ok(())
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
