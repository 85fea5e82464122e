//! Versioned schema migrations
//!
//! Forward-only SQL files under `migrations/`, embedded at compile time.
//! They must run as the schema owner; the service role only reads and
//! writes rows.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::migrate::Migrator;
use sqlx::PgPool;
use tracing::info;

use crate::StoreError;

/// Every DocVault migration, in version order
pub static MIGRATOR: Migrator = sqlx::migrate!();

/// A migration recorded as applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct AppliedMigration {
    pub version: i64,
    pub description: String,
    pub installed_on: DateTime<Utc>,
}

/// Apply pending migrations
///
/// Returns the versions applied by this call.
pub async fn run(pool: &PgPool) -> Result<Vec<i64>, StoreError> {
    let before: Vec<i64> = applied(pool).await?.iter().map(|m| m.version).collect();
    MIGRATOR.run(pool).await?;

    let now_applied: Vec<i64> = MIGRATOR
        .iter()
        .map(|m| m.version)
        .filter(|v| !before.contains(v))
        .collect();
    for version in &now_applied {
        info!(version, "migration applied");
    }
    Ok(now_applied)
}

/// Migrations recorded in the history table, oldest first
pub async fn applied(pool: &PgPool) -> Result<Vec<AppliedMigration>, StoreError> {
    let exists: bool = sqlx::query_scalar("SELECT to_regclass('_sqlx_migrations') IS NOT NULL")
        .fetch_one(pool)
        .await?;
    if !exists {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, AppliedMigration>(
        "SELECT version, description, installed_on FROM _sqlx_migrations \
         WHERE success ORDER BY version",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestDb;

    #[test]
    fn test_migrations_are_ordered() {
        let versions: Vec<i64> = MIGRATOR.iter().map(|m| m.version).collect();
        assert_eq!(versions, (1..=8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_migrations_apply_once() {
        let db = TestDb::new().await.unwrap();
        let history = applied(db.admin()).await.unwrap();
        assert_eq!(history.len(), MIGRATOR.iter().count());
        assert_eq!(history[0].description, "enable pgvector");
        assert!(run(db.admin()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_every_table_forces_row_security() {
        let db = TestDb::new().await.unwrap();
        let tables: Vec<(String, bool, bool)> = sqlx::query_as(
            "SELECT relname::text, relrowsecurity, relforcerowsecurity FROM pg_class \
             WHERE relname IN ('tenants', 'users', 'documents', 'audit_logs') ORDER BY relname",
        )
        .fetch_all(db.admin())
        .await
        .unwrap();

        assert_eq!(tables.len(), 4);
        for (table, enabled, forced) in tables {
            assert!(enabled && forced, "{table} does not force row security");
        }
    }

    #[tokio::test]
    async fn test_audit_logs_have_no_update_or_delete_policy() {
        let db = TestDb::new().await.unwrap();
        let commands: Vec<String> = sqlx::query_scalar(
            "SELECT cmd FROM pg_policies WHERE tablename = 'audit_logs' ORDER BY cmd",
        )
        .fetch_all(db.admin())
        .await
        .unwrap();
        assert_eq!(commands, vec!["INSERT", "SELECT"]);
    }
}
