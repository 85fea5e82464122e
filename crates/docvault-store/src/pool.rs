//! Connection pool
//!
//! Connections are reused across callers. Tenant bindings are transaction
//! local, so they end with the unit of work that set them; on release every
//! session setting is reset anyway, and a tenant that is still bound at that
//! point is logged as a security event because something bound it at
//! session scope.

use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::schema::CURRENT_TENANT_SETTING;
use crate::StoreError;

/// Pool sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
    pub max_connections: u32,
    pub min_connections: u32,
    #[serde(with = "duration_secs")]
    pub acquire_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// Open a pool against `url`
pub async fn connect(url: &str, options: &PoolOptions) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(options.max_connections.max(1))
        .min_connections(options.min_connections)
        .acquire_timeout(options.acquire_timeout)
        .after_release(|conn, _meta| Box::pin(async move { reset_session(conn).await }))
        .connect(url)
        .await?;

    info!(
        max_connections = options.max_connections,
        acquire_timeout = ?options.acquire_timeout,
        "connection pool ready"
    );
    Ok(pool)
}

/// Clear every session setting before the connection is reused
async fn reset_session(conn: &mut PgConnection) -> Result<bool, sqlx::Error> {
    let leaked: Option<String> = sqlx::query_scalar("SELECT NULLIF(current_setting($1, true), '')")
        .bind(CURRENT_TENANT_SETTING)
        .fetch_one(&mut *conn)
        .await?;

    if let Some(tenant_id) = leaked {
        warn!(
            target: "docvault::security",
            tenant_id = %tenant_id,
            "tenant still bound on released connection"
        );
    }

    sqlx::query("RESET ALL").execute(&mut *conn).await?;
    debug!("session reset");
    Ok(true)
}

/// Refuse roles that row-level security does not apply to
pub async fn ensure_row_security_enforced(pool: &PgPool) -> Result<(), StoreError> {
    let (role, bypasses): (String, bool) = sqlx::query_as(
        "SELECT rolname::text, rolsuper OR rolbypassrls FROM pg_roles WHERE rolname = current_user",
    )
    .fetch_one(pool)
    .await?;

    if bypasses {
        return Err(StoreError::RowSecurityBypassed { role });
    }
    debug!(role = %role, "row security applies to connection role");
    Ok(())
}
