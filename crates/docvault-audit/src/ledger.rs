//! Append-only ledger access
//!
//! [`AuditLedger`] can append and read; it has no way to change or remove
//! an entry. The schema's reject triggers cover every other statement path.

use chrono::{DateTime, Utc};
use docvault_tenant::{
    isolation, AuditLogId, DataError, DataResult, Entity, TenantId, UnitOfWork, UserId,
    UserRepository,
};
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};
use tracing::{info, warn};

use crate::entry::{AuditLogEntry, AuditRecord};

const INSERT_ENTRY_SQL: &str = r#"
    INSERT INTO audit_logs (
        tenant_id, user_id, action, resource_type, resource_id,
        network_address, agent, metadata
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, COALESCE($8, '{}'::jsonb))
    RETURNING *
"#;

/// Listing filter; unset fields match everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub actor: Option<UserId>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl AuditFilter {
    /// `WHERE` clause for `tenant_id` plus every set field
    fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>, tenant_id: TenantId) {
        qb.push(" WHERE tenant_id = ").push_bind(tenant_id);
        if let Some(action) = &self.action {
            qb.push(" AND action = ").push_bind(action.clone());
        }
        if let Some(resource_type) = &self.resource_type {
            qb.push(" AND resource_type = ").push_bind(resource_type.clone());
        }
        if let Some(actor) = self.actor {
            qb.push(" AND user_id = ").push_bind(actor);
        }
        if let Some(since) = self.since {
            qb.push(" AND created_at >= ").push_bind(since);
        }
        if let Some(until) = self.until {
            qb.push(" AND created_at <= ").push_bind(until);
        }
    }
}

/// Export format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

/// Ledger of the tenant bound to a unit of work
pub struct AuditLedger<'a> {
    uow: &'a mut UnitOfWork,
}

impl<'a> AuditLedger<'a> {
    pub fn new(uow: &'a mut UnitOfWork) -> Self {
        Self { uow }
    }

    /// Append an entry and return its id
    ///
    /// The actor, explicit or taken from the context, must be a user of the
    /// bound tenant. The `user_id` foreign key is checked without row
    /// security, so it alone would accept another tenant's user.
    pub async fn record(&mut self, record: AuditRecord) -> DataResult<AuditLogId> {
        let tenant_id = record.tenant_id.unwrap_or(self.uow.tenant_id());
        isolation::check_write::<AuditLogEntry>(self.uow.context(), tenant_id)?;
        record.validate()?;

        let user_id = record.user_id.or(self.uow.user_id());
        if let Some(actor) = user_id {
            self.check_actor(actor).await?;
        }

        let entry = self
            .uow
            .fetch_one(
                sqlx::query_as::<_, AuditLogEntry>(INSERT_ENTRY_SQL)
                    .bind(tenant_id)
                    .bind(user_id)
                    .bind(&record.action)
                    .bind(&record.resource_type)
                    .bind(record.resource_id)
                    .bind(&record.network_address)
                    .bind(&record.agent)
                    .bind(&record.details),
            )
            .await?;
        info!(
            audit_id = %entry.id,
            action = %entry.action,
            resource_id = %entry.resource_id,
            "audit recorded"
        );
        Ok(entry.id)
    }

    /// Soft-deleted actors are accepted; entries outlive their users
    async fn check_actor(&mut self, actor: UserId) -> DataResult<()> {
        match UserRepository::new(self.uow).get_any(actor).await {
            Ok(_) => Ok(()),
            Err(DataError::NotFound { .. }) => {
                warn!(
                    target: "docvault::security",
                    bound_tenant = %self.uow.tenant_id(),
                    actor = %actor,
                    "audit actor is not a user of the bound tenant"
                );
                Err(DataError::Invalid(format!(
                    "actor {actor} is not a user of this tenant"
                )))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get(&mut self, id: AuditLogId) -> DataResult<AuditLogEntry> {
        let sql = format!(
            "SELECT * FROM {} WHERE {} AND id = $2",
            AuditLogEntry::TABLE,
            isolation::scoped::<AuditLogEntry>()
        );
        let tenant_id = self.uow.tenant_id();
        self.uow
            .fetch_optional(sqlx::query_as(&sql).bind(tenant_id).bind(id))
            .await?
            .ok_or_else(|| DataError::not_found(AuditLogEntry::KIND, id))
    }

    /// Matching entries, newest first
    pub async fn list(&mut self, filter: &AuditFilter) -> DataResult<Vec<AuditLogEntry>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM audit_logs");
        filter.push_where(&mut qb, self.uow.tenant_id());
        qb.push(" ORDER BY created_at DESC, id DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ")
                .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        self.uow.fetch_all(qb.build_query_as()).await
    }

    /// Matching entries, ignoring `limit`
    pub async fn count(&mut self, filter: &AuditFilter) -> DataResult<u64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT count(*) FROM audit_logs");
        filter.push_where(&mut qb, self.uow.tenant_id());
        let (count,): (i64,) = self.uow.fetch_one(qb.build_query_as()).await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    pub async fn export(&mut self, filter: &AuditFilter, format: ExportFormat) -> DataResult<String> {
        let entries = self.list(filter).await?;
        match format {
            ExportFormat::Json => serde_json::to_string_pretty(&entries)
                .map_err(|e| DataError::Invalid(format!("audit export failed: {e}"))),
            ExportFormat::Csv => Ok(render_csv(&entries)),
        }
    }
}

/// CSV with a header row; fields are quoted only when needed
pub fn render_csv(entries: &[AuditLogEntry]) -> String {
    let mut csv = String::from(
        "id,created_at,user_id,action,resource_type,resource_id,network_address,agent,details\n",
    );
    for e in entries {
        let fields = [
            e.id.to_string(),
            e.created_at.to_rfc3339(),
            e.user_id.map(|u| u.to_string()).unwrap_or_default(),
            e.action.clone(),
            e.resource_type.clone(),
            e.resource_id.to_string(),
            e.network_address.clone().unwrap_or_default(),
            e.agent.clone().unwrap_or_default(),
            e.details.to_string(),
        ];
        let line: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        csv.push_str(&line.join(","));
        csv.push('\n');
    }
    csv
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
