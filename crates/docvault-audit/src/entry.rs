//! Audit log entries

use chrono::{DateTime, Utc};
use docvault_tenant::{AuditLogId, DataError, DataResult, Entity, TenantId, UserId};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};
use uuid::Uuid;

/// One immutable ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: AuditLogId,
    pub tenant_id: TenantId,
    /// `None` for system actions
    pub user_id: Option<UserId>,
    /// e.g. `document.deleted`
    pub action: String,
    pub resource_type: String,
    pub resource_id: Uuid,
    /// IPv4 or IPv6 text form
    pub network_address: Option<String>,
    pub agent: Option<String>,
    /// Stored in the `metadata` column
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for AuditLogEntry {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            user_id: row.try_get("user_id")?,
            action: row.try_get("action")?,
            resource_type: row.try_get("resource_type")?,
            resource_id: row.try_get("resource_id")?,
            network_address: row.try_get("network_address")?,
            agent: row.try_get("agent")?,
            details: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl Entity for AuditLogEntry {
    const TABLE: &'static str = "audit_logs";
    const KIND: &'static str = "audit_log";
    const TENANT_COLUMN: &'static str = "tenant_id";

    fn id(&self) -> Uuid {
        self.id
    }
}

/// Longest accepted network address (IPv6 with embedded IPv4)
pub const MAX_NETWORK_ADDRESS_LEN: usize = 45;

/// Entry to append
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Defaults to the caller's tenant; any other value is rejected
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    /// Defaults to the caller's user
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Uuid,
    #[serde(default)]
    pub network_address: Option<String>,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

impl AuditRecord {
    pub fn new(action: &str, resource_type: &str, resource_id: Uuid) -> Self {
        Self {
            tenant_id: None,
            user_id: None,
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id,
            network_address: None,
            agent: None,
            details: None,
        }
    }

    pub fn tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn actor(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn network_address(mut self, address: Option<&str>) -> Self {
        self.network_address = address.map(str::to_string);
        self
    }

    pub fn agent(mut self, agent: Option<&str>) -> Self {
        self.agent = agent.map(str::to_string);
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Shape checks that need no database access
    pub(crate) fn validate(&self) -> DataResult<()> {
        if self.action.trim().is_empty() || self.resource_type.trim().is_empty() {
            return Err(DataError::Invalid(
                "audit action and resource type are required".into(),
            ));
        }
        if self
            .network_address
            .as_ref()
            .is_some_and(|a| a.chars().count() > MAX_NETWORK_ADDRESS_LEN)
        {
            return Err(DataError::Invalid("network address is too long".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_optional_fields() {
        let record = AuditRecord::new("document.deleted", "document", Uuid::new_v4())
            .network_address(Some("10.0.0.1"))
            .agent(Some("curl/8.0"))
            .details(serde_json::json!({"reason": "expired"}));
        assert_eq!(record.network_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(record.details.unwrap()["reason"], "expired");
        assert!(record.user_id.is_none());
    }

    #[test]
    fn test_validate() {
        let id = Uuid::new_v4();
        assert!(AuditRecord::new("user.created", "user", id).validate().is_ok());
        assert!(AuditRecord::new(" ", "user", id).validate().is_err());
        assert!(AuditRecord::new("user.created", "", id).validate().is_err());

        let ipv6 = "ffff:ffff:ffff:ffff:ffff:ffff:255.255.255.255";
        assert_eq!(ipv6.len(), MAX_NETWORK_ADDRESS_LEN);
        let record = AuditRecord::new("a", "b", id).network_address(Some(ipv6));
        assert!(record.validate().is_ok());
        let record = AuditRecord::new("a", "b", id).network_address(Some(&format!("{ipv6}0")));
        assert!(record.validate().is_err());
    }
}
