//! Tenant Data Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use pgvector::Vector;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Tenant ID
pub type TenantId = Uuid;
/// User ID
pub type UserId = Uuid;
/// Document ID
pub type DocumentId = Uuid;
/// Audit log entry ID
pub type AuditLogId = Uuid;

/// Tenant owning platform-level records, seeded by the first migration
pub const SYSTEM_TENANT_ID: TenantId = Uuid::nil();

/// A persisted record type
pub trait Entity: for<'r> FromRow<'r, PgRow> + Send + Unpin {
    /// Backing table
    const TABLE: &'static str;
    /// Resource type name used in errors and audit entries
    const KIND: &'static str;
    /// Column compared against the bound tenant
    const TENANT_COLUMN: &'static str;

    fn id(&self) -> Uuid;
}

/// Record with a tombstone column
pub trait SoftDelete: Entity {
    /// Tombstone column name
    const TOMBSTONE: &'static str = "deleted_at";

    fn deleted_at(&self) -> Option<DateTime<Utc>>;

    fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }
}

/// Decode a text column through `FromStr`
fn parse_column<T: FromStr<Err = String>>(row: &PgRow, column: &str) -> Result<T, sqlx::Error> {
    row.try_get::<String, _>(column)?
        .parse()
        .map_err(|e: String| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: e.into(),
        })
}

/// Tenant lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    #[default]
    Active,
    Suspended,
    Trial,
}

impl TenantStatus {
    pub const ALL: [TenantStatus; 3] = [Self::Active, Self::Suspended, Self::Trial];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Trial => "trial",
        }
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| format!("unknown tenant status: {s}"))
    }
}

/// Organization / customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub status: TenantStatus,
    /// Reference to the tenant's encryption key (managed externally)
    pub encryption_key_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for Tenant {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            status: parse_column(row, "status")?,
            encryption_key_ref: row.try_get("encryption_key_ref")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

impl Entity for Tenant {
    const TABLE: &'static str = "tenants";
    const KIND: &'static str = "tenant";
    const TENANT_COLUMN: &'static str = "id";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl SoftDelete for Tenant {
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

/// Tenant creation request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTenant {
    pub name: String,
    #[serde(default)]
    pub status: TenantStatus,
    #[serde(default)]
    pub encryption_key_ref: Option<String>,
}

impl NewTenant {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

}

/// User account within a tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub email: String,
    /// Subject at the external identity provider
    pub external_ref: Option<String>,
    pub display_name: Option<String>,
    /// Reserved role label; not interpreted by this crate
    pub role: Option<String>,
    pub last_active_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for User {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            email: row.try_get("email")?,
            external_ref: row.try_get("external_ref")?,
            display_name: row.try_get("display_name")?,
            role: row.try_get("role")?,
            last_active_at: row.try_get("last_active_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

impl Entity for User {
    const TABLE: &'static str = "users";
    const KIND: &'static str = "user";
    const TENANT_COLUMN: &'static str = "tenant_id";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl SoftDelete for User {
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

/// User creation request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewUser {
    /// Defaults to the caller's tenant; any other value is rejected
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    pub email: String,
    #[serde(default)]
    pub external_ref: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl NewUser {
    pub fn new(email: &str) -> Self {
        Self {
            email: email.to_string(),
            ..Default::default()
        }
    }

}

/// Document processing status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    #[default]
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 3] = [Self::Processing, Self::Completed, Self::Failed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| format!("unknown document status: {s}"))
    }
}

/// Where the document bytes live in object storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocator {
    pub bucket: String,
    pub key: String,
    /// Original filename from upload
    pub filename: String,
}

/// Uploaded document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub tenant_id: TenantId,
    pub owner_id: UserId,
    pub locator: StorageLocator,
    pub content_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub status: DocumentStatus,
    /// Free-form attributes, stored in the `metadata` column
    pub attributes: serde_json::Value,
    #[serde(default, skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn has_embedding(&self) -> bool {
        self.embedding.is_some()
    }
}

impl<'r> FromRow<'r, PgRow> for Document {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            owner_id: row.try_get("owner_id")?,
            locator: StorageLocator {
                bucket: row.try_get("storage_bucket")?,
                key: row.try_get("storage_key")?,
                filename: row.try_get("filename")?,
            },
            content_type: row.try_get("content_type")?,
            size_bytes: row.try_get("size_bytes")?,
            status: parse_column(row, "status")?,
            attributes: row.try_get("metadata")?,
            embedding: row
                .try_get::<Option<Vector>, _>("embedding")?
                .map(|v| v.to_vec()),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

impl Entity for Document {
    const TABLE: &'static str = "documents";
    const KIND: &'static str = "document";
    const TENANT_COLUMN: &'static str = "tenant_id";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl SoftDelete for Document {
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

/// Document creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    /// Defaults to the caller's tenant; any other value is rejected
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    pub owner_id: UserId,
    pub locator: StorageLocator,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<i64>,
    #[serde(default)]
    pub status: DocumentStatus,
    #[serde(default = "empty_object")]
    pub attributes: serde_json::Value,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

impl NewDocument {
    pub fn new(owner_id: UserId, bucket: &str, key: &str, filename: &str) -> Self {
        Self {
            tenant_id: None,
            owner_id,
            locator: StorageLocator {
                bucket: bucket.to_string(),
                key: key.to_string(),
                filename: filename.to_string(),
            },
            content_type: None,
            size_bytes: None,
            status: DocumentStatus::Processing,
            attributes: empty_object(),
            embedding: None,
        }
    }

    pub fn embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

}
