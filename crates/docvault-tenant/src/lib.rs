//! DocVault Tenant Isolation
//!
//! Data access for tenant-owned records. Isolation is enforced twice: the
//! repositories scope every statement to the caller's tenant, and
//! PostgreSQL evaluates row-security policies against the tenant bound to
//! the transaction of the current unit of work.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  verified (tenant_id, user_id?)                                 │
//! │          │                                                      │
//! │  ┌───────▼────────┐   BEGIN + set_config(.., true)              │
//! │  │   UnitOfWork   │──────────────────────┐                      │
//! │  └───────┬────────┘   COMMIT / ROLLBACK  │                      │
//! │          │                               ▼                      │
//! │  ┌───────▼────────┐           ┌─────────────────────┐           │
//! │  │  Repositories  │  scoped   │  Transaction        │           │
//! │  │  + lifecycle   │──────────▶│  app.current_tenant │           │
//! │  │  + search      │ statements└──────────┬──────────┘           │
//! │  └────────────────┘                      │ row security         │
//! │                                 ┌────────▼────────┐             │
//! │                                 │   PostgreSQL    │             │
//! │                                 └─────────────────┘             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod context;
pub mod error;
pub mod isolation;
pub mod lifecycle;
pub mod model;
pub mod repository;
pub mod search;

pub use context::{
    bind, bound_tenant, clear, TenantContext, UnitOfWork, CURRENT_TENANT_SETTING, EF_SEARCH_RANGE,
};
pub use error::{DataError, DataResult};
pub use lifecycle::Transition;
pub use model::{
    AuditLogId, Document, DocumentId, DocumentStatus, Entity, NewDocument, NewTenant, NewUser,
    SoftDelete, StorageLocator, Tenant, TenantId, TenantStatus, User, UserId, SYSTEM_TENANT_ID,
};
pub use repository::{DocumentRepository, TenantRepository, UserRepository};
pub use docvault_store::{AUDIT_IMMUTABLE_MESSAGE, EMBEDDING_DIMENSIONS};
pub use search::{similar, SimilarDocument, SimilarityQuery};
