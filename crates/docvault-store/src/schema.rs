//! Names and codes shared with the SQL migrations
//!
//! Each constant mirrors a literal in `migrations/`; changing one without
//! the other breaks isolation or error classification.

/// Transaction-local setting read by every row-security policy
pub const CURRENT_TENANT_SETTING: &str = "app.current_tenant_id";

/// pgvector HNSW search breadth
pub const EF_SEARCH_SETTING: &str = "hnsw.ef_search";

/// Dimension of `documents.embedding`
pub const EMBEDDING_DIMENSIONS: usize = 1024;

/// Message raised by the audit log immutability triggers
pub const AUDIT_IMMUTABLE_MESSAGE: &str = "Audit logs are immutable and cannot be modified or deleted";

/// Rows covered by `idx_documents_embedding_hnsw`
pub const EMBEDDING_INDEX_PREDICATE: &str = "embedding IS NOT NULL AND deleted_at IS NULL";

/// SQLSTATE codes the store distinguishes
pub mod sqlstate {
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
    pub const RESTRICT_VIOLATION: &str = "23001";
    pub const NOT_NULL_VIOLATION: &str = "23502";
    pub const CHECK_VIOLATION: &str = "23514";
    pub const INSUFFICIENT_PRIVILEGE: &str = "42501";
    pub const DUPLICATE_OBJECT: &str = "42710";
    /// Class 22: malformed values, wrong vector dimensions
    pub const DATA_EXCEPTION_CLASS: &str = "22";
    /// Raised by `prevent_audit_log_modification()`
    pub const AUDIT_IMMUTABLE: &str = "DV001";
}
