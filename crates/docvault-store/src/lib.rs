//! DocVault Store
//!
//! PostgreSQL plumbing shared by every DocVault crate: the versioned schema,
//! the connection pool and the classification of database errors.
//!
//! Tenant isolation, referential integrity on soft deletes and audit log
//! immutability are enforced by the database itself, through row-level
//! security policies and triggers installed by the migrations. The service
//! connects as a role that cannot bypass them.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          PgPool                                  │
//! │   acquire → BEGIN → set_config(app.current_tenant_id, local)     │
//! │   release → RESET ALL (a still-bound tenant is logged)           │
//! └────────────────────────────────┬─────────────────────────────────┘
//!                                  │
//! ┌────────────────────────────────▼─────────────────────────────────┐
//! │                          PostgreSQL                              │
//! │  BEFORE triggers → row security → constraints → write + indexes  │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌───────────────┐     │
//! │  │  tables  │  │ policies │  │ triggers │  │ HNSW (vector) │     │
//! │  └──────────┘  └──────────┘  └──────────┘  └───────────────┘     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod migrate;
pub mod pool;
pub mod schema;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use migrate::{AppliedMigration, MIGRATOR};
pub use pool::{connect, ensure_row_security_enforced, PoolOptions};
pub use schema::{
    sqlstate, AUDIT_IMMUTABLE_MESSAGE, CURRENT_TENANT_SETTING, EF_SEARCH_SETTING,
    EMBEDDING_DIMENSIONS, EMBEDDING_INDEX_PREDICATE,
};

/// Database errors, classified by what the caller can do about them
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("new row violates row-level security policy for table \"{table}\"")]
    RowSecurity { table: String },

    #[error("{message}")]
    Immutable { table: String, message: String },

    #[error("duplicate key value violates unique constraint \"{constraint}\" on \"{table}\"")]
    UniqueViolation { table: String, constraint: String },

    #[error("row is still referenced from table \"{dependent}\" via \"{constraint}\"")]
    RestrictViolation { dependent: String, constraint: String },

    /// Not-null, check, foreign key and data format violations
    #[error("{0}")]
    Integrity(String),

    #[error("database unavailable: {0}")]
    Unavailable(String),

    #[error("role \"{role}\" bypasses row-level security")]
    RowSecurityBypassed { role: String },

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut => Self::Unavailable("timed out waiting for a connection".into()),
            sqlx::Error::PoolClosed => Self::Unavailable("connection pool is closed".into()),
            sqlx::Error::Io(e) => Self::Unavailable(e.to_string()),
            sqlx::Error::WorkerCrashed => Self::Unavailable("connection worker crashed".into()),
            sqlx::Error::Database(db) => classify(db.as_ref()).unwrap_or(Self::Database(err)),
            _ => Self::Database(err),
        }
    }
}

fn classify(db: &dyn sqlx::error::DatabaseError) -> Option<StoreError> {
    let code = db.code()?;
    let message = db.message();
    let table = || db.table().unwrap_or_default().to_string();
    let constraint = || db.constraint().unwrap_or_default().to_string();

    let err = match &*code {
        sqlstate::INSUFFICIENT_PRIVILEGE if message.contains("row-level security") => {
            StoreError::RowSecurity {
                table: quoted_relation(message).unwrap_or_else(table),
            }
        }
        sqlstate::AUDIT_IMMUTABLE => StoreError::Immutable {
            table: table(),
            message: message.to_string(),
        },
        sqlstate::UNIQUE_VIOLATION => StoreError::UniqueViolation {
            table: table(),
            constraint: constraint(),
        },
        sqlstate::RESTRICT_VIOLATION => StoreError::RestrictViolation {
            dependent: table(),
            constraint: constraint(),
        },
        // A hard delete blocked by ON DELETE RESTRICT reports the referencing table
        sqlstate::FOREIGN_KEY_VIOLATION if message.starts_with("update or delete") => {
            StoreError::RestrictViolation {
                dependent: table(),
                constraint: constraint(),
            }
        }
        sqlstate::FOREIGN_KEY_VIOLATION
        | sqlstate::NOT_NULL_VIOLATION
        | sqlstate::CHECK_VIOLATION => StoreError::Integrity(message.to_string()),
        c if c.starts_with(sqlstate::DATA_EXCEPTION_CLASS) => {
            StoreError::Integrity(message.to_string())
        }
        _ => return None,
    };
    Some(err)
}

/// First double-quoted name in a server message
fn quoted_relation(message: &str) -> Option<String> {
    let start = message.find('"')? + 1;
    let len = message[start..].find('"')?;
    Some(message[start..start + len].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoted_relation() {
        assert_eq!(
            quoted_relation("new row violates row-level security policy for table \"users\""),
            Some("users".to_string())
        );
        assert_eq!(quoted_relation("no quotes here"), None);
        assert_eq!(quoted_relation("dangling \"quote"), None);
    }

    #[test]
    fn test_pool_errors_are_unavailable() {
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolClosed),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            StoreError::from(sqlx::Error::RowNotFound),
            StoreError::Database(_)
        ));
    }
}
