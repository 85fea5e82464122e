//! Data-access errors

use docvault_store::StoreError;
use uuid::Uuid;

/// Data-access result type
pub type DataResult<T> = Result<T, DataError>;

/// Data-access errors
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: Uuid },

    /// Write naming a tenant other than the bound one
    #[error("tenant isolation violation on {table}")]
    IsolationViolation { table: String },

    /// Update or delete against an append-only table
    #[error("{message}")]
    ImmutabilityViolation { table: String, message: String },

    /// Create or restore collides with an active record's unique key
    #[error("{table} conflicts with an active record ({constraint})")]
    Conflict { table: String, constraint: String },

    /// Delete blocked by dependents that must be handled first
    #[error("row is still referenced by live {dependent} ({constraint})")]
    ReferentialRestriction { dependent: String, constraint: String },

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Store(StoreError),
}

impl DataError {
    pub fn not_found(kind: &'static str, id: Uuid) -> Self {
        Self::NotFound { kind, id }
    }

    /// Only pool exhaustion and lost connections are transient; isolation
    /// and immutability violations in particular are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Logged under the security target when raised
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            Self::IsolationViolation { .. } | Self::ImmutabilityViolation { .. }
        )
    }
}

impl From<StoreError> for DataError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RowSecurity { table } => Self::IsolationViolation { table },
            StoreError::Immutable { table, message } => {
                Self::ImmutabilityViolation { table, message }
            }
            StoreError::UniqueViolation { table, constraint } => Self::Conflict { table, constraint },
            StoreError::RestrictViolation {
                dependent,
                constraint,
            } => Self::ReferentialRestriction {
                dependent,
                constraint,
            },
            StoreError::Integrity(message) => Self::Invalid(message),
            StoreError::Unavailable(message) => Self::Unavailable(message),
            e => Self::Store(e),
        }
    }
}

impl From<sqlx::Error> for DataError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::from(err).into()
    }
}
