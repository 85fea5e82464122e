//! Application-level tenant filtering
//!
//! Second line of defence next to the database's row-security policies:
//! every repository statement carries an explicit tenant predicate, and
//! every write naming a tenant is checked before it is sent.
//!
//! By convention the caller's tenant is always bound as `$1`.

use tracing::warn;

use crate::context::TenantContext;
use crate::error::{DataError, DataResult};
use crate::model::{Entity, SoftDelete, TenantId};

/// Predicate restricting `E` to the tenant bound as `$1`
pub fn scoped<E: Entity>() -> String {
    format!("{} = $1", E::TENANT_COLUMN)
}

/// [`scoped`], restricted to live rows
pub fn scoped_live<E: SoftDelete>() -> String {
    format!("{} AND {} IS NULL", scoped::<E>(), E::TOMBSTONE)
}

/// Reject a write whose target tenant differs from the bound one
pub fn check_write<E: Entity>(context: &TenantContext, tenant_id: TenantId) -> DataResult<()> {
    if tenant_id == context.tenant_id {
        return Ok(());
    }
    warn!(
        target: "docvault::security",
        bound_tenant = %context.tenant_id,
        requested_tenant = %tenant_id,
        user_id = ?context.user_id,
        table = E::TABLE,
        "cross-tenant write rejected"
    );
    Err(DataError::IsolationViolation {
        table: E::TABLE.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Document, Tenant, User};
    use uuid::Uuid;

    #[test]
    fn test_scoped_uses_tenant_column() {
        assert_eq!(scoped::<User>(), "tenant_id = $1");
        assert_eq!(scoped::<Tenant>(), "id = $1");
        assert_eq!(
            scoped_live::<Document>(),
            "tenant_id = $1 AND deleted_at IS NULL"
        );
    }

    #[test]
    fn test_check_write() {
        let ctx = TenantContext::new(Uuid::new_v4());
        assert!(check_write::<User>(&ctx, ctx.tenant_id).is_ok());
        let err = check_write::<User>(&ctx, Uuid::new_v4()).unwrap_err();
        assert!(err.is_security_event());
    }
}
