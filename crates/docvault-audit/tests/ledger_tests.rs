//! Ledger behavior against the migrated schema
//!
//! A rejected statement aborts its transaction, so every expected database
//! error ends the unit of work it happened in.

use docvault_audit::{AuditFilter, AuditLedger, AuditRecord, ExportFormat};
use docvault_store::testing::TestDb;
use docvault_tenant::{
    DataError, NewTenant, NewUser, TenantContext, TenantId, TenantRepository, UnitOfWork, User,
    UserRepository, AUDIT_IMMUTABLE_MESSAGE,
};
use sqlx::PgPool;
use uuid::Uuid;

async fn tenant_with_user(pool: &PgPool, name: &str) -> (TenantId, User) {
    let tenant = Uuid::new_v4();
    let mut uow = UnitOfWork::begin(pool, TenantContext::new(tenant)).await.unwrap();
    TenantRepository::new(&mut uow)
        .create(NewTenant::new(name))
        .await
        .unwrap();
    let user = UserRepository::new(&mut uow)
        .create(NewUser::new(&format!("admin@{name}.test")))
        .await
        .unwrap();
    uow.commit().await.unwrap();
    (tenant, user)
}

async fn as_user(pool: &PgPool, tenant: TenantId, user: &User) -> UnitOfWork {
    UnitOfWork::begin(pool, TenantContext::new(tenant).with_user(user.id))
        .await
        .unwrap()
}

async fn record_committed(pool: &PgPool, tenant: TenantId, user: &User) -> Uuid {
    let mut uow = as_user(pool, tenant, user).await;
    let id = AuditLedger::new(&mut uow)
        .record(AuditRecord::new("user.created", "user", user.id))
        .await
        .unwrap();
    uow.commit().await.unwrap();
    id
}

async fn entry_count(pool: &PgPool, tenant: TenantId, user: &User) -> u64 {
    let mut uow = as_user(pool, tenant, user).await;
    AuditLedger::new(&mut uow)
        .count(&AuditFilter::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_record_and_read_back() {
    let db = TestDb::new().await.unwrap();
    let (tenant, admin) = tenant_with_user(db.pool(), "acme").await;
    let mut uow = as_user(db.pool(), tenant, &admin).await;
    let mut ledger = AuditLedger::new(&mut uow);

    let resource = Uuid::new_v4();
    let id = ledger
        .record(
            AuditRecord::new("document.viewed", "document", resource)
                .network_address(Some("2001:db8::1"))
                .agent(Some("docvault-cli/1.0"))
                .details(serde_json::json!({"page": 2})),
        )
        .await
        .unwrap();

    let entry = ledger.get(id).await.unwrap();
    assert_eq!(entry.tenant_id, tenant);
    assert_eq!(entry.user_id, Some(admin.id));
    assert_eq!(entry.resource_id, resource);
    assert_eq!(entry.network_address.as_deref(), Some("2001:db8::1"));
    assert_eq!(entry.agent.as_deref(), Some("docvault-cli/1.0"));
    assert_eq!(entry.details["page"], 2);
}

#[tokio::test]
async fn test_system_action_has_no_actor() {
    let db = TestDb::new().await.unwrap();
    let (tenant, _) = tenant_with_user(db.pool(), "acme").await;
    let mut uow = UnitOfWork::begin(db.pool(), TenantContext::new(tenant))
        .await
        .unwrap();
    let mut ledger = AuditLedger::new(&mut uow);

    let id = ledger
        .record(AuditRecord::new("tenant.created", "tenant", tenant))
        .await
        .unwrap();
    let entry = ledger.get(id).await.unwrap();
    assert!(entry.user_id.is_none());
    assert_eq!(entry.details, serde_json::json!({}));
}

#[tokio::test]
async fn test_update_and_delete_are_refused() {
    let db = TestDb::new().await.unwrap();
    let (tenant, admin) = tenant_with_user(db.pool(), "acme").await;
    let id = record_committed(db.pool(), tenant, &admin).await;

    let mut uow = as_user(db.pool(), tenant, &admin).await;
    let err = uow
        .execute(
            sqlx::query("UPDATE audit_logs SET action = 'user.deleted' WHERE id = $1").bind(id),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::ImmutabilityViolation { ref table, .. } if table == "audit_logs"));
    assert_eq!(err.to_string(), AUDIT_IMMUTABLE_MESSAGE);
    assert!(!err.is_retryable());
    drop(uow);

    let mut uow = as_user(db.pool(), tenant, &admin).await;
    let err = uow
        .execute(sqlx::query("DELETE FROM audit_logs WHERE id = $1").bind(id))
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::ImmutabilityViolation { .. }));
    drop(uow);

    // Refused even when nothing would match
    let mut uow = as_user(db.pool(), tenant, &admin).await;
    let err = uow
        .execute(sqlx::query("DELETE FROM audit_logs WHERE id = $1").bind(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::ImmutabilityViolation { .. }));
    drop(uow);

    // The service role has no TRUNCATE grant; the owner is stopped by the trigger
    let err = sqlx::query("TRUNCATE audit_logs")
        .execute(db.admin())
        .await
        .unwrap_err();
    let code = err.as_database_error().and_then(|e| e.code().map(|c| c.into_owned()));
    assert_eq!(code.as_deref(), Some("DV001"));

    let mut uow = as_user(db.pool(), tenant, &admin).await;
    let mut ledger = AuditLedger::new(&mut uow);
    assert_eq!(ledger.count(&AuditFilter::default()).await.unwrap(), 1);
    assert_eq!(ledger.get(id).await.unwrap().action, "user.created");
}

#[tokio::test]
async fn test_unbound_and_foreign_sessions_cannot_mutate() {
    let db = TestDb::new().await.unwrap();
    let (a, admin) = tenant_with_user(db.pool(), "acme").await;
    let (b, _) = tenant_with_user(db.pool(), "globex").await;
    record_committed(db.pool(), a, &admin).await;

    let mut conn = db.pool().acquire().await.unwrap();
    assert!(sqlx::query("DELETE FROM audit_logs")
        .execute(&mut *conn)
        .await
        .is_err());
    drop(conn);

    let mut uow = UnitOfWork::begin(db.pool(), TenantContext::new(b)).await.unwrap();
    let err = uow
        .execute(sqlx::query("UPDATE audit_logs SET agent = 'x'"))
        .await
        .unwrap_err();
    assert!(err.is_security_event());
    drop(uow);

    // The superuser bypasses row security but not the triggers
    assert!(sqlx::query("DELETE FROM audit_logs")
        .execute(db.admin())
        .await
        .is_err());

    assert_eq!(entry_count(db.pool(), a, &admin).await, 1);
}

#[tokio::test]
async fn test_entries_are_tenant_scoped() {
    let db = TestDb::new().await.unwrap();
    let (a, alice) = tenant_with_user(db.pool(), "acme").await;
    let (b, bob) = tenant_with_user(db.pool(), "globex").await;

    let mut uow = as_user(db.pool(), a, &alice).await;
    let mut ledger = AuditLedger::new(&mut uow);
    let id = ledger
        .record(AuditRecord::new("user.created", "user", alice.id))
        .await
        .unwrap();
    let err = ledger
        .record(AuditRecord::new("user.created", "user", alice.id).tenant(b))
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::IsolationViolation { .. }));
    uow.commit().await.unwrap();

    let mut uow = as_user(db.pool(), b, &bob).await;
    let mut ledger = AuditLedger::new(&mut uow);
    assert!(matches!(ledger.get(id).await, Err(DataError::NotFound { .. })));
    assert_eq!(ledger.count(&AuditFilter::default()).await.unwrap(), 0);
    let visible: i64 = sqlx::query_scalar("SELECT count(*) FROM audit_logs")
        .fetch_one(uow.connection())
        .await
        .unwrap();
    assert_eq!(visible, 0);
}

#[tokio::test]
async fn test_list_filters_newest_first() {
    let db = TestDb::new().await.unwrap();
    let (tenant, admin) = tenant_with_user(db.pool(), "acme").await;
    let mut uow = as_user(db.pool(), tenant, &admin).await;
    let mut ledger = AuditLedger::new(&mut uow);

    let first = ledger
        .record(AuditRecord::new("document.created", "document", Uuid::new_v4()))
        .await
        .unwrap();
    let second = ledger
        .record(AuditRecord::new("document.deleted", "document", Uuid::new_v4()))
        .await
        .unwrap();
    let third = ledger
        .record(AuditRecord::new("user.created", "user", admin.id))
        .await
        .unwrap();

    let all: Vec<_> = ledger
        .list(&AuditFilter::default())
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(all, vec![third, second, first]);

    let documents = AuditFilter {
        resource_type: Some("document".into()),
        ..Default::default()
    };
    assert_eq!(ledger.count(&documents).await.unwrap(), 2);

    let cutoff = ledger.get(second).await.unwrap().created_at;
    let recent_documents = AuditFilter {
        since: Some(cutoff),
        ..documents.clone()
    };
    let hits = ledger.list(&recent_documents).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, second);

    let until_second = AuditFilter {
        until: Some(cutoff),
        ..Default::default()
    };
    let hits: Vec<_> = ledger
        .list(&until_second)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(hits, vec![second, first]);

    let limited = AuditFilter {
        limit: Some(1),
        ..Default::default()
    };
    assert_eq!(ledger.list(&limited).await.unwrap()[0].id, third);
    assert_eq!(ledger.count(&limited).await.unwrap(), 3);

    let none = AuditFilter {
        limit: Some(0),
        ..Default::default()
    };
    assert!(ledger.list(&none).await.unwrap().is_empty());

    let by_actor = AuditFilter {
        actor: Some(Uuid::new_v4()),
        ..Default::default()
    };
    assert!(ledger.list(&by_actor).await.unwrap().is_empty());

    let by_action = AuditFilter {
        action: Some("user.created".into()),
        actor: Some(admin.id),
        ..Default::default()
    };
    assert_eq!(ledger.list(&by_action).await.unwrap()[0].id, third);
}

#[tokio::test]
async fn test_recording_survives_actor_soft_delete() {
    let db = TestDb::new().await.unwrap();
    let (tenant, admin) = tenant_with_user(db.pool(), "acme").await;
    let mut uow = as_user(db.pool(), tenant, &admin).await;

    UserRepository::new(&mut uow).soft_delete(admin.id).await.unwrap();
    let mut ledger = AuditLedger::new(&mut uow);
    let id = ledger
        .record(AuditRecord::new("user.deleted", "user", admin.id))
        .await
        .unwrap();
    assert_eq!(ledger.get(id).await.unwrap().user_id, Some(admin.id));
}

#[tokio::test]
async fn test_invalid_records_are_rejected() {
    let db = TestDb::new().await.unwrap();
    let (tenant, admin) = tenant_with_user(db.pool(), "acme").await;
    let mut uow = as_user(db.pool(), tenant, &admin).await;
    let mut ledger = AuditLedger::new(&mut uow);

    assert!(matches!(
        ledger.record(AuditRecord::new(" ", "user", admin.id)).await,
        Err(DataError::Invalid(_))
    ));
    let long = "1".repeat(46);
    assert!(matches!(
        ledger
            .record(AuditRecord::new("user.viewed", "user", admin.id).network_address(Some(&long)))
            .await,
        Err(DataError::Invalid(_))
    ));
    // Actor must exist
    assert!(matches!(
        ledger
            .record(AuditRecord::new("user.viewed", "user", admin.id).actor(Uuid::new_v4()))
            .await,
        Err(DataError::Invalid(_))
    ));
    assert_eq!(ledger.count(&AuditFilter::default()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_actor_from_another_tenant_is_rejected() {
    let db = TestDb::new().await.unwrap();
    let (a, alice) = tenant_with_user(db.pool(), "acme").await;
    let (_, bob) = tenant_with_user(db.pool(), "globex").await;

    // Explicit actor
    let mut uow = as_user(db.pool(), a, &alice).await;
    let err = AuditLedger::new(&mut uow)
        .record(AuditRecord::new("document.viewed", "document", Uuid::new_v4()).actor(bob.id))
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Invalid(_)));
    drop(uow);

    // Actor taken from a context that names a foreign user
    let mut uow = UnitOfWork::begin(db.pool(), TenantContext::new(a).with_user(bob.id))
        .await
        .unwrap();
    let err = AuditLedger::new(&mut uow)
        .record(AuditRecord::new("document.viewed", "document", Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Invalid(_)));
    drop(uow);

    assert_eq!(entry_count(db.pool(), a, &alice).await, 0);
}

#[tokio::test]
async fn test_failed_audit_insert_discards_the_mutation() {
    let db = TestDb::new().await.unwrap();
    let (tenant, admin) = tenant_with_user(db.pool(), "acme").await;

    let mut uow = as_user(db.pool(), tenant, &admin).await;
    let carol = UserRepository::new(&mut uow)
        .create(NewUser::new("carol@acme.test"))
        .await
        .unwrap();
    // Longer than the action column; only the database refuses it
    let err = AuditLedger::new(&mut uow)
        .record(AuditRecord::new(&"user.created".repeat(30), "user", carol.id))
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Invalid(_)));
    // The transaction is aborted, so even a commit persists nothing
    let _ = uow.commit().await;

    let mut uow = as_user(db.pool(), tenant, &admin).await;
    let mut users = UserRepository::new(&mut uow);
    assert!(matches!(users.get_any(carol.id).await, Err(DataError::NotFound { .. })));
    assert!(users.find_by_email("carol@acme.test").await.unwrap().is_none());
    drop(uow);
    assert_eq!(entry_count(db.pool(), tenant, &admin).await, 0);
}

#[tokio::test]
async fn test_mutation_and_entry_commit_together() {
    let db = TestDb::new().await.unwrap();
    let (tenant, admin) = tenant_with_user(db.pool(), "acme").await;

    let mut uow = as_user(db.pool(), tenant, &admin).await;
    let carol = UserRepository::new(&mut uow)
        .create(NewUser::new("carol@acme.test"))
        .await
        .unwrap();
    AuditLedger::new(&mut uow)
        .record(AuditRecord::new("user.created", "user", carol.id))
        .await
        .unwrap();
    uow.commit().await.unwrap();

    let mut uow = as_user(db.pool(), tenant, &admin).await;
    assert_eq!(UserRepository::new(&mut uow).get(carol.id).await.unwrap().id, carol.id);
    let entries = AuditLedger::new(&mut uow)
        .list(&AuditFilter::default())
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].resource_id, carol.id);
}

#[tokio::test]
async fn test_export_formats() {
    let db = TestDb::new().await.unwrap();
    let (tenant, admin) = tenant_with_user(db.pool(), "acme").await;
    let mut uow = as_user(db.pool(), tenant, &admin).await;
    let mut ledger = AuditLedger::new(&mut uow);
    ledger
        .record(
            AuditRecord::new("document.created", "document", Uuid::new_v4())
                .agent(Some("Mozilla/5.0 (X11, Linux)")),
        )
        .await
        .unwrap();
    ledger
        .record(AuditRecord::new("user.created", "user", admin.id))
        .await
        .unwrap();

    let csv = ledger
        .export(&AuditFilter::default(), ExportFormat::Csv)
        .await
        .unwrap();
    let lines: Vec<_> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("id,created_at,user_id,action"));
    assert!(csv.contains("\"Mozilla/5.0 (X11, Linux)\""));

    let json = ledger
        .export(&AuditFilter::default(), ExportFormat::Json)
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.as_array().unwrap().len(), 2);
    assert_eq!(parsed[0]["action"], "user.created");
}
