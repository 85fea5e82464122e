//! Shared fixtures for integration tests

#![allow(dead_code)]

use docvault_store::testing::TestDb;
use docvault_tenant::{
    NewTenant, NewUser, TenantContext, TenantId, TenantRepository, UnitOfWork, User,
    UserRepository, EMBEDDING_DIMENSIONS,
};
use sqlx::PgPool;
use uuid::Uuid;

pub async fn db() -> TestDb {
    TestDb::new().await.expect("test database")
}

/// `head` padded with zeros to the column dimension
pub fn embedding(head: &[f32]) -> Vec<f32> {
    let mut v = vec![0.0; EMBEDDING_DIMENSIONS];
    v[..head.len()].copy_from_slice(head);
    v
}

pub async fn begin(pool: &PgPool, tenant_id: TenantId) -> UnitOfWork {
    UnitOfWork::begin(pool, TenantContext::new(tenant_id))
        .await
        .expect("unit of work")
}

pub async fn provision(pool: &PgPool, name: &str) -> TenantId {
    let mut uow = begin(pool, Uuid::new_v4()).await;
    let id = TenantRepository::new(&mut uow)
        .create(NewTenant::new(name))
        .await
        .expect("tenant created")
        .id;
    uow.commit().await.expect("commit");
    id
}

pub async fn add_user(pool: &PgPool, tenant_id: TenantId, email: &str) -> User {
    let mut uow = begin(pool, tenant_id).await;
    let user = UserRepository::new(&mut uow)
        .create(NewUser::new(email))
        .await
        .expect("user created");
    uow.commit().await.expect("commit");
    user
}
