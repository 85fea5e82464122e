//! Tenant-scoped repositories
//!
//! Every repository borrows a [`UnitOfWork`], so it can only ever act for
//! the tenant bound to that unit of work. Statements carry the application
//! predicate from [`isolation`]; the row-security policies apply on top.

use pgvector::Vector;
use sqlx::query_as;
use tracing::info;
use uuid::Uuid;

use crate::context::UnitOfWork;
use crate::error::{DataError, DataResult};
use crate::isolation;
use crate::lifecycle::{self, Transition};
use crate::model::{
    Document, DocumentId, DocumentStatus, Entity, NewDocument, NewTenant, NewUser, SoftDelete,
    Tenant, TenantStatus, User, UserId,
};

const INSERT_TENANT_SQL: &str = r#"
    INSERT INTO tenants (id, name, status, encryption_key_ref)
    VALUES ($1, $2, $3, $4)
    RETURNING *
"#;

const INSERT_USER_SQL: &str = r#"
    INSERT INTO users (tenant_id, id, email, external_ref, display_name, role)
    VALUES ($1, $2, $3, $4, $5, $6)
    RETURNING *
"#;

const INSERT_DOCUMENT_SQL: &str = r#"
    INSERT INTO documents (
        tenant_id, id, owner_id, storage_bucket, storage_key, filename,
        content_type, size_bytes, status, metadata, embedding
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    RETURNING *
"#;

/// `SET column = $3` on one live record of the caller's tenant
fn update_live_sql<E: SoftDelete>(column: &str) -> String {
    format!(
        "UPDATE {} SET {column} = $3 WHERE {} AND id = $2 RETURNING *",
        E::TABLE,
        isolation::scoped_live::<E>()
    )
}

/// Live records of the caller's tenant matching `predicate`, oldest first
fn list_live_sql<E: SoftDelete>(predicate: Option<&str>) -> String {
    let extra = predicate.map(|p| format!(" AND {p}")).unwrap_or_default();
    format!(
        "SELECT * FROM {} WHERE {}{extra} ORDER BY created_at, id",
        E::TABLE,
        isolation::scoped_live::<E>()
    )
}

/// The bound tenant's own record
pub struct TenantRepository<'a> {
    uow: &'a mut UnitOfWork,
}

impl<'a> TenantRepository<'a> {
    pub fn new(uow: &'a mut UnitOfWork) -> Self {
        Self { uow }
    }

    /// Create the tenant the unit of work is bound to. The caller picks the
    /// new id up front and begins the unit of work with it, so the insert
    /// passes the tenants policy like any other write.
    pub async fn create(&mut self, new: NewTenant) -> DataResult<Tenant> {
        if new.name.trim().is_empty() {
            return Err(DataError::Invalid("tenant name must not be empty".into()));
        }
        let tenant_id = self.uow.tenant_id();
        let tenant = self
            .uow
            .fetch_one(
                query_as::<_, Tenant>(INSERT_TENANT_SQL)
                    .bind(tenant_id)
                    .bind(&new.name)
                    .bind(new.status.as_str())
                    .bind(&new.encryption_key_ref),
            )
            .await?;
        info!(tenant_id = %tenant.id, name = %tenant.name, "tenant created");
        Ok(tenant)
    }

    /// Current tenant, including a soft-deleted one
    pub async fn current(&mut self) -> DataResult<Tenant> {
        let id = self.uow.tenant_id();
        lifecycle::fetch(self.uow, id).await
    }

    pub async fn set_status(&mut self, status: TenantStatus) -> DataResult<Tenant> {
        let id = self.uow.tenant_id();
        let sql = update_live_sql::<Tenant>("status");
        self.uow
            .fetch_optional(query_as(&sql).bind(id).bind(id).bind(status.as_str()))
            .await?
            .ok_or_else(|| DataError::not_found(Tenant::KIND, id))
    }

    pub async fn rename(&mut self, name: &str) -> DataResult<Tenant> {
        if name.trim().is_empty() {
            return Err(DataError::Invalid("tenant name must not be empty".into()));
        }
        let id = self.uow.tenant_id();
        let sql = update_live_sql::<Tenant>("name");
        self.uow
            .fetch_optional(query_as(&sql).bind(id).bind(id).bind(name))
            .await?
            .ok_or_else(|| DataError::not_found(Tenant::KIND, id))
    }

    /// Fails with `ReferentialRestriction` while live users or documents remain
    pub async fn soft_delete(&mut self) -> DataResult<Transition<Tenant>> {
        let id = self.uow.tenant_id();
        lifecycle::soft_delete(self.uow, id).await
    }

    pub async fn restore(&mut self) -> DataResult<Transition<Tenant>> {
        let id = self.uow.tenant_id();
        lifecycle::restore(self.uow, id).await
    }
}

/// Users of the bound tenant
pub struct UserRepository<'a> {
    uow: &'a mut UnitOfWork,
}

impl<'a> UserRepository<'a> {
    pub fn new(uow: &'a mut UnitOfWork) -> Self {
        Self { uow }
    }

    /// Fails with `Conflict` when an active user of the tenant has the email
    pub async fn create(&mut self, new: NewUser) -> DataResult<User> {
        let tenant_id = new.tenant_id.unwrap_or(self.uow.tenant_id());
        isolation::check_write::<User>(self.uow.context(), tenant_id)?;
        if !new.email.contains('@') {
            return Err(DataError::Invalid(format!("invalid email: {}", new.email)));
        }
        let user = self
            .uow
            .fetch_one(
                query_as::<_, User>(INSERT_USER_SQL)
                    .bind(tenant_id)
                    .bind(Uuid::new_v4())
                    .bind(&new.email)
                    .bind(&new.external_ref)
                    .bind(&new.display_name)
                    .bind(&new.role),
            )
            .await?;
        info!(user_id = %user.id, "user created");
        Ok(user)
    }

    pub async fn get(&mut self, id: UserId) -> DataResult<User> {
        lifecycle::fetch_live(self.uow, id).await
    }

    /// Including soft-deleted users
    pub async fn get_any(&mut self, id: UserId) -> DataResult<User> {
        lifecycle::fetch(self.uow, id).await
    }

    pub async fn list(&mut self) -> DataResult<Vec<User>> {
        let sql = list_live_sql::<User>(None);
        let tenant_id = self.uow.tenant_id();
        self.uow.fetch_all(query_as(&sql).bind(tenant_id)).await
    }

    pub async fn find_by_email(&mut self, email: &str) -> DataResult<Option<User>> {
        let sql = list_live_sql::<User>(Some("email = $2"));
        let tenant_id = self.uow.tenant_id();
        self.uow
            .fetch_optional(query_as(&sql).bind(tenant_id).bind(email))
            .await
    }

    pub async fn find_by_external_ref(&mut self, external_ref: &str) -> DataResult<Option<User>> {
        let sql = list_live_sql::<User>(Some("external_ref = $2"));
        let tenant_id = self.uow.tenant_id();
        self.uow
            .fetch_optional(query_as(&sql).bind(tenant_id).bind(external_ref))
            .await
    }

    pub async fn touch_last_active(&mut self, id: UserId) -> DataResult<User> {
        let sql = format!(
            "UPDATE users SET last_active_at = NOW() WHERE {} AND id = $2 RETURNING *",
            isolation::scoped_live::<User>()
        );
        let tenant_id = self.uow.tenant_id();
        self.uow
            .fetch_optional(query_as(&sql).bind(tenant_id).bind(id))
            .await?
            .ok_or_else(|| DataError::not_found(User::KIND, id))
    }

    pub async fn set_role(&mut self, id: UserId, role: Option<&str>) -> DataResult<User> {
        let sql = update_live_sql::<User>("role");
        let tenant_id = self.uow.tenant_id();
        self.uow
            .fetch_optional(query_as(&sql).bind(tenant_id).bind(id).bind(role))
            .await?
            .ok_or_else(|| DataError::not_found(User::KIND, id))
    }

    /// Fails with `ReferentialRestriction` while the user owns live documents
    pub async fn soft_delete(&mut self, id: UserId) -> DataResult<Transition<User>> {
        lifecycle::soft_delete(self.uow, id).await
    }

    /// Fails with `Conflict` when the email was reclaimed in the meantime
    pub async fn restore(&mut self, id: UserId) -> DataResult<Transition<User>> {
        lifecycle::restore(self.uow, id).await
    }
}

/// Documents of the bound tenant
pub struct DocumentRepository<'a> {
    uow: &'a mut UnitOfWork,
}

impl<'a> DocumentRepository<'a> {
    pub fn new(uow: &'a mut UnitOfWork) -> Self {
        Self { uow }
    }

    /// The owner must be a live user visible to the caller.
    pub async fn create(&mut self, new: NewDocument) -> DataResult<Document> {
        let tenant_id = new.tenant_id.unwrap_or(self.uow.tenant_id());
        isolation::check_write::<Document>(self.uow.context(), tenant_id)?;
        lifecycle::fetch_live::<User>(self.uow, new.owner_id).await?;
        if new.locator.key.is_empty() || new.locator.bucket.is_empty() {
            return Err(DataError::Invalid("storage locator is incomplete".into()));
        }
        let document = self
            .uow
            .fetch_one(
                query_as::<_, Document>(INSERT_DOCUMENT_SQL)
                    .bind(tenant_id)
                    .bind(Uuid::new_v4())
                    .bind(new.owner_id)
                    .bind(&new.locator.bucket)
                    .bind(&new.locator.key)
                    .bind(&new.locator.filename)
                    .bind(&new.content_type)
                    .bind(new.size_bytes)
                    .bind(new.status.as_str())
                    .bind(&new.attributes)
                    .bind(new.embedding.map(Vector::from)),
            )
            .await?;
        info!(document_id = %document.id, owner_id = %document.owner_id, "document created");
        Ok(document)
    }

    pub async fn get(&mut self, id: DocumentId) -> DataResult<Document> {
        lifecycle::fetch_live(self.uow, id).await
    }

    /// Including soft-deleted documents
    pub async fn get_any(&mut self, id: DocumentId) -> DataResult<Document> {
        lifecycle::fetch(self.uow, id).await
    }

    pub async fn list(&mut self) -> DataResult<Vec<Document>> {
        let sql = list_live_sql::<Document>(None);
        let tenant_id = self.uow.tenant_id();
        self.uow.fetch_all(query_as(&sql).bind(tenant_id)).await
    }

    pub async fn list_by_owner(&mut self, owner_id: UserId) -> DataResult<Vec<Document>> {
        let sql = list_live_sql::<Document>(Some("owner_id = $2"));
        let tenant_id = self.uow.tenant_id();
        self.uow
            .fetch_all(query_as(&sql).bind(tenant_id).bind(owner_id))
            .await
    }

    pub async fn set_status(&mut self, id: DocumentId, status: DocumentStatus) -> DataResult<Document> {
        let sql = update_live_sql::<Document>("status");
        let tenant_id = self.uow.tenant_id();
        self.uow
            .fetch_optional(query_as(&sql).bind(tenant_id).bind(id).bind(status.as_str()))
            .await?
            .ok_or_else(|| DataError::not_found(Document::KIND, id))
    }

    /// Set (or with `None`, clear) the embedding; index membership follows.
    pub async fn set_embedding(
        &mut self,
        id: DocumentId,
        embedding: Option<Vec<f32>>,
    ) -> DataResult<Document> {
        let sql = update_live_sql::<Document>("embedding");
        let tenant_id = self.uow.tenant_id();
        self.uow
            .fetch_optional(
                query_as(&sql)
                    .bind(tenant_id)
                    .bind(id)
                    .bind(embedding.map(Vector::from)),
            )
            .await?
            .ok_or_else(|| DataError::not_found(Document::KIND, id))
    }

    pub async fn soft_delete(&mut self, id: DocumentId) -> DataResult<Transition<Document>> {
        lifecycle::soft_delete(self.uow, id).await
    }

    pub async fn restore(&mut self, id: DocumentId) -> DataResult<Transition<Document>> {
        lifecycle::restore(self.uow, id).await
    }
}
