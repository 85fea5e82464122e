//! Document endpoints, including similarity search

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use docvault_tenant::{
    similar, Document, DocumentRepository, DocumentStatus, NewDocument, SimilarDocument,
    SimilarityQuery, Transition,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::{audit, begin, Params, PathParam, Payload};
use crate::error::{ApiError, ApiResult};
use crate::middleware::context::{Caller, ClientInfo};
use crate::AppState;

const MAX_K: usize = 100;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_documents).post(create_document))
        .route("/search", post(search_documents))
        .route("/:id", get(get_document).delete(delete_document))
        .route("/:id/restore", post(restore_document))
        .route("/:id/status", put(set_status))
        .route("/:id/embedding", put(set_embedding))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub owner_id: Option<Uuid>,
}

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Params(params): Params<ListParams>,
) -> ApiResult<Json<Vec<Document>>> {
    let mut uow = begin(&state, caller).await?;
    let mut documents = DocumentRepository::new(&mut uow);
    let found = match params.owner_id {
        Some(owner_id) => documents.list_by_owner(owner_id).await?,
        None => documents.list().await?,
    };
    Ok(Json(found))
}

pub async fn create_document(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    client: ClientInfo,
    Payload(new): Payload<NewDocument>,
) -> ApiResult<(StatusCode, Json<Document>)> {
    let mut uow = begin(&state, caller).await?;
    let document = DocumentRepository::new(&mut uow).create(new).await?;
    audit(
        &mut uow,
        &client,
        "document.created",
        "document",
        document.id,
        json!({"owner_id": document.owner_id, "content_type": document.content_type}),
    )
    .await?;
    uow.commit().await?;
    Ok((StatusCode::CREATED, Json(document)))
}

pub async fn get_document(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Json<Document>> {
    let mut uow = begin(&state, caller).await?;
    Ok(Json(DocumentRepository::new(&mut uow).get(id).await?))
}

pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    client: ClientInfo,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Json<Transition<Document>>> {
    let mut uow = begin(&state, caller).await?;
    let transition = DocumentRepository::new(&mut uow).soft_delete(id).await?;
    if transition.changed {
        audit(&mut uow, &client, "document.deleted", "document", id, json!({})).await?;
    }
    uow.commit().await?;
    Ok(Json(transition))
}

pub async fn restore_document(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    client: ClientInfo,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Json<Transition<Document>>> {
    let mut uow = begin(&state, caller).await?;
    let transition = DocumentRepository::new(&mut uow).restore(id).await?;
    if transition.changed {
        audit(&mut uow, &client, "document.restored", "document", id, json!({})).await?;
    }
    uow.commit().await?;
    Ok(Json(transition))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: DocumentStatus,
}

pub async fn set_status(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    client: ClientInfo,
    PathParam(id): PathParam<Uuid>,
    Payload(update): Payload<StatusUpdate>,
) -> ApiResult<Json<Document>> {
    let mut uow = begin(&state, caller).await?;
    let document = DocumentRepository::new(&mut uow)
        .set_status(id, update.status)
        .await?;
    audit(
        &mut uow,
        &client,
        "document.status_changed",
        "document",
        id,
        json!({"status": update.status}),
    )
    .await?;
    uow.commit().await?;
    Ok(Json(document))
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingUpdate {
    /// `null` clears the embedding
    pub embedding: Option<Vec<f32>>,
}

pub async fn set_embedding(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    client: ClientInfo,
    PathParam(id): PathParam<Uuid>,
    Payload(update): Payload<EmbeddingUpdate>,
) -> ApiResult<Json<Document>> {
    let action = if update.embedding.is_some() {
        "document.embedding_set"
    } else {
        "document.embedding_cleared"
    };
    let mut uow = begin(&state, caller).await?;
    let document = DocumentRepository::new(&mut uow)
        .set_embedding(id, update.embedding)
        .await?;
    audit(&mut uow, &client, action, "document", id, json!({})).await?;
    uow.commit().await?;
    Ok(Json(document))
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub min_similarity: Option<f32>,
    /// Per-request index search breadth; the configured default otherwise
    #[serde(default)]
    pub ef_search: Option<u32>,
}

pub async fn search_documents(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Payload(request): Payload<SearchRequest>,
) -> ApiResult<Json<Vec<SimilarDocument>>> {
    let k = request.k.unwrap_or(10);
    if k == 0 || k > MAX_K {
        return Err(ApiError::Validation(format!("k must be between 1 and {MAX_K}")));
    }
    if request
        .min_similarity
        .is_some_and(|s| !(-1.0..=1.0).contains(&s))
    {
        return Err(ApiError::Validation("min_similarity must be between -1 and 1".into()));
    }
    let mut query = SimilarityQuery::new(request.embedding, k);
    query.min_similarity = request.min_similarity;

    let mut uow = begin(&state, caller).await?;
    uow.set_ef_search(request.ef_search.unwrap_or(state.settings.ef_search))
        .await?;
    Ok(Json(similar(&mut uow, &query).await?))
}
