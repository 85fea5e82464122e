//! User endpoints

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use docvault_tenant::{NewUser, Transition, User, UserRepository};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::{audit, begin, Params, PathParam, Payload};
use crate::error::ApiResult;
use crate::middleware::context::{Caller, ClientInfo};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:id", get(get_user).delete(delete_user))
        .route("/:id/restore", post(restore_user))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub email: Option<String>,
    pub external_ref: Option<String>,
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Params(params): Params<ListParams>,
) -> ApiResult<Json<Vec<User>>> {
    let mut uow = begin(&state, caller).await?;
    let mut users = UserRepository::new(&mut uow);
    let found = match (params.email, params.external_ref) {
        (Some(email), _) => users.find_by_email(&email).await?.into_iter().collect(),
        (None, Some(external_ref)) => users
            .find_by_external_ref(&external_ref)
            .await?
            .into_iter()
            .collect(),
        (None, None) => users.list().await?,
    };
    Ok(Json(found))
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    client: ClientInfo,
    Payload(new): Payload<NewUser>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let mut uow = begin(&state, caller).await?;
    let user = UserRepository::new(&mut uow).create(new).await?;
    audit(&mut uow, &client, "user.created", "user", user.id, json!({})).await?;
    uow.commit().await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Json<User>> {
    let mut uow = begin(&state, caller).await?;
    Ok(Json(UserRepository::new(&mut uow).get(id).await?))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    client: ClientInfo,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Json<Transition<User>>> {
    let mut uow = begin(&state, caller).await?;
    let transition = UserRepository::new(&mut uow).soft_delete(id).await?;
    if transition.changed {
        audit(&mut uow, &client, "user.deleted", "user", id, json!({})).await?;
    }
    uow.commit().await?;
    Ok(Json(transition))
}

pub async fn restore_user(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    client: ClientInfo,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Json<Transition<User>>> {
    let mut uow = begin(&state, caller).await?;
    let transition = UserRepository::new(&mut uow).restore(id).await?;
    if transition.changed {
        audit(&mut uow, &client, "user.restored", "user", id, json!({})).await?;
    }
    uow.commit().await?;
    Ok(Json(transition))
}
