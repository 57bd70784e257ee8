use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, rejection::JsonRejection, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};

use stockflow_auth::{NewUser, UserPatch, can_view_user};
use stockflow_core::UserId;
use stockflow_infra::UserRepository;

use crate::app::dto::{self, UserListQuery};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz::{ADMIN_ONLY, require_roles};
use crate::context::RequestContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    params: Result<Query<UserListQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    require_roles(&ctx, ADMIN_ONLY)?;
    let (filter, pagination) = dto::query(params)?.into_parts()?;
    let page = services.store().list_users(&filter, pagination).await?;
    Ok(Json(page).into_response())
}

/// Admin-only; unlike registration the role may be chosen.
pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> Result<Response, ApiError> {
    require_roles(&ctx, ADMIN_ONLY)?;
    let new = dto::body(payload)?;
    let user = services.create_user(new).await?;
    Ok((StatusCode::CREATED, Json(user)).into_response())
}

pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id: UserId = dto::parse_id(&id)?;
    can_view_user(ctx.identity(), id)?;
    let user = services.store().get_user(id).await?;
    Ok(Json(user).into_response())
}

pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    payload: Result<Json<UserPatch>, JsonRejection>,
) -> Result<Response, ApiError> {
    let id: UserId = dto::parse_id(&id)?;
    let patch = dto::body(payload)?;
    let user = services.update_user(&ctx, id, patch).await?;
    Ok(Json(user).into_response())
}

pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require_roles(&ctx, ADMIN_ONLY)?;
    let id: UserId = dto::parse_id(&id)?;
    let user = services.store().delete_user(id).await?;
    tracing::info!(user_id = %id, actor_id = %ctx.actor_id(), "user deleted");
    Ok(Json(user).into_response())
}
