use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use stockflow_auth::NewUser;
use stockflow_infra::UserRepository;

use crate::app::dto::{self, LoginRequest, RegisterRequest, UsernameAvailability};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::RequestContext;

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = dto::body(payload)?;
    let session = services.login(body.username.trim(), &body.password).await?;
    Ok((StatusCode::OK, Json(session)).into_response())
}

/// Self-service sign-up; always creates a `user`.
pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = dto::body(payload)?;
    let new = NewUser::registration(body.name, body.email, body.username, body.password);
    let user = services.create_user(new).await?;
    Ok((StatusCode::CREATED, Json(user)).into_response())
}

/// Whether a username is still free, for sign-up forms. Reveals nothing
/// beyond what a conflicting registration would.
pub async fn check_user(
    Extension(services): Extension<Arc<AppServices>>,
    Path(username): Path<String>,
) -> Result<Response, ApiError> {
    let username = username.trim().to_string();
    let taken = services.store().find_credentials(&username).await?.is_some();
    Ok(Json(UsernameAvailability {
        username,
        available: !taken,
    })
    .into_response())
}

/// The caller's own record. A deleted account reads as not found even while
/// its token is still valid.
pub async fn me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Response, ApiError> {
    let user = services.store().get_user(ctx.actor_id()).await?;
    Ok(Json(user).into_response())
}
