use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, rejection::JsonRejection, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use stockflow_core::{MovementId, ProductId};
use stockflow_infra::StockLedger;
use stockflow_inventory::{MovementType, NewMovement};

use crate::app::dto::{self, MovementListQuery, PageQuery, StockRequest};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::RequestContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_movements).post(post_movement))
        .route("/stock-in", post(stock_in))
        .route("/stock-out", post(stock_out))
        .route("/product/:product_id", get(movements_for_product))
        .route("/:id", get(get_movement))
}

/// Post a movement attributed to the caller.
pub async fn post_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    payload: Result<Json<NewMovement>, JsonRejection>,
) -> Result<Response, ApiError> {
    let movement = dto::body(payload)?;
    record(&services, &ctx, movement).await
}

pub async fn stock_in(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    payload: Result<Json<StockRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let movement = dto::body(payload)?.into_movement(MovementType::In);
    record(&services, &ctx, movement).await
}

pub async fn stock_out(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    payload: Result<Json<StockRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let movement = dto::body(payload)?.into_movement(MovementType::Out);
    record(&services, &ctx, movement).await
}

async fn record(
    services: &AppServices,
    ctx: &RequestContext,
    movement: NewMovement,
) -> Result<Response, ApiError> {
    let posted = services
        .store()
        .post_movement(movement, ctx.actor_id())
        .await?;
    tracing::info!(
        movement_id = %posted.id,
        product_id = %posted.product_id,
        movement_type = %posted.movement_type,
        quantity = posted.quantity,
        actor_id = %posted.performed_by,
        "movement posted"
    );
    Ok((StatusCode::CREATED, Json(posted)).into_response())
}

pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    params: Result<Query<MovementListQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let (filter, pagination) = dto::query(params)?.into_parts()?;
    let page = services.store().list_movements(&filter, pagination).await?;
    Ok(Json(page).into_response())
}

pub async fn get_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id: MovementId = dto::parse_id(&id)?;
    let movement = services.store().get_movement(id).await?;
    Ok(Json(movement).into_response())
}

pub async fn movements_for_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(product_id): Path<String>,
    params: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let product_id: ProductId = dto::parse_id(&product_id)?;
    let pagination = dto::query(params)?.pagination()?;
    let page = services
        .store()
        .movements_for_product(product_id, pagination)
        .await?;
    Ok(Json(page).into_response())
}
