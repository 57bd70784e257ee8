use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, rejection::JsonRejection, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};

use stockflow_core::ProductId;
use stockflow_infra::ProductRepository;
use stockflow_products::{NewProduct, ProductPatch, ProductView};

use crate::app::dto::{self, ProductListQuery};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz::{ADMIN_ONLY, require_roles};
use crate::context::RequestContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/sku/:sku", get(get_product_by_sku))
        .route(
            "/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    payload: Result<Json<NewProduct>, JsonRejection>,
) -> Result<Response, ApiError> {
    require_roles(&ctx, ADMIN_ONLY)?;
    let new = dto::body(payload)?;
    let product = services.store().create_product(new, ctx.actor_id()).await?;
    tracing::info!(product_id = %product.id, sku = %product.sku, "product created");
    Ok((StatusCode::CREATED, Json(ProductView::from(product))).into_response())
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    params: Result<Query<ProductListQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let (filter, pagination) = dto::query(params)?.into_parts()?;
    let page = services.store().list_products(&filter, pagination).await?;
    Ok(Json(page.map(ProductView::from)).into_response())
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id: ProductId = dto::parse_id(&id)?;
    let product = services.store().get_product(id).await?;
    Ok(Json(ProductView::from(product)).into_response())
}

pub async fn get_product_by_sku(
    Extension(services): Extension<Arc<AppServices>>,
    Path(sku): Path<String>,
) -> Result<Response, ApiError> {
    let product = services.store().get_product_by_sku(sku.trim()).await?;
    Ok(Json(ProductView::from(product)).into_response())
}

/// Metadata only; stock moves through the inventory routes.
pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    payload: Result<Json<ProductPatch>, JsonRejection>,
) -> Result<Response, ApiError> {
    require_roles(&ctx, ADMIN_ONLY)?;
    let id: ProductId = dto::parse_id(&id)?;
    let patch = dto::body(payload)?;
    let product = services.store().update_product(id, &patch).await?;
    Ok(Json(ProductView::from(product)).into_response())
}

pub async fn delete_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require_roles(&ctx, ADMIN_ONLY)?;
    let id: ProductId = dto::parse_id(&id)?;
    let product = services.store().delete_product(id).await?;
    tracing::info!(product_id = %id, actor_id = %ctx.actor_id(), "product deleted");
    Ok(Json(ProductView::from(product)).into_response())
}
