use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use stockflow_infra::Store;

use crate::app::errors::json_error;
use crate::app::services::AppServices;
use crate::context::RequestContext;

/// 200 while the backing store answers, 503 otherwise.
pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.store().health_check().await {
        Ok(()) => Json(json!({ "status": "ok" })).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed");
            json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
                "store is not reachable",
            )
        }
    }
}

/// The identity resolved from the caller's token, without a store lookup.
pub async fn whoami(Extension(ctx): Extension<RequestContext>) -> impl IntoResponse {
    Json(ctx.identity().clone())
}
