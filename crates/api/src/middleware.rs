use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;

use stockflow_auth::{JwtValidator, authenticate};

use crate::app::errors::ApiError;
use crate::context::RequestContext;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
}

/// Credential gate: resolve the bearer token into a [`RequestContext`].
///
/// No token is 401 `unauthenticated`; a bad or expired token is 403
/// `invalid_credential`.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let token = extract_bearer(req.headers());

    let identity = match authenticate(state.jwt.as_ref(), token, Utc::now()) {
        Ok(identity) => identity,
        Err(e) => return ApiError::from(e).into_response(),
    };

    req.extensions_mut().insert(RequestContext::new(identity));
    next.run(req).await
}

/// The token of a `Bearer` authorization header, if one is present.
fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}
