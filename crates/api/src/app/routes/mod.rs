use axum::{Router, routing::get};

pub mod auth;
pub mod inventory;
pub mod products;
pub mod system;
pub mod users;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/auth/me", get(auth::me))
        .nest("/users", users::router())
        .nest("/products", products::router())
        .nest("/inventory", inventory::router())
}
