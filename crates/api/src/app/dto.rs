use std::str::FromStr;

use axum::Json;
use axum::extract::Query;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_auth::{IssuedToken, User};
use stockflow_core::{DomainError, ProductId};
use stockflow_infra::{MovementFilter, Pagination, ProductFilter, UserFilter};
use stockflow_inventory::{MovementReason, MovementType, NewMovement};

use crate::app::errors::ApiError;

// -------------------------
// Extraction helpers
// -------------------------

/// Malformed JSON bodies are validation errors, reported in the usual shape.
pub fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| DomainError::validation(e.body_text()).into())
}

pub fn query<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    params
        .map(|Query(v)| v)
        .map_err(|e| DomainError::validation(e.body_text()).into())
}

pub fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse().map_err(ApiError::from)
}

// -------------------------
// Request DTOs
// -------------------------

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl core::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Body of the stock-in / stock-out shortcuts; the route fixes `type`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StockRequest {
    pub product_id: ProductId,
    pub quantity: i64,
    pub reason: MovementReason,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl StockRequest {
    pub fn into_movement(self, movement_type: MovementType) -> NewMovement {
        NewMovement {
            product_id: self.product_id,
            quantity: self.quantity,
            movement_type,
            reason: self.reason,
            reference: self.reference,
            notes: self.notes,
        }
    }
}

// -------------------------
// Query DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub name: Option<String>,
    pub email: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl UserListQuery {
    pub fn into_parts(self) -> Result<(UserFilter, Pagination), ApiError> {
        let pagination = Pagination::new(self.page, self.limit)?;
        Ok((
            UserFilter {
                name: non_blank(self.name),
                email: non_blank(self.email),
            },
            pagination,
        ))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductListQuery {
    pub name: Option<String>,
    pub category: Option<String>,
    pub sku: Option<String>,
    pub low_stock: Option<bool>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ProductListQuery {
    pub fn into_parts(self) -> Result<(ProductFilter, Pagination), ApiError> {
        let pagination = Pagination::new(self.page, self.limit)?;
        Ok((
            ProductFilter {
                name: non_blank(self.name),
                category: non_blank(self.category),
                sku: non_blank(self.sku),
                low_stock: self.low_stock,
            },
            pagination,
        ))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MovementListQuery {
    pub product_id: Option<ProductId>,
    #[serde(rename = "type")]
    pub movement_type: Option<MovementType>,
    pub reason: Option<MovementReason>,
    pub reference: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl MovementListQuery {
    pub fn into_parts(self) -> Result<(MovementFilter, Pagination), ApiError> {
        let pagination = Pagination::new(self.page, self.limit)?;
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(DomainError::validation("'from' must not be after 'to'").into());
            }
        }
        Ok((
            MovementFilter {
                product_id: self.product_id,
                movement_type: self.movement_type,
                reason: self.reason,
                reference: non_blank(self.reference),
                from: self.from,
                to: self.to,
            },
            pagination,
        ))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn pagination(&self) -> Result<Pagination, ApiError> {
        Ok(Pagination::new(self.page, self.limit)?)
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

impl LoginResponse {
    pub fn new(issued: IssuedToken, user: User) -> Self {
        Self {
            token: issued.token,
            expires_at: issued.expires_at,
            user,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UsernameAvailability {
    pub username: String,
    pub available: bool,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
