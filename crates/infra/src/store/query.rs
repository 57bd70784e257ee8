//! List query types: filters and pagination.
//!
//! Shared by both store implementations so listings agree on semantics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{DomainError, ProductId};
use stockflow_inventory::{Movement, MovementReason, MovementType};
use stockflow_products::Product;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// 1-based page selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    /// Build from optional query parameters.
    ///
    /// `page` must be >= 1 and `limit` within 1..=100.
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Result<Self, DomainError> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if page < 1 {
            return Err(DomainError::validation("page must be >= 1"));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(DomainError::validation(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    /// Slice an already ordered, fully materialized result set.
    pub fn slice<T>(&self, items: Vec<T>) -> Page<T> {
        let total = items.len() as u64;
        let items = items
            .into_iter()
            .skip(self.offset() as usize)
            .take(self.limit as usize)
            .collect();
        Page::new(items, total, *self)
    }
}

/// One page of results plus the metadata clients need to paginate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Matches across all pages.
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, pagination: Pagination) -> Self {
        let limit = u64::from(pagination.limit.max(1));
        Self {
            items,
            total,
            page: pagination.page,
            page_size: pagination.limit,
            pages: total.div_ceil(limit),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            pages: self.pages,
        }
    }
}

/// Filter criteria for movement listings. All fields are conjunctive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    pub product_id: Option<ProductId>,
    pub movement_type: Option<MovementType>,
    pub reason: Option<MovementReason>,
    /// Case-insensitive substring of `reference`.
    pub reference: Option<String>,
    /// Inclusive lower bound on `performed_at`.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `performed_at`.
    pub to: Option<DateTime<Utc>>,
}

impl MovementFilter {
    pub fn for_product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, m: &Movement) -> bool {
        self.product_id.is_none_or(|p| p == m.product_id)
            && self.movement_type.is_none_or(|t| t == m.movement_type)
            && self.reason.is_none_or(|r| r == m.reason)
            && self.reference.as_deref().is_none_or(|needle| {
                m.reference
                    .as_deref()
                    .is_some_and(|r| contains_ci(r, needle))
            })
            && self.from.is_none_or(|from| m.performed_at >= from)
            && self.to.is_none_or(|to| m.performed_at <= to)
    }
}

/// Filter criteria for product listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFilter {
    pub name: Option<String>,
    pub category: Option<String>,
    pub sku: Option<String>,
    /// `Some(true)`: only products at or below their threshold.
    pub low_stock: Option<bool>,
}

impl ProductFilter {
    pub fn matches(&self, p: &Product) -> bool {
        self.name.as_deref().is_none_or(|n| contains_ci(&p.name, n))
            && self.sku.as_deref().is_none_or(|s| contains_ci(&p.sku, s))
            && self.category.as_deref().is_none_or(|c| {
                p.category.as_deref().is_some_and(|pc| contains_ci(pc, c))
            })
            && self.low_stock.is_none_or(|low| p.is_low_stock() == low)
    }
}

/// Filter criteria for user listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFilter {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl UserFilter {
    pub fn matches(&self, u: &stockflow_auth::User) -> bool {
        self.name.as_deref().is_none_or(|n| contains_ci(&u.name, n))
            && self.email.as_deref().is_none_or(|e| contains_ci(&u.email, e))
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// `%needle%` with LIKE metacharacters escaped, for `ILIKE` binds.
pub(crate) fn like_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}
