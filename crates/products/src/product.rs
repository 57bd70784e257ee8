use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{DomainError, DomainResult, ProductId, UserId};

const SKU_LEN: core::ops::RangeInclusive<usize> = 3..=50;
const NAME_LEN: core::ops::RangeInclusive<usize> = 2..=255;
/// Column width of `category`, `location` and `barcode`.
pub const MAX_LABEL_LEN: usize = 100;

/// A catalog product as stored.
///
/// Monetary amounts are in the smallest currency unit (e.g. cents).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub price: i64,
    pub cost_price: i64,
    /// Authoritative on-hand count. Written only by the stock ledger.
    pub quantity: i64,
    pub min_stock_level: i64,
    pub barcode: Option<String>,
    pub image_url: Option<String>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Read-side flag only; never enforced.
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.min_stock_level
    }
}

/// Outward representation: the product plus its derived `low_stock` flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub low_stock: bool,
}

impl From<Product> for ProductView {
    fn from(product: Product) -> Self {
        let low_stock = product.is_low_stock();
        Self { product, low_stock }
    }
}

/// Input for creating a product.
///
/// There is no `quantity` field: stock starts at zero and an optional
/// `initial_quantity` is booked as an opening-balance movement.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub price: i64,
    #[serde(default)]
    pub cost_price: i64,
    #[serde(default)]
    pub min_stock_level: i64,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub initial_quantity: i64,
}

impl NewProduct {
    pub fn validate(&self) -> DomainResult<()> {
        validate_len("sku", &self.sku, SKU_LEN)?;
        if self.sku.trim().chars().any(char::is_whitespace) {
            return Err(DomainError::validation("sku must not contain whitespace"));
        }
        validate_len("name", &self.name, NAME_LEN)?;
        non_negative("price", self.price)?;
        non_negative("cost_price", self.cost_price)?;
        non_negative("min_stock_level", self.min_stock_level)?;
        non_negative("initial_quantity", self.initial_quantity)?;
        if let Some(barcode) = &self.barcode {
            non_blank("barcode", barcode)?;
        }
        max_len("category", self.category.as_deref(), MAX_LABEL_LEN)?;
        max_len("location", self.location.as_deref(), MAX_LABEL_LEN)?;
        max_len("barcode", self.barcode.as_deref(), MAX_LABEL_LEN)?;
        Ok(())
    }

    /// Materialize the stored record with zero stock.
    ///
    /// Text fields are trimmed; blank optional text becomes `None`.
    pub fn into_product(
        self,
        id: ProductId,
        created_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Product {
        Product {
            id,
            sku: self.sku.trim().to_string(),
            name: self.name.trim().to_string(),
            description: optional_text(self.description),
            category: optional_text(self.category),
            location: optional_text(self.location),
            price: self.price,
            cost_price: self.cost_price,
            quantity: 0,
            min_stock_level: self.min_stock_level,
            barcode: optional_text(self.barcode),
            image_url: optional_text(self.image_url),
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Allow-listed product update.
///
/// `id`, `sku`, `quantity` and timestamps are not representable; unknown
/// fields are rejected at deserialization. For optional text fields an empty
/// string clears the value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub price: Option<i64>,
    pub cost_price: Option<i64>,
    pub min_stock_level: Option<i64>,
    pub barcode: Option<String>,
    pub image_url: Option<String>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.is_empty() {
            return Err(DomainError::validation("no fields to update"));
        }
        if let Some(name) = &self.name {
            validate_len("name", name, NAME_LEN)?;
        }
        if let Some(price) = self.price {
            non_negative("price", price)?;
        }
        if let Some(cost_price) = self.cost_price {
            non_negative("cost_price", cost_price)?;
        }
        if let Some(min) = self.min_stock_level {
            non_negative("min_stock_level", min)?;
        }
        max_len("category", self.category.as_deref(), MAX_LABEL_LEN)?;
        max_len("location", self.location.as_deref(), MAX_LABEL_LEN)?;
        max_len("barcode", self.barcode.as_deref(), MAX_LABEL_LEN)?;
        Ok(())
    }

    pub fn apply_to(&self, product: &mut Product, now: DateTime<Utc>) {
        if let Some(name) = &self.name {
            product.name = name.trim().to_string();
        }
        if let Some(v) = &self.description {
            product.description = optional_text(Some(v.clone()));
        }
        if let Some(v) = &self.category {
            product.category = optional_text(Some(v.clone()));
        }
        if let Some(v) = &self.location {
            product.location = optional_text(Some(v.clone()));
        }
        if let Some(v) = self.price {
            product.price = v;
        }
        if let Some(v) = self.cost_price {
            product.cost_price = v;
        }
        if let Some(v) = self.min_stock_level {
            product.min_stock_level = v;
        }
        if let Some(v) = &self.barcode {
            product.barcode = optional_text(Some(v.clone()));
        }
        if let Some(v) = &self.image_url {
            product.image_url = optional_text(Some(v.clone()));
        }
        product.updated_at = now;
    }
}

fn validate_len(
    field: &str,
    value: &str,
    range: core::ops::RangeInclusive<usize>,
) -> DomainResult<()> {
    let len = value.trim().chars().count();
    if !range.contains(&len) {
        return Err(DomainError::validation(format!(
            "{field} must be between {} and {} characters",
            range.start(),
            range.end()
        )));
    }
    Ok(())
}

/// Upper bound on trimmed length; `None` always passes.
fn max_len(field: &str, value: Option<&str>, max: usize) -> DomainResult<()> {
    match value {
        Some(v) if v.trim().chars().count() > max => Err(DomainError::validation(format!(
            "{field} must be at most {max} characters"
        ))),
        _ => Ok(()),
    }
}

fn non_negative(field: &str, value: i64) -> DomainResult<()> {
    if value < 0 {
        return Err(DomainError::validation(format!("{field} must be >= 0")));
    }
    Ok(())
}

fn non_blank(field: &str, value: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} must not be blank")));
    }
    Ok(())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn new_product() -> NewProduct {
        NewProduct {
            sku: "LAP-DEL-001".to_string(),
            name: "Dell XPS 13".to_string(),
            description: Some("  13-inch laptop ".to_string()),
            category: Some("Electronics".to_string()),
            location: Some(String::new()),
            price: 129_999,
            cost_price: 95_000,
            min_stock_level: 5,
            barcode: None,
            image_url: None,
            initial_quantity: 15,
        }
    }

    #[test]
    fn valid_product_passes() {
        assert_eq!(new_product().validate(), Ok(()));
    }

    #[test]
    fn rejects_negative_money_and_levels() {
        let mut p = new_product();
        p.price = -1;
        assert!(matches!(p.validate(), Err(DomainError::Validation(_))));

        let mut p = new_product();
        p.min_stock_level = -5;
        assert!(matches!(p.validate(), Err(DomainError::Validation(_))));

        let mut p = new_product();
        p.initial_quantity = -1;
        assert!(matches!(p.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn rejects_short_sku_and_name() {
        let mut p = new_product();
        p.sku = "AB".to_string();
        assert!(p.validate().is_err());

        let mut p = new_product();
        p.name = "X".to_string();
        assert!(p.validate().is_err());
    }

    #[test]
    fn rejects_labels_wider_than_their_columns() {
        let mut p = new_product();
        p.category = Some("c".repeat(MAX_LABEL_LEN + 1));
        assert!(matches!(p.validate(), Err(DomainError::Validation(_))));

        let mut p = new_product();
        p.barcode = Some("9".repeat(MAX_LABEL_LEN + 1));
        assert!(matches!(p.validate(), Err(DomainError::Validation(_))));

        // surrounding whitespace is trimmed before storage
        let mut p = new_product();
        p.location = Some(format!("  {}  ", "l".repeat(MAX_LABEL_LEN)));
        assert_eq!(p.validate(), Ok(()));

        let patch = ProductPatch {
            location: Some("l".repeat(MAX_LABEL_LEN + 1)),
            ..Default::default()
        };
        assert!(matches!(patch.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn into_product_starts_at_zero_and_normalizes_text() {
        let p = new_product().into_product(ProductId::new(), None, test_time());
        assert_eq!(p.quantity, 0);
        assert_eq!(p.description.as_deref(), Some("13-inch laptop"));
        assert_eq!(p.location, None);
    }

    #[test]
    fn low_stock_is_inclusive_of_threshold() {
        let mut p = new_product().into_product(ProductId::new(), None, test_time());
        p.quantity = 5;
        assert!(ProductView::from(p.clone()).low_stock);
        p.quantity = 6;
        assert!(!ProductView::from(p).low_stock);
    }

    #[test]
    fn view_serializes_flat_with_flag() {
        let p = new_product().into_product(ProductId::new(), None, test_time());
        let json = serde_json::to_value(ProductView::from(p)).unwrap();
        assert_eq!(json["sku"], "LAP-DEL-001");
        assert_eq!(json["quantity"], 0);
        assert_eq!(json["low_stock"], true);
    }

    #[test]
    fn create_payload_cannot_set_quantity() {
        let body = r#"{"sku":"ABC-1","name":"Widget","quantity":100}"#;
        assert!(serde_json::from_str::<NewProduct>(body).is_err());
    }

    #[test]
    fn patch_cannot_touch_sku_or_quantity() {
        assert!(serde_json::from_str::<ProductPatch>(r#"{"sku":"NEW"}"#).is_err());
        assert!(serde_json::from_str::<ProductPatch>(r#"{"quantity":1}"#).is_err());
        assert!(serde_json::from_str::<ProductPatch>(r#"{"id":"x"}"#).is_err());
    }

    #[test]
    fn patch_applies_only_supplied_fields() {
        let created = test_time();
        let mut p = new_product().into_product(ProductId::new(), None, created);
        let later = created + chrono::Duration::seconds(1);

        let patch = ProductPatch {
            price: Some(100),
            category: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(patch.validate(), Ok(()));
        patch.apply_to(&mut p, later);

        assert_eq!(p.price, 100);
        assert_eq!(p.category, None);
        assert_eq!(p.name, "Dell XPS 13");
        assert_eq!(p.quantity, 0);
        assert_eq!(p.updated_at, later);
        assert_eq!(p.created_at, created);
    }

    #[test]
    fn empty_patch_is_rejected() {
        assert!(ProductPatch::default().validate().is_err());
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Property: any SKU of 3..=50 non-space characters is accepted.
            #[test]
            fn sku_length_window_is_accepted(sku in "[A-Z0-9-]{3,50}") {
                let mut p = new_product();
                p.sku = sku;
                prop_assert!(p.validate().is_ok());
            }

            /// Property: SKUs longer than 50 characters are rejected.
            #[test]
            fn long_sku_is_rejected(sku in "[A-Z0-9]{51,80}") {
                let mut p = new_product();
                p.sku = sku;
                prop_assert!(p.validate().is_err());
            }

            /// Property: low_stock agrees with the threshold comparison.
            #[test]
            fn low_stock_matches_threshold(qty in 0i64..1000, min in 0i64..1000) {
                let mut p = new_product().into_product(ProductId::new(), None, test_time());
                p.quantity = qty;
                p.min_stock_level = min;
                prop_assert_eq!(ProductView::from(p).low_stock, qty <= min);
            }
        }
    }
}
