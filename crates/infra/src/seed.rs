//! Demo data for fresh installations.

use chrono::Utc;

use stockflow_auth::{Role, User, hash_password};
use stockflow_core::UserId;
use stockflow_products::NewProduct;

use crate::store::{ProductRepository, Store, StoreError, UserRepository};

pub const DEMO_PASSWORD: &str = "password123";

struct DemoProduct {
    sku: &'static str,
    name: &'static str,
    description: &'static str,
    category: &'static str,
    price: i64,
    cost_price: i64,
    quantity: i64,
    min_stock_level: i64,
    location: &'static str,
}

const DEMO_PRODUCTS: &[DemoProduct] = &[
    DemoProduct {
        sku: "LAP-DEL-001",
        name: "Dell XPS 13 Laptop",
        description: "High-end laptop with a 13\" display",
        category: "Computers",
        price: 129_999,
        cost_price: 95_000,
        quantity: 15,
        min_stock_level: 5,
        location: "Aisle A-12",
    },
    DemoProduct {
        sku: "MON-LG-001",
        name: "LG 27\" Monitor",
        description: "27 inch 4K monitor",
        category: "Peripherals",
        price: 34_999,
        cost_price: 25_000,
        quantity: 25,
        min_stock_level: 8,
        location: "Aisle B-05",
    },
    DemoProduct {
        sku: "MOUSE-LOG-001",
        name: "Logitech MX Master Mouse",
        description: "Ergonomic wireless mouse",
        category: "Peripherals",
        price: 8_999,
        cost_price: 4_500,
        quantity: 40,
        min_stock_level: 10,
        location: "Aisle B-08",
    },
    DemoProduct {
        sku: "KEY-COR-001",
        name: "Corsair K70 Keyboard",
        description: "RGB mechanical gaming keyboard",
        category: "Peripherals",
        price: 12_999,
        cost_price: 7_500,
        quantity: 20,
        min_stock_level: 7,
        location: "Aisle B-10",
    },
    DemoProduct {
        sku: "HD-SEA-001",
        name: "Seagate 2TB Hard Drive",
        description: "2TB external USB 3.0 hard drive",
        category: "Storage",
        price: 7_999,
        cost_price: 4_000,
        quantity: 30,
        min_stock_level: 10,
        location: "Aisle C-02",
    },
];

/// Seed two demo accounts and five products, unless any user exists.
///
/// Returns whether anything was written.
pub async fn seed_demo_data(store: &dyn Store) -> Result<bool, StoreError> {
    if store.count_users().await? > 0 {
        tracing::info!("users already present; skipping demo seed");
        return Ok(false);
    }

    let admin = create_demo_user(store, "John Doe", "john@example.com", "admin", Role::Admin).await?;
    create_demo_user(store, "Jane Smith", "jane@example.com", "user", Role::User).await?;

    for demo in DEMO_PRODUCTS {
        let product = NewProduct {
            sku: demo.sku.to_string(),
            name: demo.name.to_string(),
            description: Some(demo.description.to_string()),
            category: Some(demo.category.to_string()),
            location: Some(demo.location.to_string()),
            price: demo.price,
            cost_price: demo.cost_price,
            min_stock_level: demo.min_stock_level,
            barcode: None,
            image_url: None,
            initial_quantity: demo.quantity,
        };
        store.create_product(product, admin).await?;
    }

    tracing::info!(products = DEMO_PRODUCTS.len(), "demo data seeded");
    Ok(true)
}

async fn create_demo_user(
    store: &dyn Store,
    name: &str,
    email: &str,
    username: &str,
    role: Role,
) -> Result<UserId, StoreError> {
    let hash = hash_password(DEMO_PASSWORD).map_err(|e| StoreError::Backend(e.to_string()))?;
    let now = Utc::now();
    let user = User {
        id: UserId::new(),
        name: name.to_string(),
        email: email.to_string(),
        username: username.to_string(),
        role,
        created_at: now,
        updated_at: now,
    };
    Ok(store.create_user(user, hash).await?.id)
}
