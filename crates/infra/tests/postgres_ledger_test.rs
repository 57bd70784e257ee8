//! Postgres integration tests. Skipped unless `TEST_DATABASE_URL` is set.
//!
//! Every test uses its own uniquely named users and products, so the suite
//! can run against a shared database without cleanup.

use std::sync::Arc;

use chrono::Utc;
use stockflow_auth::{Role, User, UserPatch};
use stockflow_core::{DomainError, MovementId, ProductId, UserId};
use stockflow_infra::db::{connect, run_migrations};
use stockflow_infra::{
    MovementFilter, Page, Pagination, PostgresStore, ProductFilter, ProductRepository, StockLedger,
    StoreError, UserRepository,
};
use stockflow_inventory::{
    MovementDetails, MovementReason, MovementType, NewMovement, signed_delta,
};
use stockflow_products::{NewProduct, ProductPatch};
use uuid::Uuid;

async fn store() -> Option<Arc<PostgresStore>> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let pool = connect(&url, 16).await.expect("connect to TEST_DATABASE_URL");
    run_migrations(&pool).await.expect("migrations");
    Some(Arc::new(PostgresStore::new(pool)))
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", &Uuid::now_v7().simple().to_string()[20..])
}

async fn user(store: &PostgresStore) -> UserId {
    let now = Utc::now();
    let username = unique("clerk");
    let user = User {
        id: UserId::new(),
        name: "Stock Clerk".to_string(),
        email: format!("{username}@example.com"),
        username,
        role: Role::User,
        created_at: now,
        updated_at: now,
    };
    store.create_user(user, "hash".to_string()).await.unwrap().id
}

fn new_product(initial_quantity: i64) -> NewProduct {
    NewProduct {
        sku: unique("SKU"),
        name: unique("Product"),
        description: None,
        category: Some("Testing".to_string()),
        location: None,
        price: 1000,
        cost_price: 400,
        min_stock_level: 5,
        barcode: None,
        image_url: None,
        initial_quantity,
    }
}

fn movement(product_id: ProductId, t: MovementType, reason: MovementReason, qty: i64) -> NewMovement {
    NewMovement {
        product_id,
        quantity: qty,
        movement_type: t,
        reason,
        reference: Some("INV-TEST".to_string()),
        notes: None,
    }
}

#[tokio::test]
async fn opening_balance_sale_and_refusal() {
    let Some(store) = store().await else { return };
    let actor = user(&store).await;

    let p = store.create_product(new_product(15), actor).await.unwrap();
    assert_eq!(p.quantity, 15);

    store
        .post_movement(movement(p.id, MovementType::Out, MovementReason::Sale, 5), actor)
        .await
        .unwrap();
    assert_eq!(store.get_product(p.id).await.unwrap().quantity, 10);

    let err = store
        .post_movement(movement(p.id, MovementType::Out, MovementReason::Sale, 20), actor)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        StoreError::Domain(DomainError::InsufficientStock {
            available: 10,
            requested: 20
        })
    );

    let history = store
        .movements_for_product(p.id, Pagination::default())
        .await
        .unwrap();
    assert_eq!(history.total, 2);
    assert_eq!(history.items[0].movement.reason, MovementReason::Sale);
    assert_eq!(history.items[0].product_sku, p.sku);
    assert_eq!(history.items[0].performed_by_name.as_deref(), Some("Stock Clerk"));
}

#[tokio::test]
async fn concurrent_outbound_postings_serialize_on_the_product() {
    let Some(store) = store().await else { return };
    let actor = user(&store).await;
    let p = store.create_product(new_product(10), actor).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .post_movement(movement(p.id, MovementType::Out, MovementReason::Sale, 3), actor)
                .await
        }));
    }

    let mut accepted = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(StoreError::Domain(DomainError::InsufficientStock { requested: 3, .. })) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(accepted, 3);

    let product = store.get_product(p.id).await.unwrap();
    assert_eq!(product.quantity, 1);

    let log = store
        .list_movements(&MovementFilter::for_product(p.id), Pagination::default())
        .await
        .unwrap();
    let sum: i64 = log
        .items
        .iter()
        .map(|d| signed_delta(d.movement.movement_type, d.movement.quantity))
        .sum();
    assert_eq!(sum, product.quantity);
}

#[tokio::test]
async fn unique_and_reference_constraints() {
    let Some(store) = store().await else { return };
    let actor = user(&store).await;

    let used = store.create_product(new_product(1), actor).await.unwrap();
    let mut dup = new_product(0);
    dup.sku = used.sku.clone();
    assert!(matches!(
        store.create_product(dup, actor).await,
        Err(StoreError::Domain(DomainError::Conflict(_)))
    ));

    assert!(matches!(
        store.delete_product(used.id).await,
        Err(StoreError::Domain(DomainError::Conflict(_)))
    ));
    assert!(matches!(
        store.delete_user(actor).await,
        Err(StoreError::Domain(DomainError::Conflict(_)))
    ));

    let unused = store.create_product(new_product(0), actor).await.unwrap();
    store.delete_product(unused.id).await.unwrap();
    assert!(matches!(
        store.get_product(unused.id).await,
        Err(StoreError::Domain(DomainError::NotFound(_)))
    ));
}

#[tokio::test]
async fn metadata_updates_never_touch_quantity() {
    let Some(store) = store().await else { return };
    let actor = user(&store).await;
    let p = store.create_product(new_product(7), actor).await.unwrap();

    let patch = ProductPatch {
        name: Some("Renamed".to_string()),
        min_stock_level: Some(10),
        ..Default::default()
    };
    let updated = store.update_product(p.id, &patch).await.unwrap();
    assert_eq!(updated.name, "Renamed");
    assert_eq!(updated.quantity, 7);
    assert!(updated.is_low_stock());

    let low = store
        .list_products(
            &ProductFilter {
                sku: Some(p.sku.clone()),
                low_stock: Some(true),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(low.total, 1);
}

#[tokio::test]
async fn user_updates_and_credentials() {
    let Some(store) = store().await else { return };
    let id = user(&store).await;
    let before = store.get_user(id).await.unwrap();

    let patch = UserPatch {
        role: Some(Role::Admin),
        ..Default::default()
    };
    let updated = store
        .update_user(id, &patch, Some("new-hash".to_string()))
        .await
        .unwrap();
    assert_eq!(updated.role, Role::Admin);

    let creds = store
        .find_credentials(&before.username)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(creds.password_hash, "new-hash");
    assert!(store.find_credentials(&unique("nobody")).await.unwrap().is_none());
}

#[tokio::test]
async fn movement_filters_and_pages() {
    let Some(store) = store().await else { return };
    let actor = user(&store).await;
    let p = store.create_product(new_product(10), actor).await.unwrap();

    let mut posted = Vec::new();
    for (t, reason, qty, reference) in [
        (MovementType::In, MovementReason::Purchase, 5, Some("PO-100%")),
        (MovementType::Out, MovementReason::Sale, 3, Some("so-7")),
        (MovementType::Out, MovementReason::Damaged, 1, Some("po-1000")),
        (MovementType::In, MovementReason::Return, 2, None),
    ] {
        let m = NewMovement {
            reference: reference.map(str::to_string),
            ..movement(p.id, t, reason, qty)
        };
        posted.push(store.post_movement(m, actor).await.unwrap());
    }
    let (m1, m2, m3) = (&posted[0], &posted[1], &posted[2]);

    let product_id = p.id;
    let list = |filter: MovementFilter, pagination: Pagination| {
        let store = store.clone();
        async move {
            store
                .list_movements(&MovementFilter { product_id: Some(product_id), ..filter }, pagination)
                .await
                .unwrap()
        }
    };
    let ids = |page: &Page<MovementDetails>| -> Vec<MovementId> {
        page.items.iter().map(|d| d.movement.id).collect()
    };

    let outs = list(
        MovementFilter { movement_type: Some(MovementType::Out), ..Default::default() },
        Pagination::default(),
    )
    .await;
    assert_eq!(ids(&outs), [m3.id, m2.id]);

    let sales = list(
        MovementFilter { reason: Some(MovementReason::Sale), ..Default::default() },
        Pagination::default(),
    )
    .await;
    assert_eq!(ids(&sales), [m2.id]);

    let po = list(
        MovementFilter { reference: Some("po-100".to_string()), ..Default::default() },
        Pagination::default(),
    )
    .await;
    assert_eq!(ids(&po), [m3.id, m1.id]);

    let percent = list(
        MovementFilter { reference: Some("100%".to_string()), ..Default::default() },
        Pagination::default(),
    )
    .await;
    assert_eq!(ids(&percent), [m1.id]);

    let window = list(
        MovementFilter {
            from: Some(m2.performed_at),
            to: Some(m3.performed_at),
            ..Default::default()
        },
        Pagination::default(),
    )
    .await;
    let window_ids = ids(&window);
    assert!(window_ids.contains(&m2.id) && window_ids.contains(&m3.id));
    for d in &window.items {
        let at = d.movement.performed_at;
        assert!(at >= m2.performed_at && at <= m3.performed_at);
    }

    let last = list(MovementFilter::default(), Pagination::new(Some(3), Some(2)).unwrap()).await;
    assert_eq!(last.total, 5);
    assert_eq!(last.pages, 3);
    assert_eq!(last.items.len(), 1);
    assert_eq!(last.items[0].movement.reference.as_deref(), Some("opening-balance"));
}

#[tokio::test]
async fn over_wide_input_is_a_validation_error_not_a_backend_failure() {
    let Some(store) = store().await else { return };
    let actor = user(&store).await;
    let p = store.create_product(new_product(1), actor).await.unwrap();

    let wide_reference = NewMovement {
        reference: Some("r".repeat(300)),
        ..movement(p.id, MovementType::In, MovementReason::Purchase, 1)
    };
    assert!(matches!(
        store.post_movement(wide_reference, actor).await,
        Err(StoreError::Domain(DomainError::Validation(_)))
    ));
    assert_eq!(store.get_product(p.id).await.unwrap().quantity, 1);

    let mut wide_category = new_product(0);
    wide_category.category = Some("c".repeat(150));
    assert!(matches!(
        store.create_product(wide_category, actor).await,
        Err(StoreError::Domain(DomainError::Validation(_)))
    ));

    let now = Utc::now();
    let wide_user = User {
        id: UserId::new(),
        name: "Wide Username".to_string(),
        email: format!("{}@example.com", unique("wide")),
        username: "u".repeat(130),
        role: Role::User,
        created_at: now,
        updated_at: now,
    };
    assert!(matches!(
        store.create_user(wide_user, "hash".to_string()).await,
        Err(StoreError::Domain(DomainError::Validation(_)))
    ));
}

#[tokio::test]
async fn user_update_trims_the_name() {
    let Some(store) = store().await else { return };
    let id = user(&store).await;
    let email = format!("{}@example.com", unique("trim"));

    let patch = UserPatch {
        name: Some("  Renamed Clerk  ".to_string()),
        email: Some(email.clone()),
        ..Default::default()
    };
    let updated = store.update_user(id, &patch, None).await.unwrap();
    assert_eq!(updated.name, "Renamed Clerk");
    assert_eq!(updated.email, email);
}
