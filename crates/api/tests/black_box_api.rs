use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

use stockflow_api::app::{AppServices, build_app};
use stockflow_auth::{JwtClaims, NewUser, Role};
use stockflow_core::UserId;
use stockflow_infra::{InMemoryStore, Store};

const JWT_SECRET: &str = "black-box-test-secret-0123456789abcdef";
const PASSWORD: &str = "password123";

struct TestServer {
    base_url: String,
    admin: (UserId, String),
    clerk: (UserId, String),
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let services = AppServices::new(store, JWT_SECRET.as_bytes(), ChronoDuration::hours(1));

        let admin = services
            .create_user(new_user("admin", Role::Admin))
            .await
            .expect("seed admin");
        let clerk = services
            .create_user(new_user("clerk", Role::User))
            .await
            .expect("seed clerk");

        // Build app (same router as prod), but bind to an ephemeral port.
        let app = build_app(Arc::new(services));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            admin: (admin.id, admin.username),
            clerk: (clerk.id, clerk.username),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn admin_token(&self) -> String {
        mint_jwt(JWT_SECRET, self.admin.0, &self.admin.1, Role::Admin, ChronoDuration::minutes(10))
    }

    fn clerk_token(&self) -> String {
        mint_jwt(JWT_SECRET, self.clerk.0, &self.clerk.1, Role::User, ChronoDuration::minutes(10))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn new_user(username: &str, role: Role) -> NewUser {
    NewUser {
        name: format!("{username} account"),
        email: format!("{username}@example.com"),
        username: username.to_string(),
        password: PASSWORD.to_string(),
        role,
    }
}

fn mint_jwt(secret: &str, sub: UserId, username: &str, role: Role, ttl: ChronoDuration) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub,
        username: username.to_string(),
        role,
        issued_at: now - ChronoDuration::minutes(20),
        expires_at: now + ttl,
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn create_product(
    client: &reqwest::Client,
    srv: &TestServer,
    sku: &str,
    initial_quantity: i64,
) -> Value {
    let res = client
        .post(srv.url("/products"))
        .bearer_auth(srv.admin_token())
        .json(&json!({
            "sku": sku,
            "name": format!("Product {sku}"),
            "price": 129_999,
            "cost_price": 95_000,
            "min_stock_level": 5,
            "initial_quantity": initial_quantity,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

async fn stock_out(
    client: &reqwest::Client,
    srv: &TestServer,
    product_id: &str,
    quantity: i64,
) -> reqwest::Response {
    client
        .post(srv.url("/inventory/stock-out"))
        .bearer_auth(srv.clerk_token())
        .json(&json!({
            "product_id": product_id,
            "quantity": quantity,
            "reason": "sale",
        }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn username_availability_is_public_and_leaks_nothing() {
    let srv = TestServer::spawn().await;

    let res = reqwest::get(srv.url("/auth/check-user/clerk")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "username": "clerk", "available": false }));

    let body: Value = reqwest::get(srv.url("/auth/check-user/someone-new"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["available"], true);
}

#[tokio::test]
async fn missing_and_invalid_credentials_are_distinguishable() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthenticated");

    let forged = mint_jwt(
        "some-other-secret-0123456789abcdef",
        srv.admin.0,
        &srv.admin.1,
        Role::Admin,
        ChronoDuration::minutes(10),
    );
    let res = client
        .get(srv.url("/whoami"))
        .bearer_auth(forged)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_credential");

    let expired = mint_jwt(
        JWT_SECRET,
        srv.admin.0,
        &srv.admin.1,
        Role::Admin,
        ChronoDuration::minutes(-1),
    );
    let res = client
        .get(srv.url("/whoami"))
        .bearer_auth(expired)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_credential");
}

#[tokio::test]
async fn identity_is_derived_from_token() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/whoami"))
        .bearer_auth(srv.clerk_token())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["subject_id"].as_str().unwrap(), srv.clerk.0.to_string());
    assert_eq!(body["username"], "clerk");
    assert_eq!(body["role"], "user");
}

#[tokio::test]
async fn login_issues_a_usable_token() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/auth/login"))
        .json(&json!({ "username": "clerk", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"]["username"], "clerk");
    assert!(body["user"].get("password_hash").is_none());
    let token = body["token"].as_str().unwrap().to_string();

    let res = client
        .get(srv.url("/auth/me"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let me: Value = res.json().await.unwrap();
    assert_eq!(me["id"].as_str().unwrap(), srv.clerk.0.to_string());

    for (username, password) in [("clerk", "wrong-password"), ("nobody", PASSWORD)] {
        let res = client
            .post(srv.url("/auth/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"], "invalid_login");
    }
}

#[tokio::test]
async fn registration_creates_plain_users_only() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/auth/register"))
        .json(&json!({
            "name": "New Person",
            "email": "new@example.com",
            "username": "newbie",
            "password": "secret1",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let user: Value = res.json().await.unwrap();
    assert_eq!(user["role"], "user");

    let res = client
        .post(srv.url("/auth/register"))
        .json(&json!({
            "name": "Copy Cat",
            "email": "other@example.com",
            "username": "newbie",
            "password": "secret1",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client
        .post(srv.url("/auth/register"))
        .json(&json!({
            "name": "Al",
            "email": "not-an-email",
            "username": "x",
            "password": "1",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn non_admins_cannot_escalate_or_manage() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .put(srv.url(&format!("/users/{}", srv.clerk.0)))
        .bearer_auth(srv.clerk_token())
        .json(&json!({ "role": "admin" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .put(srv.url(&format!("/users/{}", srv.clerk.0)))
        .bearer_auth(srv.clerk_token())
        .json(&json!({ "name": "Renamed Clerk" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["name"], "Renamed Clerk");
    assert_eq!(body["role"], "user");

    let res = client
        .get(srv.url(&format!("/users/{}", srv.admin.0)))
        .bearer_auth(srv.clerk_token())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .get(srv.url("/users"))
        .bearer_auth(srv.clerk_token())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");

    let res = client
        .post(srv.url("/products"))
        .bearer_auth(srv.clerk_token())
        .json(&json!({ "sku": "NOPE-001", "name": "Nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .get(srv.url("/users?limit=1"))
        .bearer_auth(srv.admin_token())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let page: Value = res.json().await.unwrap();
    assert_eq!(page["total"], 2);
    assert_eq!(page["pages"], 2);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn sale_then_insufficient_stock() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let product = create_product(&client, &srv, "LAP-DEL-001", 15).await;
    assert_eq!(product["quantity"], 15);
    assert_eq!(product["low_stock"], false);
    let id = product["id"].as_str().unwrap().to_string();

    let res = stock_out(&client, &srv, &id, 5).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let movement: Value = res.json().await.unwrap();
    assert_eq!(movement["type"], "out");
    assert_eq!(movement["reason"], "sale");
    assert_eq!(movement["performed_by"].as_str().unwrap(), srv.clerk.0.to_string());

    let res = stock_out(&client, &srv, &id, 20).await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "insufficient_stock");
    assert_eq!(body["available"], 10);
    assert_eq!(body["requested"], 20);

    let res = client
        .get(srv.url(&format!("/products/{id}")))
        .bearer_auth(srv.clerk_token())
        .send()
        .await
        .unwrap();
    let current: Value = res.json().await.unwrap();
    assert_eq!(current["quantity"], 10);

    let res = client
        .get(srv.url(&format!("/inventory/product/{id}")))
        .bearer_auth(srv.clerk_token())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let history: Value = res.json().await.unwrap();
    assert_eq!(history["total"], 2);
    assert_eq!(history["items"][0]["reason"], "sale");
    assert_eq!(history["items"][0]["product_sku"], "LAP-DEL-001");
    assert_eq!(history["items"][1]["reference"], "opening-balance");
}

#[tokio::test]
async fn movement_validation_and_missing_products() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product = create_product(&client, &srv, "MON-LG-001", 0).await;
    let id = product["id"].as_str().unwrap();

    // sale is outbound only
    let res = client
        .post(srv.url("/inventory/stock-in"))
        .bearer_auth(srv.clerk_token())
        .json(&json!({ "product_id": id, "quantity": 3, "reason": "sale" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");

    let res = client
        .post(srv.url("/inventory"))
        .bearer_auth(srv.clerk_token())
        .json(&json!({ "product_id": id, "quantity": 0, "type": "in", "reason": "purchase" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(srv.url("/inventory"))
        .bearer_auth(srv.clerk_token())
        .json(&json!({
            "product_id": uuid::Uuid::now_v7(),
            "quantity": 1,
            "type": "in",
            "reason": "purchase",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(srv.url("/inventory"))
        .bearer_auth(srv.clerk_token())
        .send()
        .await
        .unwrap();
    let all: Value = res.json().await.unwrap();
    assert_eq!(all["total"], 0);
}

#[tokio::test]
async fn delete_is_refused_while_movements_reference_the_product() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let used = create_product(&client, &srv, "KEY-COR-001", 20).await;
    let unused = create_product(&client, &srv, "HD-SEA-001", 0).await;

    let res = client
        .delete(srv.url(&format!("/products/{}", used["id"].as_str().unwrap())))
        .bearer_auth(srv.admin_token())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let unused_url = srv.url(&format!("/products/{}", unused["id"].as_str().unwrap()));
    let res = client
        .delete(&unused_url)
        .bearer_auth(srv.admin_token())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(&unused_url)
        .bearer_auth(srv.admin_token())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_stock_outs_never_overdraw() {
    let srv = Arc::new(TestServer::spawn().await);
    let client = reqwest::Client::new();
    let product = create_product(&client, &srv, "MOUSE-LOG-001", 10).await;
    let id = product["id"].as_str().unwrap().to_string();

    let mut handles = Vec::new();
    for _ in 0..2 {
        let srv = Arc::clone(&srv);
        let client = client.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            let res = stock_out(&client, &srv, &id, 6).await;
            let status = res.status();
            let body: Value = res.json().await.unwrap();
            (status, body)
        }));
    }

    let mut results = Vec::new();
    for h in handles {
        results.push(h.await.unwrap());
    }
    results.sort_by_key(|(status, _)| status.as_u16());

    assert_eq!(results[0].0, StatusCode::CREATED);
    assert_eq!(results[1].0, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(results[1].1["available"], 4);
    assert_eq!(results[1].1["requested"], 6);

    let res = client
        .get(srv.url(&format!("/products/sku/{}", "MOUSE-LOG-001")))
        .bearer_auth(srv.clerk_token())
        .send()
        .await
        .unwrap();
    let current: Value = res.json().await.unwrap();
    assert_eq!(current["quantity"], 4);
}

#[tokio::test]
async fn over_wide_reference_is_a_bad_request() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product = create_product(&client, &srv, "WIDE-001", 5).await;

    let res = client
        .post(srv.url("/inventory/stock-in"))
        .bearer_auth(srv.clerk_token())
        .json(&json!({
            "product_id": product["id"],
            "quantity": 1,
            "reason": "purchase",
            "reference": "r".repeat(300),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
}
