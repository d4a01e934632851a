//! Integration tests for Kitshop.
//!
//! The tests drive a running `kitshop-api` over HTTP and are `#[ignore]`d
//! by default.
//!
//! # Running Tests
//!
//! ```bash
//! kitshop migrate
//! KITSHOP_ADMIN_PASSWORD='...' kitshop admin create -e admin@kitshop.test -f Test -l Admin
//! cargo run -p kitshop-api &
//!
//! KITSHOP_TEST_ADMIN_EMAIL=admin@kitshop.test KITSHOP_TEST_ADMIN_PASSWORD='...' \
//!     cargo test -p kitshop-integration-tests -- --ignored
//! ```
//!
//! # Environment Variables
//!
//! - `KITSHOP_TEST_URL` - API base URL (default: `http://localhost:4000`)
//! - `KITSHOP_TEST_ADMIN_EMAIL` / `KITSHOP_TEST_ADMIN_PASSWORD` - An admin
//!   account created with the CLI
//!
//! Each test creates its own customers and products with unique names, so
//! tests can share one database and run in parallel.

#![allow(clippy::missing_panics_doc)]

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{Value, json};
use uuid::Uuid;

/// Base URL for the API (configurable via environment).
#[must_use]
pub fn base_url() -> String {
    std::env::var("KITSHOP_TEST_URL").unwrap_or_else(|_| "http://localhost:4000".to_string())
}

/// A unique suffix for names and emails.
#[must_use]
pub fn unique() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Shared HTTP client and helpers.
pub struct TestContext {
    pub client: Client,
    pub base_url: String,
    /// Distinct forwarded address per context so tests don't share a rate limit bucket.
    forwarded_for: String,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    #[must_use]
    pub fn new() -> Self {
        let bytes = *Uuid::new_v4().as_bytes();
        Self {
            client: Client::new(),
            base_url: base_url(),
            forwarded_for: format!("10.{}.{}.{}", bytes[0], bytes[1], bytes[2]),
        }
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// A request builder carrying this context's forwarded address.
    #[must_use]
    pub fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header("x-forwarded-for", &self.forwarded_for)
    }

    /// Send a request, optionally authenticated, with an optional JSON body.
    pub async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut request = self.request(method, path);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        request.send().await.expect("request failed")
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Response {
        self.send(reqwest::Method::GET, path, token, None).await
    }

    pub async fn post(&self, path: &str, token: Option<&str>, body: Value) -> Response {
        self.send(reqwest::Method::POST, path, token, Some(body))
            .await
    }

    /// Register a fresh customer; returns `(token, email)`.
    pub async fn register_customer(&self) -> (String, String) {
        let email = format!("customer-{}@kitshop.test", unique());
        let resp = self
            .post(
                "/api/auth/register",
                None,
                json!({
                    "email": email,
                    "password": "correct horse battery",
                    "first_name": "Test",
                    "last_name": "Customer",
                }),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let data = data(resp).await;
        (token_of(&data), email)
    }

    /// Sign in as the admin configured in the environment.
    pub async fn admin_token(&self) -> String {
        let email = std::env::var("KITSHOP_TEST_ADMIN_EMAIL")
            .expect("KITSHOP_TEST_ADMIN_EMAIL must be set");
        let password = std::env::var("KITSHOP_TEST_ADMIN_PASSWORD")
            .expect("KITSHOP_TEST_ADMIN_PASSWORD must be set");

        let resp = self
            .post(
                "/api/auth/login",
                None,
                json!({ "email": email, "password": password }),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::OK, "admin login failed");
        token_of(&data(resp).await)
    }

    /// Create an active product; returns its ID.
    pub async fn create_product(&self, admin: &str, price: &str, stock: u32) -> i64 {
        let resp = self
            .post(
                "/api/products",
                Some(admin),
                json!({
                    "name": format!("Test Jersey {}", unique()),
                    "price": price,
                    "stock": stock,
                    "min_stock": 2,
                    "category": "test-jerseys",
                }),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        data(resp).await["id"].as_i64().expect("product id")
    }

    /// Current stock of a product, as seen by staff.
    pub async fn stock_of(&self, admin: &str, product_id: i64) -> u64 {
        let resp = self
            .get(&format!("/api/products/{product_id}"), Some(admin))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        data(resp).await["stock"].as_u64().expect("stock")
    }
}

/// The `data` field of a success envelope.
pub async fn data(resp: Response) -> Value {
    let body: Value = resp.json().await.expect("response is not JSON");
    assert_eq!(body["success"], true, "unexpected error envelope: {body}");
    body["data"].clone()
}

/// The `error.code` field of an error envelope.
pub async fn error_code(resp: Response) -> String {
    let body: Value = resp.json().await.expect("response is not JSON");
    assert_eq!(body["success"], false, "expected an error envelope: {body}");
    body["error"]["code"].as_str().unwrap_or_default().to_string()
}

fn token_of(data: &Value) -> String {
    data["token"].as_str().expect("token").to_string()
}

/// Shipping details accepted by checkout.
#[must_use]
pub fn shipping() -> Value {
    json!({
        "full_name": "Test Customer",
        "address": "1 Stadium Road",
        "city": "Springfield",
        "postal_code": "12345",
        "phone": "+1 555 0100",
    })
}
