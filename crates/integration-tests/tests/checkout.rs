//! Integration tests for checkout and the order lifecycle.
//!
//! These tests require a running `kitshop-api` with a migrated database and
//! an admin account. See the crate docs for setup.

use kitshop_integration_tests::{TestContext, data, error_code, shipping, unique};
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};

async fn fill_cart(ctx: &TestContext, token: &str, product: i64, quantity: u32) {
    let resp = ctx
        .post(
            "/api/cart/items",
            Some(token),
            json!({ "product_id": product, "size": "M", "quantity": quantity }),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
}

async fn checkout(ctx: &TestContext, token: &str, key: Option<&str>) -> reqwest::Response {
    let mut request = ctx
        .request(Method::POST, "/api/orders")
        .bearer_auth(token)
        .json(&json!({ "shipping": shipping(), "payment_method": "card" }));
    if let Some(key) = key {
        request = request.header("idempotency-key", key);
    }
    request.send().await.expect("checkout request failed")
}

#[tokio::test]
#[ignore = "Requires running kitshop-api server and database"]
async fn test_checkout_creates_pending_order_and_takes_stock() {
    let ctx = TestContext::new();
    let admin = ctx.admin_token().await;
    let (token, _) = ctx.register_customer().await;
    let product = ctx.create_product(&admin, "30.00", 10).await;
    fill_cart(&ctx, &token, product, 2).await;

    let resp = checkout(&ctx, &token, None).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let order = data(resp).await;
    assert_eq!(order["status"], "pending");
    assert_eq!(order["channel"], "online");
    assert_eq!(order["subtotal"], "60.00");
    assert_eq!(order["shipping"], "0.00");
    assert_eq!(order["total"], "69.00");
    assert_eq!(order["items"][0]["quantity"], 2);

    assert_eq!(ctx.stock_of(&admin, product).await, 8);

    // The cart is emptied by checkout
    let cart = data(ctx.get("/api/cart", Some(&token)).await).await;
    assert_eq!(cart["item_count"], 0);
}

#[tokio::test]
#[ignore = "Requires running kitshop-api server and database"]
async fn test_idempotent_checkout_replays_same_order() {
    let ctx = TestContext::new();
    let admin = ctx.admin_token().await;
    let (token, _) = ctx.register_customer().await;
    let product = ctx.create_product(&admin, "15.00", 10).await;
    fill_cart(&ctx, &token, product, 1).await;

    let key = format!("checkout-{}", unique());
    let first = checkout(&ctx, &token, Some(&key)).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let first: Value = data(first).await;

    let second = checkout(&ctx, &token, Some(&key)).await;
    assert_eq!(second.status(), StatusCode::OK);
    let second: Value = data(second).await;

    assert_eq!(first["id"], second["id"]);
    assert_eq!(ctx.stock_of(&admin, product).await, 9);
}

#[tokio::test]
#[ignore = "Requires running kitshop-api server and database"]
async fn test_empty_cart_checkout_rejected() {
    let ctx = TestContext::new();
    let (token, _) = ctx.register_customer().await;

    let resp = checkout(&ctx, &token, None).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore = "Requires running kitshop-api server and database"]
async fn test_stock_taken_by_someone_else_fails_whole_checkout() {
    let ctx = TestContext::new();
    let admin = ctx.admin_token().await;
    let (token, _) = ctx.register_customer().await;
    let plenty = ctx.create_product(&admin, "10.00", 10).await;
    let scarce = ctx.create_product(&admin, "50.00", 2).await;
    fill_cart(&ctx, &token, plenty, 3).await;
    fill_cart(&ctx, &token, scarce, 2).await;

    // A till sale takes the last units before the customer checks out
    let resp = ctx
        .post(
            "/api/pos/sales",
            Some(&admin),
            json!({
                "items": [{ "product_id": scarce, "quantity": 2 }],
                "payment_method": "cash",
            }),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = checkout(&ctx, &token, None).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(resp).await, "insufficient_stock");

    // Nothing was taken from the other product
    assert_eq!(ctx.stock_of(&admin, plenty).await, 10);
}

#[tokio::test]
#[ignore = "Requires running kitshop-api server and database"]
async fn test_customer_cancel_restocks() {
    let ctx = TestContext::new();
    let admin = ctx.admin_token().await;
    let (token, _) = ctx.register_customer().await;
    let product = ctx.create_product(&admin, "25.00", 4).await;
    fill_cart(&ctx, &token, product, 3).await;

    let order = data(checkout(&ctx, &token, None).await).await;
    let order_id = order["id"].as_i64().expect("order id");
    assert_eq!(ctx.stock_of(&admin, product).await, 1);

    let resp = ctx
        .post(&format!("/api/orders/{order_id}/cancel"), Some(&token), json!({}))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(data(resp).await["status"], "cancelled");
    assert_eq!(ctx.stock_of(&admin, product).await, 4);

    // Cancelling twice is not a valid transition
    let resp = ctx
        .post(&format!("/api/orders/{order_id}/cancel"), Some(&token), json!({}))
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore = "Requires running kitshop-api server and database"]
async fn test_staff_status_transitions() {
    let ctx = TestContext::new();
    let admin = ctx.admin_token().await;
    let (token, _) = ctx.register_customer().await;
    let product = ctx.create_product(&admin, "60.00", 5).await;
    fill_cart(&ctx, &token, product, 1).await;

    let order = data(checkout(&ctx, &token, None).await).await;
    let path = format!("/api/orders/{}/status", order["id"]);

    let set = |status: &'static str| {
        ctx.send(Method::PATCH, &path, Some(&admin), Some(json!({ "status": status })))
    };

    // Skipping payment is rejected
    let resp = set("shipped").await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(resp).await, "invalid_transition");

    assert_eq!(set("paid").await.status(), StatusCode::OK);
    assert_eq!(set("shipped").await.status(), StatusCode::OK);
    assert_eq!(set("delivered").await.status(), StatusCode::OK);

    // Delivered is final
    assert_eq!(set("cancelled").await.status(), StatusCode::CONFLICT);

    // Customers cannot move orders themselves
    let resp = ctx
        .send(Method::PATCH, &path, Some(&token), Some(json!({ "status": "paid" })))
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore = "Requires running kitshop-api server and database"]
async fn test_orders_are_private() {
    let ctx = TestContext::new();
    let admin = ctx.admin_token().await;
    let (owner, _) = ctx.register_customer().await;
    let (other, _) = ctx.register_customer().await;
    let product = ctx.create_product(&admin, "12.00", 5).await;
    fill_cart(&ctx, &owner, product, 1).await;

    let order = data(checkout(&ctx, &owner, None).await).await;
    let path = format!("/api/orders/{}", order["id"]);

    assert_eq!(ctx.get(&path, Some(&owner)).await.status(), StatusCode::OK);
    assert_eq!(ctx.get(&path, Some(&admin)).await.status(), StatusCode::OK);
    assert_eq!(ctx.get(&path, Some(&other)).await.status(), StatusCode::NOT_FOUND);

    let mine = data(ctx.get("/api/orders", Some(&other)).await).await;
    assert_eq!(mine.as_array().map(Vec::len), Some(0));
}

/// Split two concurrent checkout responses into the created one and the other.
fn created_first(a: reqwest::Response, b: reqwest::Response) -> (reqwest::Response, reqwest::Response) {
    if a.status() == StatusCode::CREATED {
        (a, b)
    } else {
        (b, a)
    }
}

#[tokio::test]
#[ignore = "Requires running kitshop-api server and database"]
async fn test_parallel_buyers_cannot_oversell_last_units() {
    let ctx = TestContext::new();
    let admin = ctx.admin_token().await;
    let (first, _) = ctx.register_customer().await;
    let (second, _) = ctx.register_customer().await;
    let product = ctx.create_product(&admin, "40.00", 3).await;
    fill_cart(&ctx, &first, product, 3).await;
    fill_cart(&ctx, &second, product, 3).await;

    let (a, b) = tokio::join!(
        checkout(&ctx, &first, None),
        checkout(&ctx, &second, None)
    );
    let (won, lost) = created_first(a, b);

    assert_eq!(won.status(), StatusCode::CREATED);
    assert_eq!(lost.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(lost).await, "insufficient_stock");
    assert_eq!(ctx.stock_of(&admin, product).await, 0);
}

#[tokio::test]
#[ignore = "Requires running kitshop-api server and database"]
async fn test_parallel_retries_with_same_key_place_one_order() {
    let ctx = TestContext::new();
    let admin = ctx.admin_token().await;
    let (token, _) = ctx.register_customer().await;
    let product = ctx.create_product(&admin, "20.00", 5).await;
    fill_cart(&ctx, &token, product, 2).await;

    let key = format!("checkout-{}", unique());
    let (a, b) = tokio::join!(
        checkout(&ctx, &token, Some(&key)),
        checkout(&ctx, &token, Some(&key))
    );
    let (created, replayed) = created_first(a, b);

    assert_eq!(created.status(), StatusCode::CREATED);
    assert_eq!(replayed.status(), StatusCode::OK);
    let created = data(created).await;
    let replayed = data(replayed).await;
    assert_eq!(created["id"], replayed["id"]);

    assert_eq!(ctx.stock_of(&admin, product).await, 3);
    let mine = data(ctx.get("/api/orders", Some(&token)).await).await;
    assert_eq!(mine.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
#[ignore = "Requires running kitshop-api server and database"]
async fn test_double_submit_without_key_places_cart_once() {
    let ctx = TestContext::new();
    let admin = ctx.admin_token().await;
    let (token, _) = ctx.register_customer().await;
    let product = ctx.create_product(&admin, "35.00", 6).await;
    fill_cart(&ctx, &token, product, 2).await;

    let (a, b) = tokio::join!(
        checkout(&ctx, &token, None),
        checkout(&ctx, &token, None)
    );
    let (created, repeat) = created_first(a, b);

    // The second submit finds the cart already emptied
    assert_eq!(created.status(), StatusCode::CREATED);
    assert_eq!(repeat.status(), StatusCode::BAD_REQUEST);

    assert_eq!(ctx.stock_of(&admin, product).await, 4);
    let mine = data(ctx.get("/api/orders", Some(&token)).await).await;
    assert_eq!(mine.as_array().map(Vec::len), Some(1));
}
