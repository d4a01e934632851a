//! Integration tests for registration, login and token handling.
//!
//! These tests require a running `kitshop-api` with a migrated database.
//! See the crate docs for setup.

use kitshop_integration_tests::{TestContext, data, error_code};
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
#[ignore = "Requires running kitshop-api server and database"]
async fn test_register_then_me() {
    let ctx = TestContext::new();
    let (token, email) = ctx.register_customer().await;

    let resp = ctx.get("/api/auth/me", Some(&token)).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let me = data(resp).await;
    assert_eq!(me["email"], email);
    assert_eq!(me["role"], "customer");
    assert_eq!(me["profile"]["kind"], "customer");
    assert_eq!(me["profile"]["first_name"], "Test");
}

#[tokio::test]
#[ignore = "Requires running kitshop-api server and database"]
async fn test_duplicate_email_conflicts() {
    let ctx = TestContext::new();
    let (_, email) = ctx.register_customer().await;

    let resp = ctx
        .post(
            "/api/auth/register",
            None,
            json!({
                "email": email.to_uppercase(),
                "password": "another long password",
                "first_name": "Second",
                "last_name": "Try",
            }),
        )
        .await;

    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(resp).await, "email_taken");
}

#[tokio::test]
#[ignore = "Requires running kitshop-api server and database"]
async fn test_wrong_password_rejected() {
    let ctx = TestContext::new();
    let (_, email) = ctx.register_customer().await;

    let resp = ctx
        .post(
            "/api/auth/login",
            None,
            json!({ "email": email, "password": "not the password" }),
        )
        .await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(resp).await, "invalid_credentials");
}

#[tokio::test]
#[ignore = "Requires running kitshop-api server and database"]
async fn test_short_password_rejected() {
    let ctx = TestContext::new();

    let resp = ctx
        .post(
            "/api/auth/register",
            None,
            json!({
                "email": "short-password@kitshop.test",
                "password": "short",
                "first_name": "Test",
                "last_name": "Customer",
            }),
        )
        .await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(resp).await, "validation");
}

#[tokio::test]
#[ignore = "Requires running kitshop-api server and database"]
async fn test_customer_cannot_reach_staff_routes() {
    let ctx = TestContext::new();
    let (token, _) = ctx.register_customer().await;

    let resp = ctx.get("/api/admin/summary", Some(&token)).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(resp).await, "forbidden");

    let resp = ctx.get("/api/users", Some(&token)).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore = "Requires running kitshop-api server and database"]
async fn test_deactivated_account_loses_access() {
    let ctx = TestContext::new();
    let admin = ctx.admin_token().await;
    let (token, _) = ctx.register_customer().await;

    let me = data(ctx.get("/api/auth/me", Some(&token)).await).await;
    let user_id = me["id"].as_i64().expect("user id");

    let resp = ctx
        .send(
            reqwest::Method::PATCH,
            &format!("/api/users/{user_id}"),
            Some(&admin),
            Some(json!({ "active": false })),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = ctx.get("/api/auth/me", Some(&token)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
