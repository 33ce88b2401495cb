//! Role guards, catalogue administration and cross-cutting headers.

#![allow(clippy::unwrap_used)]

use axum::http::{Method, StatusCode};
use serde_json::json;

use marketstall_integration_tests::TestApp;

#[tokio::test]
async fn test_customer_cannot_reach_admin_routes() {
    let app = TestApp::new();
    let customer = app.customer("c@test.com").await;

    let create = app
        .post(
            "/api/products",
            Some(&customer.access_token),
            json!({"name": "Mug", "description": "", "unitPrice": "9.00"}),
        )
        .await;
    assert_eq!(create.status, StatusCode::FORBIDDEN);
    assert_eq!(create.body["statusCode"], 403);

    let revoke = app
        .request(
            Method::DELETE,
            &format!("/api/admin/users/{}/sessions", customer.user_id),
            Some(&customer.access_token),
            None,
            None,
        )
        .await;
    assert_eq!(revoke.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_manages_catalogue() {
    let app = TestApp::new();
    let admin = app.admin("admin@test.com").await;

    let created = app
        .post(
            "/api/products",
            Some(&admin.access_token),
            json!({"name": "  Mug ", "description": "Stoneware", "unitPrice": "9.999"}),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED, "{:?}", created.body);
    assert_eq!(created.body["name"], "Mug");

    // Reads are public.
    let listed = app.get("/api/products", None).await;
    assert_eq!(listed.status, StatusCode::OK);
    let products = listed.body.as_array().unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0]["id"], created.body["id"]);
}

#[tokio::test]
async fn test_admin_can_use_customer_routes() {
    let app = TestApp::new();
    let admin = app.admin("root@test.com").await;

    let cart = app.get("/api/cart", Some(&admin.access_token)).await;
    assert_eq!(cart.status, StatusCode::OK);
    assert_eq!(cart.body["items"], json!([]));
}

#[tokio::test]
async fn test_admin_revokes_sessions() {
    let app = TestApp::new();
    let admin = app.admin("ops@test.com").await;
    let customer = app.customer("victim@test.com").await;
    app.session("victim@test.com", marketstall_integration_tests::PASSWORD)
        .await;

    let revoked = app
        .request(
            Method::DELETE,
            &format!("/api/admin/users/{}/sessions", customer.user_id),
            Some(&admin.access_token),
            None,
            None,
        )
        .await;
    assert_eq!(revoked.status, StatusCode::OK);
    assert_eq!(revoked.body["revoked"], 4);

    let me = app.get("/api/auth/me", Some(&customer.access_token)).await;
    assert_eq!(me.status, StatusCode::NOT_FOUND);
    assert_eq!(
        app.get("/api/auth/me", Some(&admin.access_token)).await.status,
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_responses_carry_api_headers() {
    let app = TestApp::new();

    let response = app.get("/health", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.headers.contains_key("x-request-id"));
    assert_eq!(response.headers["x-content-type-options"], "nosniff");
    assert_eq!(response.headers["x-frame-options"], "DENY");
    assert_eq!(response.headers["cache-control"], "no-store");
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = TestApp::new();

    let request = axum::http::Request::builder()
        .uri("/health")
        .header("x-request-id", "req-123")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.router.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-123");
}

#[tokio::test]
async fn test_readiness_checks_store() {
    let app = TestApp::new();
    assert_eq!(app.get("/health/ready", None).await.status, StatusCode::OK);
}
