//! Account and token lifecycle over HTTP.

#![allow(clippy::unwrap_used)]

use axum::http::{Method, StatusCode};
use serde_json::json;

use marketstall_integration_tests::{PASSWORD, TestApp};

#[tokio::test]
async fn test_sign_up_sign_in_sign_out() {
    let app = TestApp::new();

    let signed_up = app.sign_up("u@test.com", "pw").await;
    assert_eq!(signed_up.status, StatusCode::CREATED);
    let user_id = signed_up.body["id"].as_i64().unwrap();
    assert_eq!(signed_up.body["email"], "u@test.com");
    assert_eq!(signed_up.body["role"], "customer");

    let signed_in = app.sign_in("u@test.com", "pw").await;
    assert_eq!(signed_in.status, StatusCode::OK);
    let token = signed_in.body["accessToken"].as_str().unwrap().to_owned();
    let set_cookie = signed_in.set_cookie().unwrap();
    assert!(set_cookie.starts_with("refresh_token="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("Path=/api/auth/refresh"));

    let me = app.get("/api/auth/me", Some(&token)).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["id"].as_i64().unwrap(), user_id);

    let signed_out = app
        .request(Method::POST, "/api/auth/sign-out", Some(&token), None, None)
        .await;
    assert_eq!(signed_out.status, StatusCode::NO_CONTENT);
    assert!(signed_out.set_cookie().unwrap().contains("Max-Age=0"));

    let after = app.get("/api/auth/me", Some(&token)).await;
    assert_eq!(after.status, StatusCode::NOT_FOUND);
    assert_eq!(
        after.body,
        json!({"statusCode": 404, "message": "token not found"})
    );
}

#[tokio::test]
async fn test_duplicate_sign_up_conflicts() {
    let app = TestApp::new();
    assert_eq!(app.sign_up("dup@test.com", PASSWORD).await.status, StatusCode::CREATED);

    let again = app.sign_up("DUP@Test.com", PASSWORD).await;
    assert_eq!(again.status, StatusCode::CONFLICT);
    assert_eq!(again.body["statusCode"], 409);
}

#[tokio::test]
async fn test_sign_in_with_wrong_password() {
    let app = TestApp::new();
    app.customer("wrong@test.com").await;

    let response = app.sign_in("wrong@test.com", "nope").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.refresh_cookie().is_none());
}

#[tokio::test]
async fn test_missing_access_token_is_unauthorized() {
    let app = TestApp::new();

    let response = app.get("/api/auth/me", None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["statusCode"], 401);

    let garbage = app.get("/api/auth/me", Some("not-a-token")).await;
    assert_eq!(garbage.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_rotates_access_token() {
    let app = TestApp::new();
    let session = app.customer("refresh@test.com").await;

    let refreshed = app
        .request(
            Method::POST,
            "/api/auth/refresh",
            Some(&session.access_token),
            Some(&session.refresh_cookie),
            None,
        )
        .await;
    assert_eq!(refreshed.status, StatusCode::OK, "{:?}", refreshed.body);
    let fresh = refreshed.body["accessToken"].as_str().unwrap().to_owned();
    assert_ne!(fresh, session.access_token);

    let me = app.get("/api/auth/me", Some(&fresh)).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["id"].as_i64().unwrap(), session.user_id);

    let old = app.get("/api/auth/me", Some(&session.access_token)).await;
    assert_eq!(old.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_refresh_requires_cookie() {
    let app = TestApp::new();
    let session = app.customer("nocookie@test.com").await;

    let response = app
        .request(
            Method::POST,
            "/api/auth/refresh",
            Some(&session.access_token),
            None,
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_access_token_is_not_a_refresh_token() {
    let app = TestApp::new();
    let session = app.customer("swap@test.com").await;

    let cookie = format!("refresh_token={}", session.access_token);
    let response = app
        .request(Method::POST, "/api/auth/refresh", None, Some(&cookie), None)
        .await;
    assert!(response.status.is_client_error());
    assert_ne!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_change_password_ends_every_session() {
    let app = TestApp::new();
    let first = app.customer("pwd@test.com").await;
    let second = app.session("pwd@test.com", PASSWORD).await;

    let changed = app
        .post(
            "/api/auth/password",
            Some(&first.access_token),
            json!({"currentPassword": PASSWORD, "newPassword": "new-secret"}),
        )
        .await;
    assert_eq!(changed.status, StatusCode::OK, "{:?}", changed.body);
    let fresh = changed.body["accessToken"].as_str().unwrap().to_owned();
    assert!(changed.refresh_cookie().is_some());

    for stale in [&first.access_token, &second.access_token] {
        let response = app.get("/api/auth/me", Some(stale)).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }
    assert_eq!(app.get("/api/auth/me", Some(&fresh)).await.status, StatusCode::OK);

    assert_eq!(
        app.sign_in("pwd@test.com", PASSWORD).await.status,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        app.sign_in("pwd@test.com", "new-secret").await.status,
        StatusCode::OK
    );
}
