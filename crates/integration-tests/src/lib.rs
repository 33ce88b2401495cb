//! End-to-end test harness for Marketstall.
//!
//! [`TestApp`] builds the full axum router over the in-memory store and a
//! scripted payment provider and drives it in-process with
//! `tower::ServiceExt::oneshot`. No database or network is needed:
//!
//! ```bash
//! cargo test -p marketstall-integration-tests
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;

use marketstall_core::{CurrencyCode, Email, Role};
use marketstall_server::config::{AuthConfig, PaymentConfig, ServerConfig};
use marketstall_server::db::{MemoryStore, Store};
use marketstall_server::models::{NewProduct, Product};
use marketstall_server::services::auth::hash_password;
use marketstall_server::services::payments::ScriptedProvider;
use marketstall_server::state::AppState;

/// Password accepted by the test configuration (minimum length 2).
pub const PASSWORD: &str = "pw";

/// Configuration for in-process tests.
#[must_use]
pub fn test_config() -> ServerConfig {
    ServerConfig {
        database_url: SecretString::from("postgres://unused"),
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        auth: AuthConfig {
            token_secret: SecretString::from("kX9#mP2$vL7@nQ4!wR8&jT5*hY3^bZ6%"),
            access_token_ttl: Duration::from_secs(3600),
            refresh_token_ttl: Duration::from_secs(30 * 24 * 3600),
            session_cache_ttl: Duration::from_secs(24 * 3600),
            session_cache_capacity: 1_000,
            password_min_length: 2,
            secure_cookies: false,
        },
        payments: PaymentConfig {
            api_base: "http://payments.invalid".to_owned(),
            secret_key: SecretString::from("sk_test_unused"),
            currency: CurrencyCode::USD,
        },
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// A response with its body decoded as JSON (`Value::Null` when empty).
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// The `refresh_token=<value>` pair from `Set-Cookie`, if any.
    #[must_use]
    pub fn refresh_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with("refresh_token="))
            .and_then(|v| v.split(';').next())
            .map(str::to_owned)
    }

    #[must_use]
    pub fn set_cookie(&self) -> Option<&str> {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
    }
}

/// Tokens of a signed-in user.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: i64,
    pub access_token: String,
    /// `refresh_token=<value>`, ready for a `Cookie` header.
    pub refresh_cookie: String,
}

/// The application wired to in-memory collaborators.
pub struct TestApp {
    pub router: Router,
    pub store: MemoryStore,
    pub payments: Arc<ScriptedProvider>,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    #[must_use]
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let payments = Arc::new(ScriptedProvider::new());
        let state = AppState::new(test_config(), Arc::new(store.clone()), payments.clone());
        Self {
            router: marketstall_server::app(state, false),
            store,
            payments,
        }
    }

    /// Send one request through the router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        access_token: Option<&str>,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = access_token {
            builder = builder.header("x-access-token", token);
        }
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, access_token: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, access_token, None, None).await
    }

    pub async fn post(&self, uri: &str, access_token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, access_token, None, Some(body))
            .await
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> TestResponse {
        self.post(
            "/api/auth/sign-up",
            None,
            serde_json::json!({"email": email, "password": password}),
        )
        .await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> TestResponse {
        self.post(
            "/api/auth/sign-in",
            None,
            serde_json::json!({"email": email, "password": password}),
        )
        .await
    }

    /// Register a customer and sign in.
    pub async fn customer(&self, email: &str) -> Session {
        let response = self.sign_up(email, PASSWORD).await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        self.session(email, PASSWORD).await
    }

    /// Create an admin directly in the store and sign in.
    pub async fn admin(&self, email: &str) -> Session {
        let mut tx = self.store.begin().await.unwrap();
        tx.create_user(
            &Email::parse(email).unwrap(),
            &hash_password(PASSWORD).unwrap(),
            Role::Admin,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
        self.session(email, PASSWORD).await
    }

    /// Sign in and capture the issued tokens.
    pub async fn session(&self, email: &str, password: &str) -> Session {
        let response = self.sign_in(email, password).await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
        Session {
            user_id: response.body["user"]["id"].as_i64().unwrap(),
            access_token: response.body["accessToken"].as_str().unwrap().to_owned(),
            refresh_cookie: response.refresh_cookie().unwrap(),
        }
    }

    /// Add a product to the catalogue directly in the store.
    pub async fn product(&self, name: &str, cents: i64) -> Product {
        let mut tx = self.store.begin().await.unwrap();
        let product = tx
            .create_product(&NewProduct {
                name: name.to_owned(),
                description: format!("{name} description"),
                image: None,
                unit_price: Decimal::new(cents, 2),
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        product
    }
}
