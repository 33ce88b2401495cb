//! Marketstall server library.
//!
//! Token-based authentication, carts and checkout over an axum HTTP API.
//! The binary in `main.rs` wires [`app`] to `PostgreSQL` and Stripe; tests
//! wire it to the in-memory store and a scripted payment provider.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use axum::{Router, extract::Request, middleware::from_fn};
use tower_http::trace::TraceLayer;

use crate::middleware::{request_id_middleware, security_headers_middleware};
use crate::state::AppState;

/// Build the application router.
///
/// Rate limiting needs a client address, so only the binary (which serves
/// with `ConnectInfo`) enables it.
pub fn app(state: AppState, rate_limits: bool) -> Router {
    routes::routes(&state, rate_limits)
        .with_state(state)
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            tracing::info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = tracing::field::Empty,
                user_id = tracing::field::Empty,
            )
        }))
}
