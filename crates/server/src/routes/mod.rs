//! HTTP routes.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                           - Liveness
//! GET    /health/ready                     - Readiness (store reachable)
//!
//! # Auth (Public, auth rate limit)
//! POST   /api/auth/sign-up                 - Register
//! POST   /api/auth/sign-in                 - Issue a token pair
//! POST   /api/auth/refresh                 - Mint an access token from the refresh cookie
//!
//! # Customer (RequiresRole(Customer))
//! POST   /api/auth/sign-out                - Revoke the current pair
//! GET    /api/auth/me                      - Current user
//! POST   /api/auth/password                - Change password, revoke every session
//! GET    /api/cart                         - Active cart
//! PUT    /api/cart                         - Replace active cart contents
//! POST   /api/checkout                     - Check out cart items
//! GET    /api/checkouts                    - Checkout history
//! GET    /api/events                       - WebSocket event stream
//!
//! # Catalogue
//! GET    /api/products                     - Public
//! POST   /api/products                     - RequiresRole(Admin)
//!
//! # Admin (RequiresRole(Admin))
//! DELETE /api/admin/users/{id}/sessions    - Sign a user out everywhere
//! ```

pub mod admin;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod events;
pub mod health;
pub mod products;

use axum::{
    Router,
    handler::Handler,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};

use marketstall_core::Role;

use crate::middleware::{Access, Guard, api_rate_limiter, auth_rate_limiter, authorize};
use crate::state::AppState;

/// Liveness and readiness probes. Never rate limited.
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
}

/// Routes open to anyone holding a valid refresh cookie or credentials.
pub fn auth_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/api/auth/sign-up", post(auth::sign_up))
        .route("/api/auth/sign-in", post(auth::sign_in))
        .route("/api/auth/refresh", post(auth::refresh))
        .route_layer(from_fn_with_state(
            Guard::new(state.clone(), Access::Public),
            authorize,
        ))
}

/// Routes for signed-in customers (admins included).
pub fn customer_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/api/auth/sign-out", post(auth::sign_out))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/password", post(auth::change_password))
        .route("/api/cart", get(cart::show).put(cart::update))
        .route("/api/checkout", post(checkout::create))
        .route("/api/checkouts", get(checkout::index))
        .route("/api/events", get(events::subscribe))
        .route_layer(from_fn_with_state(
            Guard::new(state.clone(), Access::RequiresRole(Role::Customer)),
            authorize,
        ))
}

/// Catalogue: public reads, admin writes.
pub fn catalog_routes(state: &AppState) -> Router<AppState> {
    let admin = from_fn_with_state(
        Guard::new(state.clone(), Access::RequiresRole(Role::Admin)),
        authorize,
    );
    Router::new().route(
        "/api/products",
        get(products::index).post(products::create.layer(admin)),
    )
}

/// Administration.
pub fn admin_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/admin/users/{id}/sessions",
            delete(admin::revoke_sessions),
        )
        .route_layer(from_fn_with_state(
            Guard::new(state.clone(), Access::RequiresRole(Role::Admin)),
            authorize,
        ))
}

/// Every route. With `rate_limits`, the auth group gets the strict limiter
/// and the remaining API the general one; both key on the client IP.
pub fn routes(state: &AppState, rate_limits: bool) -> Router<AppState> {
    let mut auth = auth_routes(state);
    let mut api = Router::new()
        .merge(customer_routes(state))
        .merge(catalog_routes(state))
        .merge(admin_routes(state));

    if rate_limits {
        auth = auth.layer(auth_rate_limiter());
        api = api.layer(api_rate_limiter());
    }

    Router::new()
        .merge(health_routes())
        .merge(auth)
        .merge(api)
}
