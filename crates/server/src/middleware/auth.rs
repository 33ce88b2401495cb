//! Route authorization.
//!
//! Each route group declares what it needs as an [`Access`] value and is
//! wrapped in [`authorize`] through a [`Guard`]. A successful check inserts
//! the caller's [`Principal`] into the request extensions, where handlers
//! pick it up with the `Principal` extractor.
//!
//! ```rust,ignore
//! Router::new()
//!     .route("/api/cart", get(get_cart))
//!     .route_layer(from_fn_with_state(
//!         Guard::new(state.clone(), Access::RequiresRole(Role::Customer)),
//!         authorize,
//!     ))
//! ```

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use tracing::Span;

use marketstall_core::{Role, TokenKind};

use crate::error::{AppError, set_sentry_user};
use crate::models::Principal;
use crate::state::AppState;

/// Header carrying the access token.
pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";

/// What a route group requires of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Anyone, no token inspected.
    Public,
    /// A valid access token whose user satisfies the role.
    RequiresRole(Role),
}

/// State of the [`authorize`] middleware.
#[derive(Clone)]
pub struct Guard {
    state: AppState,
    access: Access,
}

impl Guard {
    #[must_use]
    pub const fn new(state: AppState, access: Access) -> Self {
        Self { state, access }
    }
}

/// Enforce the guard's [`Access`] requirement.
///
/// # Errors
///
/// - `AppError::Unauthorized` without an access token
/// - the verifier's error for a bad, expired or revoked token
/// - `AppError::Forbidden` when the user's role is insufficient
pub async fn authorize(
    State(guard): State<Guard>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Access::RequiresRole(required) = guard.access else {
        return Ok(next.run(request).await);
    };

    let token = request
        .headers()
        .get(ACCESS_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Unauthorized("missing access token".to_owned()))?;

    let principal = guard
        .state
        .auth()
        .check_token(TokenKind::Access, token)
        .await?;

    if !principal.user.role.satisfies(required) {
        return Err(AppError::Forbidden(format!("requires role {required}")));
    }

    Span::current().record("user_id", principal.user_id().as_i32());
    set_sentry_user(&principal.user_id(), Some(principal.user.email.as_str()));

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("authentication required".to_owned()))
    }
}
