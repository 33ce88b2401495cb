//! HTTP middleware.
//!
//! # Order (outermost first)
//!
//! 1. Sentry layers (installed by the binary)
//! 2. `TraceLayer` (request span)
//! 3. Request ID (`x-request-id`)
//! 4. Security headers
//! 5. Rate limiting (binary only)
//! 6. Per-group authorization (`authorize` with an [`Access`] requirement)

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;

pub use auth::{ACCESS_TOKEN_HEADER, Access, Guard, authorize};
pub use rate_limit::{api_rate_limiter, auth_rate_limiter};
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
