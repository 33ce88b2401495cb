//! Business logic.
//!
//! # Services
//!
//! - `tokens` - Token codec and token pair lifecycle
//! - `session_cache` - Non-authoritative cache of live tokens and users
//! - `auth` - Sign-up, sign-in, token verification, password changes
//! - `catalog` - Product listing and creation
//! - `cart` - Active cart reads and merges
//! - `checkout` - Checkout orchestration with payment compensation
//! - `payments` - Payment provider seam (Stripe)
//! - `events` - Per-user event fan-out

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod events;
pub mod payments;
pub mod session_cache;
pub mod tokens;
