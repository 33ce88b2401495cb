//! Marketstall Core - Shared domain types.
//!
//! This crate provides the types shared by every Marketstall component:
//! - `server` - HTTP API (auth, catalogue, carts, checkout)
//! - `cli` - Migrations and operator tooling
//! - `integration-tests` - End-to-end tests
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. Database codecs are opt-in via the `postgres` feature.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, emails, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
