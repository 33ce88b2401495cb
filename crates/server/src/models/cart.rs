//! Cart aggregate types.

use serde::{Deserialize, Serialize};

use marketstall_core::{CartId, CartItemId, CartStatus, ProductId, UserId};

use super::product::Product;

/// A cart row (without its items).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartRow {
    pub id: CartId,
    pub user_id: UserId,
    pub status: CartStatus,
}

/// A single line of a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub user_id: UserId,
}

/// A cart item joined with its product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    #[serde(flatten)]
    pub item: CartItem,
    pub product: Product,
}

/// The cart aggregate returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    /// `None` when the user has no active cart yet.
    pub id: Option<CartId>,
    pub user_id: UserId,
    pub status: CartStatus,
    pub items: Vec<CartLine>,
}

impl Cart {
    /// An empty, not-yet-persisted active cart.
    #[must_use]
    pub const fn empty(user_id: UserId) -> Self {
        Self {
            id: None,
            user_id,
            status: CartStatus::Active,
            items: Vec::new(),
        }
    }
}

/// One entry of the desired cart state sent by a client.
///
/// Entries with an `id` refer to existing cart items; entries without one
/// become new items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredCartItem {
    pub id: Option<CartItemId>,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Input for inserting a cart item.
///
/// `id` is set when re-inserting an existing item under its previous id.
#[derive(Debug, Clone, Copy)]
pub struct NewCartItem {
    pub id: Option<CartItemId>,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub user_id: UserId,
}
