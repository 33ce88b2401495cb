//! Checkout records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use marketstall_core::{CheckoutId, CheckoutStatus, CurrencyCode, ProductId, UserId};

/// Frozen copy of a product at checkout time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    pub unit_price: Decimal,
    pub quantity: u32,
}

/// An immutable record of a checkout attempt that reached the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRecord {
    pub id: CheckoutId,
    pub user_id: UserId,
    pub total_price: Decimal,
    pub currency: CurrencyCode,
    pub status: CheckoutStatus,
    pub products: Vec<ProductSnapshot>,
    pub payment_intent_id: String,
    pub client_secret: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for inserting a checkout record.
#[derive(Debug, Clone)]
pub struct NewCheckout {
    pub user_id: UserId,
    pub total_price: Decimal,
    pub currency: CurrencyCode,
    pub status: CheckoutStatus,
    pub products: Vec<ProductSnapshot>,
    pub payment_intent_id: String,
    pub client_secret: Option<String>,
}
