//! Payment provider seam.
//!
//! Checkout creates a confirmed payment intent and, if recording it fails,
//! undoes it again: an intent that already succeeded is refunded, any other
//! is cancelled. [`StripeClient`] talks to Stripe; [`ScriptedProvider`]
//! replays canned outcomes for tests.

mod scripted;
mod stripe;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use marketstall_core::CurrencyCode;

pub use scripted::ScriptedProvider;
pub use stripe::StripeClient;

/// Errors that can occur when talking to the payment provider.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Scripted failure.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Charge request for a payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntentRequest {
    /// Amount in minor units (cents).
    pub amount: i64,
    pub currency: CurrencyCode,
    /// Provider-side payment method reference.
    pub payment_method_id: String,
}

/// Provider status of a payment intent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    Succeeded,
    Processing,
    /// Customer must complete an extra step (3-D Secure).
    RequiresAction,
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresCapture,
    Canceled,
    #[serde(other)]
    Unknown,
}

/// A payment intent as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: PaymentIntentStatus,
    pub client_secret: Option<String>,
}

/// A payment provider.
#[async_trait]
pub trait PaymentProvider: Send + Sync + 'static {
    /// Create and confirm a payment intent.
    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, PaymentError>;

    /// Cancel a payment intent that has not succeeded.
    async fn cancel_payment_intent(&self, intent_id: &str) -> Result<(), PaymentError>;

    /// Refund the full amount of a succeeded payment intent.
    async fn refund_payment_intent(&self, intent_id: &str) -> Result<(), PaymentError>;
}
