//! Checkout orchestration.
//!
//! A checkout consumes cart items into an immutable [`CheckoutRecord`] and
//! charges the payment provider. The cart items are locked and deleted in
//! the same transaction that records the checkout; the payment intent is
//! created while that transaction is open.
//!
//! Failure handling:
//!
//! - before the payment intent exists, the transaction simply rolls back
//! - after it exists, the intent is undone before the error surfaces:
//!   refunded if it already succeeded, cancelled otherwise
//! - an undo that keeps failing is retried with backoff, then reported to
//!   Sentry; the caller still sees the original error
//!
//! Everything from intent creation to commit runs on its own task, so a
//! request dropped mid-checkout (client disconnect) still records or
//! compensates the charge.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{Instrument, instrument};

use marketstall_core::{CartItemId, CheckoutStatus, CurrencyCode, Price, PriceError, UserId};

use crate::db::{RepositoryError, Store, StoreTx};
use crate::models::{CartLine, CheckoutRecord, NewCheckout, ProductSnapshot};
use crate::services::payments::{
    PaymentError, PaymentIntent, PaymentIntentRequest, PaymentIntentStatus, PaymentProvider,
};

const COMPENSATION_ATTEMPTS: u32 = 3;
const COMPENSATION_BACKOFF: Duration = Duration::from_millis(100);

/// Errors from checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("invalid cart item ids")]
    InvalidItems,

    #[error("{0}")]
    Invalid(String),

    #[error("payment was not accepted (status {0:?})")]
    Declined(PaymentIntentStatus),

    #[error("payment provider error: {0}")]
    Payment(#[from] PaymentError),

    #[error("invalid total: {0}")]
    Price(#[from] PriceError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("checkout task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// How a created payment intent is undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compensation {
    Cancel,
    Refund,
}

impl Compensation {
    /// Succeeded intents can no longer be cancelled, only refunded.
    fn for_status(status: &PaymentIntentStatus) -> Self {
        match status {
            PaymentIntentStatus::Succeeded => Self::Refund,
            _ => Self::Cancel,
        }
    }
}

/// A checkout request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub payment_method_id: String,
    pub cart_item_ids: Vec<CartItemId>,
}

#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn Store>,
    payments: Arc<dyn PaymentProvider>,
    currency: CurrencyCode,
    compensation_backoff: Duration,
}

impl CheckoutService {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        payments: Arc<dyn PaymentProvider>,
        currency: CurrencyCode,
    ) -> Self {
        Self {
            store,
            payments,
            currency,
            compensation_backoff: COMPENSATION_BACKOFF,
        }
    }

    /// Override the base delay between cancel or refund attempts.
    #[must_use]
    pub const fn with_compensation_backoff(mut self, backoff: Duration) -> Self {
        self.compensation_backoff = backoff;
        self
    }

    /// Check out the given cart items of `user_id`.
    ///
    /// Returns the stored record, `PAID` or `WAITING_3DS`.
    ///
    /// # Errors
    ///
    /// - `CheckoutError::InvalidItems` if the id set is empty, repeats an id,
    ///   or names items the user does not own
    /// - `CheckoutError::Payment` if the provider call fails
    /// - `CheckoutError::Declined` for any other provider status
    /// - `CheckoutError::Repository` if the store fails
    /// - `CheckoutError::Task` if the detached charge task panics
    #[instrument(
        skip(self, request),
        fields(items = request.cart_item_ids.len(), payment_intent_id = tracing::field::Empty)
    )]
    pub async fn checkout_cart_items(
        &self,
        user_id: UserId,
        request: &CheckoutRequest,
    ) -> Result<CheckoutRecord, CheckoutError> {
        if request.payment_method_id.trim().is_empty() {
            return Err(CheckoutError::Invalid(
                "payment method is required".to_owned(),
            ));
        }
        let ids = &request.cart_item_ids;
        let unique: HashSet<&CartItemId> = ids.iter().collect();
        if ids.is_empty() || unique.len() != ids.len() {
            return Err(CheckoutError::InvalidItems);
        }

        let mut tx = self.store.begin().await?;
        let lines = tx.lock_checkout_lines(user_id, ids).await?;
        if lines.len() != ids.len() {
            return Err(CheckoutError::InvalidItems);
        }
        tx.delete_cart_items(ids).await?;

        let (total, products) = self.summarize(&lines)?;
        let charge = PaymentIntentRequest {
            amount: total.to_minor_units()?,
            currency: self.currency,
            payment_method_id: request.payment_method_id.clone(),
        };

        let service = self.clone();
        let task = async move {
            service
                .charge_and_record(tx, user_id, total, products, charge)
                .await
        };
        tokio::spawn(task.instrument(tracing::Span::current())).await?
    }

    /// Create the payment intent, then record the checkout and commit.
    /// Once the intent exists, any failure undoes it.
    async fn charge_and_record(
        self,
        tx: Box<dyn StoreTx>,
        user_id: UserId,
        total: Price,
        products: Vec<ProductSnapshot>,
        charge: PaymentIntentRequest,
    ) -> Result<CheckoutRecord, CheckoutError> {
        let intent = self.payments.create_payment_intent(&charge).await?;
        tracing::Span::current().record("payment_intent_id", intent.id.as_str());

        match Self::record(tx, user_id, total, products, &intent).await {
            Ok(record) => {
                tracing::info!(
                    checkout_id = %record.id,
                    status = ?record.status,
                    total = %total,
                    "Checkout recorded"
                );
                Ok(record)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Checkout failed after payment intent creation");
                self.compensate(&intent).await;
                Err(e)
            }
        }
    }

    /// Checkout records of a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Repository` if the store fails.
    pub async fn list_checkouts(
        &self,
        user_id: UserId,
    ) -> Result<Vec<CheckoutRecord>, CheckoutError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.checkouts_for_user(user_id).await?)
    }

    fn summarize(&self, lines: &[CartLine]) -> Result<(Price, Vec<ProductSnapshot>), PriceError> {
        let mut total = Price::zero(self.currency);
        let mut products = Vec::with_capacity(lines.len());
        for line in lines {
            let subtotal =
                Price::new(line.product.unit_price, self.currency).times(line.item.quantity)?;
            total = total.checked_add(subtotal)?;
            products.push(ProductSnapshot {
                id: line.product.id,
                name: line.product.name.clone(),
                description: line.product.description.clone(),
                image: line.product.image.clone(),
                unit_price: line.product.unit_price,
                quantity: line.item.quantity,
            });
        }
        Ok((total, products))
    }

    /// Record the checkout and commit. The transaction rolls back on error.
    async fn record(
        mut tx: Box<dyn StoreTx>,
        user_id: UserId,
        total: Price,
        products: Vec<ProductSnapshot>,
        intent: &PaymentIntent,
    ) -> Result<CheckoutRecord, CheckoutError> {
        let status = match intent.status {
            PaymentIntentStatus::RequiresAction => CheckoutStatus::Waiting3ds,
            PaymentIntentStatus::Succeeded | PaymentIntentStatus::Processing => {
                CheckoutStatus::Paid
            }
            ref other => return Err(CheckoutError::Declined(other.clone())),
        };

        let record = tx
            .insert_checkout(&NewCheckout {
                user_id,
                total_price: total.amount,
                currency: total.currency_code,
                status,
                products,
                payment_intent_id: intent.id.clone(),
                client_secret: intent.client_secret.clone(),
            })
            .await?;
        tx.commit().await?;
        Ok(record)
    }

    /// Undo a payment intent, retrying with exponential backoff.
    async fn compensate(&self, intent: &PaymentIntent) {
        let action = Compensation::for_status(&intent.status);
        let intent_id = intent.id.as_str();
        let mut delay = self.compensation_backoff;
        for attempt in 1..=COMPENSATION_ATTEMPTS {
            let result = match action {
                Compensation::Cancel => self.payments.cancel_payment_intent(intent_id).await,
                Compensation::Refund => self.payments.refund_payment_intent(intent_id).await,
            };
            match result {
                Ok(()) => {
                    tracing::info!(
                        payment_intent_id = intent_id,
                        ?action,
                        attempt,
                        "Payment intent compensated"
                    );
                    return;
                }
                Err(e) if attempt < COMPENSATION_ATTEMPTS => {
                    tracing::warn!(
                        error = %e,
                        payment_intent_id = intent_id,
                        ?action,
                        attempt,
                        "Payment intent compensation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        payment_intent_id = intent_id,
                        ?action,
                        attempts = COMPENSATION_ATTEMPTS,
                        "Payment intent compensation failed; charge may be unrecorded"
                    );
                    sentry::capture_message(
                        &format!("payment intent {intent_id} could not be undone ({action:?}): {e}"),
                        sentry::Level::Error,
                    );
                }
            }
        }
    }
}
