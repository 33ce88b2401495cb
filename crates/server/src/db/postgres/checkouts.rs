//! Checkout record queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;

use marketstall_core::{CheckoutId, CheckoutStatus, CurrencyCode, UserId};

use super::{PgTx, conflict_or_database};
use crate::db::{CheckoutRepo, RepoResult, RepositoryError};
use crate::models::{CheckoutRecord, NewCheckout, ProductSnapshot};

#[derive(sqlx::FromRow)]
struct CheckoutRow {
    id: CheckoutId,
    user_id: UserId,
    total_price: Decimal,
    currency: String,
    status: CheckoutStatus,
    products: Json<Vec<ProductSnapshot>>,
    payment_intent_id: String,
    client_secret: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<CheckoutRow> for CheckoutRecord {
    type Error = RepositoryError;

    fn try_from(row: CheckoutRow) -> Result<Self, Self::Error> {
        let currency: CurrencyCode = row.currency.parse().map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid currency in database: {e}"))
        })?;

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            total_price: row.total_price,
            currency,
            status: row.status,
            products: row.products.0,
            payment_intent_id: row.payment_intent_id,
            client_secret: row.client_secret,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl CheckoutRepo for PgTx {
    async fn insert_checkout(&mut self, checkout: &NewCheckout) -> RepoResult<CheckoutRecord> {
        let row: CheckoutRow = sqlx::query_as(
            r"
            INSERT INTO shop.checkout
                (user_id, total_price, currency, status, products, payment_intent_id, client_secret)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_id, total_price, currency, status, products,
                      payment_intent_id, client_secret, created_at
            ",
        )
        .bind(checkout.user_id)
        .bind(checkout.total_price)
        .bind(checkout.currency.code())
        .bind(checkout.status)
        .bind(Json(&checkout.products))
        .bind(&checkout.payment_intent_id)
        .bind(checkout.client_secret.as_deref())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| conflict_or_database(e, "payment intent already recorded"))?;

        CheckoutRecord::try_from(row)
    }

    async fn checkouts_for_user(&mut self, user_id: UserId) -> RepoResult<Vec<CheckoutRecord>> {
        let rows: Vec<CheckoutRow> = sqlx::query_as(
            r"
            SELECT id, user_id, total_price, currency, status, products,
                   payment_intent_id, client_secret, created_at
            FROM shop.checkout
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            ",
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(CheckoutRecord::try_from).collect()
    }
}
