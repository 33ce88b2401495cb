//! Cart and cart item queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use marketstall_core::{CartId, CartItemId, CartStatus, ProductId, UserId};

use super::{PgTx, conflict_or_database, quantity_from_db, quantity_to_db};
use crate::db::{CartRepo, RepoResult};
use crate::models::{CartItem, CartLine, CartRow, NewCartItem, Product};

#[derive(sqlx::FromRow)]
struct CartDbRow {
    id: CartId,
    user_id: UserId,
    status: CartStatus,
}

impl From<CartDbRow> for CartRow {
    fn from(row: CartDbRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            status: row.status,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    id: CartItemId,
    cart_id: CartId,
    product_id: ProductId,
    quantity: i32,
    user_id: UserId,
}

impl TryFrom<CartItemRow> for CartItem {
    type Error = crate::db::RepositoryError;

    fn try_from(row: CartItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            cart_id: row.cart_id,
            product_id: row.product_id,
            quantity: quantity_from_db(row.quantity)?,
            user_id: row.user_id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CartLineRow {
    #[sqlx(flatten)]
    item: CartItemRow,
    name: String,
    description: String,
    image: Option<String>,
    unit_price: Decimal,
    product_created_at: DateTime<Utc>,
}

impl TryFrom<CartLineRow> for CartLine {
    type Error = crate::db::RepositoryError;

    fn try_from(row: CartLineRow) -> Result<Self, Self::Error> {
        let item = CartItem::try_from(row.item)?;
        let product = Product {
            id: item.product_id,
            name: row.name,
            description: row.description,
            image: row.image,
            unit_price: row.unit_price,
            created_at: row.product_created_at,
        };
        Ok(Self { item, product })
    }
}

fn items(rows: Vec<CartItemRow>) -> RepoResult<Vec<CartItem>> {
    rows.into_iter().map(CartItem::try_from).collect()
}

fn lines(rows: Vec<CartLineRow>) -> RepoResult<Vec<CartLine>> {
    rows.into_iter().map(CartLine::try_from).collect()
}

#[async_trait]
impl CartRepo for PgTx {
    async fn active_cart(&mut self, user_id: UserId) -> RepoResult<Option<CartRow>> {
        let row: Option<CartDbRow> = sqlx::query_as(
            r"
            SELECT id, user_id, status
            FROM shop.cart
            WHERE user_id = $1 AND status = 'active'
            ",
        )
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(CartRow::from))
    }

    async fn lock_or_create_active_cart(&mut self, user_id: UserId) -> RepoResult<CartRow> {
        // A concurrent inserter blocks on the partial unique index until the
        // first transaction commits, then falls through to the locking read.
        sqlx::query(
            r"
            INSERT INTO shop.cart (user_id, status)
            VALUES ($1, 'active')
            ON CONFLICT (user_id) WHERE status = 'active' DO NOTHING
            ",
        )
        .bind(user_id)
        .execute(&mut *self.tx)
        .await?;

        let row: CartDbRow = sqlx::query_as(
            r"
            SELECT id, user_id, status
            FROM shop.cart
            WHERE user_id = $1 AND status = 'active'
            FOR UPDATE
            ",
        )
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row.into())
    }

    async fn cart_items_by_ids(
        &mut self,
        user_id: UserId,
        ids: &[CartItemId],
    ) -> RepoResult<Vec<CartItem>> {
        let rows: Vec<CartItemRow> = sqlx::query_as(
            r"
            SELECT id, cart_id, product_id, quantity, user_id
            FROM shop.cart_item
            WHERE id = ANY($1) AND user_id = $2
            ORDER BY id
            ",
        )
        .bind(ids)
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;

        items(rows)
    }

    async fn cart_items(&mut self, cart_id: CartId) -> RepoResult<Vec<CartItem>> {
        let rows: Vec<CartItemRow> = sqlx::query_as(
            r"
            SELECT id, cart_id, product_id, quantity, user_id
            FROM shop.cart_item
            WHERE cart_id = $1
            ORDER BY id
            ",
        )
        .bind(cart_id)
        .fetch_all(&mut *self.tx)
        .await?;

        items(rows)
    }

    async fn cart_lines(&mut self, cart_id: CartId) -> RepoResult<Vec<CartLine>> {
        let rows: Vec<CartLineRow> = sqlx::query_as(
            r"
            SELECT ci.id, ci.cart_id, ci.product_id, ci.quantity, ci.user_id,
                   p.name, p.description, p.image, p.unit_price,
                   p.created_at AS product_created_at
            FROM shop.cart_item ci
            JOIN shop.product p ON p.id = ci.product_id
            WHERE ci.cart_id = $1 AND p.deleted_at IS NULL
            ORDER BY ci.id
            ",
        )
        .bind(cart_id)
        .fetch_all(&mut *self.tx)
        .await?;

        lines(rows)
    }

    async fn delete_cart_items(&mut self, ids: &[CartItemId]) -> RepoResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM shop.cart_item WHERE id = ANY($1)")
            .bind(ids)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn insert_cart_item(&mut self, item: NewCartItem) -> RepoResult<CartItem> {
        let row: CartItemRow = sqlx::query_as(
            r"
            INSERT INTO shop.cart_item (id, cart_id, product_id, quantity, user_id)
            VALUES (
                COALESCE($1, nextval(pg_get_serial_sequence('shop.cart_item', 'id'))::INTEGER),
                $2, $3, $4, $5
            )
            RETURNING id, cart_id, product_id, quantity, user_id
            ",
        )
        .bind(item.id)
        .bind(item.cart_id)
        .bind(item.product_id)
        .bind(quantity_to_db(item.quantity)?)
        .bind(item.user_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| conflict_or_database(e, "product already in cart"))?;

        CartItem::try_from(row)
    }

    async fn lock_checkout_lines(
        &mut self,
        user_id: UserId,
        ids: &[CartItemId],
    ) -> RepoResult<Vec<CartLine>> {
        let rows: Vec<CartLineRow> = sqlx::query_as(
            r"
            SELECT ci.id, ci.cart_id, ci.product_id, ci.quantity, ci.user_id,
                   p.name, p.description, p.image, p.unit_price,
                   p.created_at AS product_created_at
            FROM shop.cart_item ci
            JOIN shop.product p ON p.id = ci.product_id
            WHERE ci.id = ANY($1) AND ci.user_id = $2 AND p.deleted_at IS NULL
            ORDER BY ci.id
            FOR NO KEY UPDATE OF ci
            ",
        )
        .bind(ids)
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;

        lines(rows)
    }
}
