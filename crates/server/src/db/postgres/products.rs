//! Catalogue queries. Soft-deleted products are filtered from every read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use marketstall_core::ProductId;

use super::PgTx;
use crate::db::{ProductRepo, RepoResult};
use crate::models::{NewProduct, Product};

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    name: String,
    description: String,
    image: Option<String>,
    unit_price: Decimal,
    created_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            image: row.image,
            unit_price: row.unit_price,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl ProductRepo for PgTx {
    async fn create_product(&mut self, product: &NewProduct) -> RepoResult<Product> {
        let row: ProductRow = sqlx::query_as(
            r"
            INSERT INTO shop.product (name, description, image, unit_price)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, description, image, unit_price, created_at
            ",
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.image.as_deref())
        .bind(product.unit_price)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row.into())
    }

    async fn products_by_ids(&mut self, ids: &[ProductId]) -> RepoResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            r"
            SELECT id, name, description, image, unit_price, created_at
            FROM shop.product
            WHERE id = ANY($1) AND deleted_at IS NULL
            ORDER BY id
            ",
        )
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn list_products(&mut self, limit: u32, offset: u32) -> RepoResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            r"
            SELECT id, name, description, image, unit_price, created_at
            FROM shop.product
            WHERE deleted_at IS NULL
            ORDER BY id
            LIMIT $1 OFFSET $2
            ",
        )
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }
}
