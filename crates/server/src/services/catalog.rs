//! Product catalogue.

use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;

use crate::db::{RepositoryError, Store};
use crate::models::{NewProduct, Product};

/// Default page size when the client asks for none.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest page a client may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Errors from catalogue operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{0}")]
    Invalid(String),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
}

impl CatalogService {
    #[must_use]
    pub const fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// One page of live products, oldest first.
    ///
    /// `limit` is clamped to `1..=100` and defaults to 20.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if the store fails.
    pub async fn list_products(
        &self,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<Product>, CatalogError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let mut tx = self.store.begin().await?;
        Ok(tx.list_products(limit, offset.unwrap_or(0)).await?)
    }

    /// Add a product to the catalogue.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Invalid` for a blank name or a negative price.
    #[instrument(skip(self, product), fields(name = %product.name))]
    pub async fn create_product(&self, product: NewProduct) -> Result<Product, CatalogError> {
        let name = product.name.trim();
        if name.is_empty() {
            return Err(CatalogError::Invalid("product name is required".to_owned()));
        }
        if product.unit_price.is_sign_negative() && !product.unit_price.is_zero() {
            return Err(CatalogError::Invalid(
                "unit price cannot be negative".to_owned(),
            ));
        }

        let product = NewProduct {
            name: name.to_owned(),
            unit_price: product.unit_price.round_dp(2),
            ..product
        };

        let mut tx = self.store.begin().await?;
        let created = tx.create_product(&product).await?;
        tx.commit().await?;

        tracing::info!(product_id = %created.id, "Product created");
        Ok(created)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::db::MemoryStore;

    fn product(name: &str, cents: i64) -> NewProduct {
        NewProduct {
            name: name.to_owned(),
            description: "desc".to_owned(),
            image: None,
            unit_price: Decimal::new(cents, 2),
        }
    }

    #[tokio::test]
    async fn test_create_then_list() {
        let catalog = CatalogService::new(Arc::new(MemoryStore::new()));
        let created = catalog.create_product(product("  Mug ", 1250)).await.unwrap();
        assert_eq!(created.name, "Mug");
        assert_eq!(created.unit_price, Decimal::new(1250, 2));

        let listed = catalog.list_products(None, None).await.unwrap();
        assert_eq!(listed, vec![created]);
    }

    #[tokio::test]
    async fn test_rejects_invalid_products() {
        let catalog = CatalogService::new(Arc::new(MemoryStore::new()));
        assert!(matches!(
            catalog.create_product(product(" ", 100)).await,
            Err(CatalogError::Invalid(_))
        ));
        assert!(matches!(
            catalog.create_product(product("Mug", -1)).await,
            Err(CatalogError::Invalid(_))
        ));
        assert!(catalog.list_products(None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pagination_is_clamped() {
        let catalog = CatalogService::new(Arc::new(MemoryStore::new()));
        for n in 0..3 {
            catalog
                .create_product(product(&format!("P{n}"), 100))
                .await
                .unwrap();
        }

        let page = catalog.list_products(Some(0), None).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].name, "P0");

        let page = catalog.list_products(Some(500), Some(1)).await.unwrap();
        assert_eq!(
            page.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            ["P1", "P2"]
        );
    }
}
