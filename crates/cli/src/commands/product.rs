//! Catalogue management.

use std::str::FromStr;
use std::sync::Arc;

use marketstall_server::models::NewProduct;
use marketstall_server::services::catalog::CatalogService;
use rust_decimal::Decimal;

use super::{CliError, store};

/// Create a product and return its id.
pub async fn create(
    name: String,
    price: &str,
    description: String,
    image: Option<String>,
) -> Result<i32, CliError> {
    let unit_price = Decimal::from_str(price)
        .map_err(|e| CliError::InvalidArgument("price", e.to_string()))?;

    let catalog = CatalogService::new(Arc::new(store().await?));
    let product = catalog
        .create_product(NewProduct {
            name,
            description,
            image,
            unit_price,
        })
        .await?;

    tracing::info!("Product created with ID: {} ({})", product.id, product.unit_price);
    Ok(product.id.as_i32())
}
