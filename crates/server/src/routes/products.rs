//! Catalogue routes.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::Deserialize;

use crate::error::Result;
use crate::models::{NewProduct, Product};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct Page {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// `GET /api/products?limit=&offset=`
pub async fn index(
    State(state): State<AppState>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Product>>> {
    Ok(Json(
        state.catalog().list_products(page.limit, page.offset).await?,
    ))
}

/// `POST /api/products` (admin)
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>)> {
    let product = state.catalog().create_product(body).await?;
    Ok((StatusCode::CREATED, Json(product)))
}
