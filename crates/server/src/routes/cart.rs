//! Cart routes.

use axum::{Json, extract::State};
use serde::Deserialize;

use crate::error::Result;
use crate::models::{Cart, DesiredCartItem, Principal};
use crate::state::AppState;

/// Desired cart contents. Items left out are removed.
#[derive(Debug, Deserialize)]
pub struct UpdateCartRequest {
    pub items: Vec<DesiredCartItem>,
}

/// `GET /api/cart`
pub async fn show(State(state): State<AppState>, principal: Principal) -> Result<Json<Cart>> {
    Ok(Json(state.carts().get_cart(principal.user_id()).await?))
}

/// `PUT /api/cart`
pub async fn update(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<UpdateCartRequest>,
) -> Result<Json<Cart>> {
    let cart = state
        .carts()
        .add_to_cart(principal.user_id(), &body.items)
        .await?;
    Ok(Json(cart))
}
