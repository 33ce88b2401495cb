//! Checkout routes.

use axum::{Json, extract::State, http::StatusCode};

use crate::error::Result;
use crate::models::{CheckoutRecord, Principal};
use crate::services::checkout::CheckoutRequest;
use crate::state::AppState;

/// `POST /api/checkout`
///
/// Responds `201` with the record. A `WAITING_3DS` record carries the client
/// secret the customer needs to finish authentication.
pub async fn create(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutRecord>)> {
    let record = state
        .checkout()
        .checkout_cart_items(principal.user_id(), &body)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// `GET /api/checkouts`
pub async fn index(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<CheckoutRecord>>> {
    Ok(Json(
        state.checkout().list_checkouts(principal.user_id()).await?,
    ))
}
