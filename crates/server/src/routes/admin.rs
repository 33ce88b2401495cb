//! Administration routes.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;

use marketstall_core::UserId;

use crate::error::Result;
use crate::models::Principal;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RevokedSessions {
    pub revoked: usize,
}

/// `DELETE /api/admin/users/{id}/sessions`
///
/// Signs a user out everywhere.
pub async fn revoke_sessions(
    State(state): State<AppState>,
    admin: Principal,
    Path(user_id): Path<UserId>,
) -> Result<Json<RevokedSessions>> {
    let revoked = state.auth().revoke_all_sessions(user_id).await?;
    tracing::info!(admin_id = %admin.user_id(), user_id = %user_id, revoked, "Sessions revoked");
    Ok(Json(RevokedSessions { revoked }))
}
