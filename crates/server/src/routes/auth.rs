//! Account and token routes.
//!
//! The access token is returned in JSON bodies and presented back in the
//! `x-access-token` header. The refresh token only ever travels in the
//! `refresh_token` cookie, scoped to the refresh endpoint.

use axum::{
    Json,
    extract::State,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{COOKIE, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::middleware::ACCESS_TOKEN_HEADER;
use crate::models::{Principal, User, UserSnapshot};
use crate::state::AppState;

/// Name of the refresh token cookie.
pub const REFRESH_COOKIE: &str = "refresh_token";

/// The only path the refresh cookie is sent to.
pub const REFRESH_PATH: &str = "/api/auth/refresh";

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    pub access_token: String,
    pub user: UserSnapshot,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenResponse {
    pub access_token: String,
}

// =============================================================================
// Cookie helpers
// =============================================================================

fn refresh_cookie(state: &AppState, token: &str) -> Result<HeaderValue> {
    let config = &state.config().auth;
    let secure = if config.secure_cookies { "; Secure" } else { "" };
    HeaderValue::from_str(&format!(
        "{REFRESH_COOKIE}={token}; Max-Age={}; Path={REFRESH_PATH}; HttpOnly; SameSite=Strict{secure}",
        config.refresh_token_ttl.as_secs()
    ))
    .map_err(|e| AppError::Internal(format!("invalid cookie value: {e}")))
}

fn cleared_refresh_cookie(state: &AppState) -> HeaderValue {
    if state.config().auth.secure_cookies {
        HeaderValue::from_static(
            "refresh_token=; Max-Age=0; Path=/api/auth/refresh; HttpOnly; SameSite=Strict; Secure",
        )
    } else {
        HeaderValue::from_static(
            "refresh_token=; Max-Age=0; Path=/api/auth/refresh; HttpOnly; SameSite=Strict",
        )
    }
}

/// Value of a cookie from the request's `Cookie` headers.
fn cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

// =============================================================================
// Handlers
// =============================================================================

/// `POST /api/auth/sign-up`
pub async fn sign_up(
    State(state): State<AppState>,
    Json(body): Json<Credentials>,
) -> Result<(StatusCode, Json<User>)> {
    let user = state.auth().sign_up(&body.email, &body.password).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// `POST /api/auth/sign-in`
pub async fn sign_in(
    State(state): State<AppState>,
    Json(body): Json<Credentials>,
) -> Result<Response> {
    let (user, pair) = state.auth().sign_in(&body.email, &body.password).await?;

    let mut response = Json(SignInResponse {
        access_token: pair.access_token,
        user,
    })
    .into_response();
    response
        .headers_mut()
        .insert(SET_COOKIE, refresh_cookie(&state, &pair.refresh_token)?);
    Ok(response)
}

/// `POST /api/auth/refresh`
///
/// Mints a new access token from the refresh cookie. The previous access
/// token may be presented in `x-access-token`, even if expired; it is then
/// checked against the refresh token's pairing.
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AccessTokenResponse>> {
    let refresh_token = cookie(&headers, REFRESH_COOKIE)
        .ok_or_else(|| AppError::Unauthorized("missing refresh token".to_owned()))?;
    let access_token = headers
        .get(ACCESS_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());

    let issued = state.auth().refresh(refresh_token, access_token).await?;
    Ok(Json(AccessTokenResponse {
        access_token: issued.access_token,
    }))
}

/// `POST /api/auth/sign-out`
pub async fn sign_out(State(state): State<AppState>, principal: Principal) -> Result<Response> {
    state.auth().sign_out(&principal).await?;

    let mut response = StatusCode::NO_CONTENT.into_response();
    response
        .headers_mut()
        .insert(SET_COOKIE, cleared_refresh_cookie(&state));
    Ok(response)
}

/// `GET /api/auth/me`
pub async fn me(State(state): State<AppState>, principal: Principal) -> Result<Json<User>> {
    Ok(Json(state.auth().current_user(&principal).await?))
}

/// `POST /api/auth/password`
///
/// Every session of the user ends; the caller receives a fresh pair.
pub async fn change_password(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Response> {
    let pair = state
        .auth()
        .change_password(&principal, &body.current_password, &body.new_password)
        .await?;

    let mut response = Json(AccessTokenResponse {
        access_token: pair.access_token,
    })
    .into_response();
    response
        .headers_mut()
        .insert(SET_COOKIE, refresh_cookie(&state, &pair.refresh_token)?);
    Ok(response)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_lookup() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark; refresh_token=abc.def.ghi"));
        headers.append(COOKIE, HeaderValue::from_static("other=1"));
        assert_eq!(cookie(&headers, REFRESH_COOKIE), Some("abc.def.ghi"));
        assert_eq!(cookie(&headers, "other"), Some("1"));
        assert_eq!(cookie(&headers, "missing"), None);

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("refresh_token="));
        assert_eq!(cookie(&headers, REFRESH_COOKIE), None);
    }
}
