//! Browser sessions carried in cookies.
//!
//! `auth-token` holds the access token (15 minutes), `refresh-token` the
//! refresh token (7 days). Both are HttpOnly, SameSite=Lax and scoped to
//! `/`; `Secure` follows `COOKIE_SECURE`.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};

use crate::{
    error::AppError,
    models::{
        token::{TokenKind, TokenPair},
        user::User,
    },
    services::token_service::{ACCESS_TOKEN_TTL_SECS, REFRESH_TOKEN_TTL_SECS},
    state::AppState,
};

pub const ACCESS_COOKIE: &str = "auth-token";
pub const REFRESH_COOKIE: &str = "refresh-token";

/// Value of cookie `name` from the request's `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` headers establishing a session from `pair`.
pub fn session_cookies(pair: &TokenPair, secure: bool) -> [(header::HeaderName, String); 2] {
    [
        (
            header::SET_COOKIE,
            cookie(ACCESS_COOKIE, &pair.access_token, ACCESS_TOKEN_TTL_SECS, secure),
        ),
        (
            header::SET_COOKIE,
            cookie(REFRESH_COOKIE, &pair.refresh_token, REFRESH_TOKEN_TTL_SECS, secure),
        ),
    ]
}

/// `Set-Cookie` headers deleting both session cookies.
pub fn cleared_cookies(secure: bool) -> [(header::HeaderName, String); 2] {
    [
        (header::SET_COOKIE, cookie(ACCESS_COOKIE, "", 0, secure)),
        (header::SET_COOKIE, cookie(REFRESH_COOKIE, "", 0, secure)),
    ]
}

fn cookie(name: &str, value: &str, max_age: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        name, value, max_age
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// The user behind a valid `auth-token` cookie.
///
/// Rejects with the generic 401 when the cookie is missing, the token does
/// not verify as an access token, or the user no longer exists.
#[derive(Debug, Clone)]
pub struct SessionUser(pub User);

impl FromRequestParts<AppState> for SessionUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = read_cookie(&parts.headers, ACCESS_COOKIE).ok_or(AppError::Unauthorized)?;
        let claims = state
            .tokens
            .verify_kind(&token, TokenKind::Access)
            .await
            .ok_or(AppError::Unauthorized)?;

        let user = state
            .store
            .find_user(claims.sub)
            .await?
            .ok_or(AppError::Unauthorized)?;

        Ok(SessionUser(user))
    }
}
