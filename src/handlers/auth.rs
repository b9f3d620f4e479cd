//! Browser login and session endpoints.
//!
//! - POST /api/auth/send-code - Email a one-time code
//! - POST /api/auth/verify-code - Redeem the code, start a session
//! - GET /api/auth/session - Current user, renewing from the refresh cookie
//! - POST /api/auth/refresh - Rotate the token pair
//! - POST /api/auth/logout - Revoke refresh tokens and clear cookies

use axum::{
    Json,
    extract::State,
    http::HeaderMap,
    response::{AppendHeaders, IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;

use crate::{
    error::AppError,
    middleware::session::{
        ACCESS_COOKIE, REFRESH_COOKIE, cleared_cookies, read_cookie, session_cookies,
    },
    models::{
        one_time_code::{SendCodeRequest, SendCodeResponse, VerifyCodeRequest, is_well_formed_code},
        token::{TokenKind, TokenSubject},
        user::{SessionResponse, UserResponse, is_plausible_email, normalize_email},
    },
    state::AppState,
};

/// Email a login code.
///
/// # Endpoint
///
/// `POST /api/auth/send-code`
///
/// # Request Body
///
/// ```json
/// {
///   "email": "user@example.com",
///   "captcha_token": "0.abc..."
/// }
/// ```
///
/// # Process
///
/// 1. Validate the email shape
/// 2. Verify the captcha token (before any rate limiting or code generation)
/// 3. Issue a code, unless the address already received 5 in the last hour
/// 4. Deliver the code by email
///
/// # Response
///
/// - **Success (200 OK)**: `{"success": true, "message": "...", "expires_at": "..."}`
/// - **Error (400)**: Invalid email, missing or failed captcha
/// - **Error (429)**: Too many codes requested
/// - **Error (502)**: Email delivery failed
pub async fn send_code(
    State(state): State<AppState>,
    Json(request): Json<SendCodeRequest>,
) -> Result<Json<SendCodeResponse>, AppError> {
    let email = request
        .email
        .as_deref()
        .filter(|email| is_plausible_email(email))
        .map(normalize_email)
        .ok_or_else(|| AppError::Validation("Valid email is required".to_string()))?;

    let captcha_token = request
        .captcha_token
        .as_deref()
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Validation("Captcha verification required".to_string()))?;

    if !state.captcha.verify(captcha_token).await {
        return Err(AppError::Validation("Captcha verification failed".to_string()));
    }

    let issued = state
        .codes
        .create(&email)
        .await?
        .ok_or(AppError::RateLimited)?;

    if !state.mailer.send_code(&email, &issued.code).await {
        return Err(AppError::Upstream(
            "Failed to send verification email".to_string(),
        ));
    }

    tracing::info!(email = %email, "Sent one-time code");

    Ok(Json(SendCodeResponse {
        success: true,
        message: "Verification code sent".to_string(),
        expires_at: issued.expires_at,
    }))
}

/// Redeem a login code and start a session.
///
/// # Endpoint
///
/// `POST /api/auth/verify-code`
///
/// # Request Body
///
/// ```json
/// {
///   "email": "user@example.com",
///   "code": "042917"
/// }
/// ```
///
/// # Process
///
/// 1. Require an email and a six-digit code
/// 2. Redeem the code (single use, 10 minute lifetime)
/// 3. Find or create the user
/// 4. Issue an access/refresh pair and set both cookies
///
/// # Response
///
/// - **Success (200 OK)**: `{"success": true, "user": {...}}` with `Set-Cookie`
/// - **Error (400)**: Missing fields or malformed code
/// - **Error (401)**: Wrong, used or expired code
pub async fn verify_code(
    State(state): State<AppState>,
    Json(request): Json<VerifyCodeRequest>,
) -> Result<Response, AppError> {
    let (Some(email), Some(code)) = (request.email.as_deref(), request.code.as_deref()) else {
        return Err(AppError::Validation(
            "Email and code are required".to_string(),
        ));
    };
    let code = code.trim();
    if !is_well_formed_code(code) {
        return Err(AppError::Validation(
            "Invalid verification code format".to_string(),
        ));
    }

    let email = normalize_email(email);
    if !state.codes.verify(&email, code).await? {
        return Err(AppError::Unauthorized);
    }

    let user = state.store.find_or_create_user(&email, Utc::now()).await?;
    let pair = state
        .tokens
        .create_pair(&TokenSubject {
            user_id: user.id,
            email: user.email.clone(),
        })
        .await?;

    tracing::info!(user_id = %user.id, "Session started");

    Ok((
        AppendHeaders(session_cookies(&pair, state.config.cookie_secure)),
        Json(json!({
            "success": true,
            "user": UserResponse::from(user),
        })),
    )
        .into_response())
}

/// Current session.
///
/// # Endpoint
///
/// `GET /api/auth/session`
///
/// # Process
///
/// 1. A valid access cookie → its user
/// 2. Else a valid refresh cookie → rotate the pair, set new cookies, `refreshed: true`
/// 3. Else (or on any failure) → `{"user": null}`
///
/// Never fails; a broken session looks like no session.
pub async fn get_session(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match resolve_session(&state, &headers).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("Session lookup failed: {}", e);
            Json(SessionResponse::anonymous()).into_response()
        }
    }
}

async fn resolve_session(state: &AppState, headers: &HeaderMap) -> Result<Response, AppError> {
    if let Some(token) = read_cookie(headers, ACCESS_COOKIE) {
        if let Some(claims) = state.tokens.verify_kind(&token, TokenKind::Access).await {
            if let Some(user) = state.store.find_user(claims.sub).await? {
                return Ok(Json(SessionResponse {
                    user: Some(user.into()),
                    refreshed: None,
                })
                .into_response());
            }
        }
    }

    let Some(refresh_token) = read_cookie(headers, REFRESH_COOKIE) else {
        return Ok(Json(SessionResponse::anonymous()).into_response());
    };
    let Some(claims) = state
        .tokens
        .verify_kind(&refresh_token, TokenKind::Refresh)
        .await
    else {
        return Ok(Json(SessionResponse::anonymous()).into_response());
    };
    let Some(user) = state.store.find_user(claims.sub).await? else {
        return Ok(Json(SessionResponse::anonymous()).into_response());
    };
    let Some(pair) = state.tokens.refresh(&refresh_token).await? else {
        return Ok(Json(SessionResponse::anonymous()).into_response());
    };

    Ok((
        AppendHeaders(session_cookies(&pair, state.config.cookie_secure)),
        Json(SessionResponse {
            user: Some(user.into()),
            refreshed: Some(true),
        }),
    )
        .into_response())
}

/// Rotate the session's token pair.
///
/// # Endpoint
///
/// `POST /api/auth/refresh`
///
/// # Response
///
/// - **Success (200 OK)**: `{"success": true}` with new cookies
/// - **Error (401)**: Missing, invalid or already used refresh token; both
///   cookies are cleared
pub async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, AppError> {
    let secure = state.config.cookie_secure;
    let Some(refresh_token) = read_cookie(&headers, REFRESH_COOKIE) else {
        return Ok(unauthorized_clearing(secure));
    };

    match state.tokens.refresh(&refresh_token).await? {
        Some(pair) => Ok((
            AppendHeaders(session_cookies(&pair, secure)),
            Json(json!({ "success": true })),
        )
            .into_response()),
        None => Ok(unauthorized_clearing(secure)),
    }
}

fn unauthorized_clearing(secure: bool) -> Response {
    (AppendHeaders(cleared_cookies(secure)), AppError::Unauthorized).into_response()
}

/// End the session.
///
/// # Endpoint
///
/// `POST /api/auth/logout`
///
/// Revokes every refresh token of the user named by the access cookie (or,
/// failing that, the refresh cookie) and clears both cookies. Revocation
/// errors are logged and ignored; the response is always 200.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let access = match read_cookie(&headers, ACCESS_COOKIE) {
        Some(token) => state.tokens.verify_kind(&token, TokenKind::Access).await,
        None => None,
    };
    let claims = match access {
        Some(claims) => Some(claims),
        None => match read_cookie(&headers, REFRESH_COOKIE) {
            Some(token) => state.tokens.verify_kind(&token, TokenKind::Refresh).await,
            None => None,
        },
    };

    if let Some(claims) = claims {
        if let Err(e) = state.tokens.revoke_all_refresh_tokens(claims.sub).await {
            tracing::warn!(user_id = %claims.sub, "Failed to revoke refresh tokens: {}", e);
        }
    }

    (
        AppendHeaders(cleared_cookies(state.config.cookie_secure)),
        Json(json!({ "success": true })),
    )
}
