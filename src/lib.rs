//! Credential gateway.
//!
//! Authentication core for a developer-API platform: browser users log in
//! with emailed one-time codes and hold Ed25519-signed session tokens in
//! cookies; programmatic callers present long-lived API keys to the tool
//! endpoints and the JSON-RPC protocol gateway, which meters every call.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum
//! - **Storage**: PostgreSQL with sqlx behind the [`store::Store`] traits
//! - **Tokens**: EdDSA (Ed25519) JWTs with `kid`-addressed, rotating keys
//! - **Secrets at rest**: SHA-256 (refresh tokens, API keys), HMAC-SHA256
//!   (one-time codes)

pub mod clients;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;
pub mod store;

use axum::{
    Router,
    http::{Method, header},
    middleware as axum_middleware,
    routing::{delete, get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use state::AppState;

/// Build the full HTTP router.
///
/// # Route groups
///
/// - Public: health, JWKS, OTC login and cookie-session endpoints (the
///   session endpoints authenticate through the `auth-token` cookie)
/// - Dispatcher-protected: REST tool calls and admin endpoints
///   (`Authorization: Bearer <api key | admin secret>`)
/// - Gateway: `/mcp`, which authenticates itself so failures come back as
///   JSON-RPC errors, with CORS for remote clients
pub fn build_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/api/v1/tools/{tool}", post(handlers::tools::call_tool))
        .route(
            "/api/admin/keys/rotate",
            post(handlers::admin::rotate_signing_key),
        )
        .route(
            "/api/admin/keys/{kid}",
            delete(handlers::admin::revoke_signing_key),
        )
        .route("/api/admin/cleanup", post(handlers::admin::cleanup))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    let gateway_routes = Router::new()
        .route(
            "/mcp",
            get(handlers::mcp::server_info).post(handlers::mcp::handle_rpc),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        );

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/.well-known/jwks.json", get(handlers::admin::jwks))
        .route("/api/auth/send-code", post(handlers::auth::send_code))
        .route("/api/auth/verify-code", post(handlers::auth::verify_code))
        .route("/api/auth/session", get(handlers::auth::get_session))
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route(
            "/api/keys",
            get(handlers::keys::list_keys).post(handlers::keys::create_key),
        )
        .route("/api/keys/{id}", delete(handlers::keys::revoke_key))
        .route("/api/usage", get(handlers::usage::get_usage))
        .merge(protected_routes)
        .merge(gateway_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
