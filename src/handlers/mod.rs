//! HTTP request handlers (route handlers).
//!
//! Handlers translate between HTTP and the services; credential rules live
//! in [`crate::services`].

/// Signing key administration and JWKS
pub mod admin;
/// One-time-code login and session cookies
pub mod auth;
pub mod health;
/// API key management
pub mod keys;
/// JSON-RPC protocol gateway
pub mod mcp;
pub mod tools;
pub mod usage;
