//! Clients for collaborators outside the authentication core.
//!
//! Each collaborator sits behind a narrow trait so handlers never depend on
//! a concrete HTTP API, and tests can substitute in-process doubles.

/// Captcha verification before code issuance
pub mod captcha;
/// Transactional email delivery of login codes
pub mod email;
/// Tool handlers invoked by the protocol gateway
pub mod tools;

use std::time::Duration;

/// Shared HTTP client settings for collaborator calls.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Falling back to default HTTP client: {}", e);
            reqwest::Client::new()
        })
}
