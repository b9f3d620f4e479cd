//! Captcha verification consulted before a login code is issued.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::http_client;

#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    /// Whether `token` proves a human solved the challenge.
    async fn verify(&self, token: &str) -> bool;
}

/// Cloudflare Turnstile `siteverify` client.
pub struct TurnstileVerifier {
    client: reqwest::Client,
    verify_url: Url,
    secret: String,
}

#[derive(Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

impl TurnstileVerifier {
    pub fn new(verify_url: Url, secret: String) -> Self {
        Self {
            client: http_client(Duration::from_secs(5)),
            verify_url,
            secret,
        }
    }
}

#[async_trait]
impl CaptchaVerifier for TurnstileVerifier {
    async fn verify(&self, token: &str) -> bool {
        let form = [("secret", self.secret.as_str()), ("response", token)];

        let response = match self
            .client
            .post(self.verify_url.clone())
            .form(&form)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!("Captcha verification request failed: {}", e);
                return false;
            }
        };

        match response.json::<SiteVerifyResponse>().await {
            Ok(result) => {
                if !result.success {
                    tracing::info!(codes = ?result.error_codes, "Captcha rejected");
                }
                result.success
            }
            Err(e) => {
                tracing::warn!("Captcha verification response unreadable: {}", e);
                false
            }
        }
    }
}
