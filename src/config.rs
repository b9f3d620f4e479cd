//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;
use url::Url;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `DATABASE_MAX_CONNECTIONS` (optional): pool size, defaults to 10
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `AUTH_SECRET` (optional): administrative bearer secret
/// - `CODE_HASH_KEY` (required): HMAC key for one-time code hashes
/// - `EMAIL_API_KEY` (required), `EMAIL_API_URL`, `EMAIL_FROM`
/// - `CAPTCHA_SECRET` (required), `CAPTCHA_VERIFY_URL`
/// - `TOOL_BACKEND_URL` (required): base URL of the tool handler service
/// - `COOKIE_SECURE` (optional): defaults to true
#[derive(Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_port")]
    pub server_port: u16,

    /// Shared secret for internal/administrative calls.
    ///
    /// When unset, no bearer token is ever treated as the admin secret.
    #[serde(default)]
    pub auth_secret: Option<String>,

    /// Key for HMAC-SHA256 hashing of one-time codes.
    ///
    /// Every instance must share the same value or codes issued by one
    /// instance will not verify on another.
    pub code_hash_key: String,

    pub email_api_key: String,

    #[serde(default = "default_email_api_url")]
    pub email_api_url: Url,

    #[serde(default = "default_email_from")]
    pub email_from: String,

    pub captcha_secret: String,

    #[serde(default = "default_captcha_verify_url")]
    pub captcha_verify_url: Url,

    pub tool_backend_url: Url,

    /// Whether session cookies carry the `Secure` attribute.
    #[serde(default = "default_cookie_secure")]
    pub cookie_secure: bool,
}

fn default_max_connections() -> u32 {
    10
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_email_api_url() -> Url {
    Url::parse("https://api.resend.com/emails").expect("static URL is valid")
}

fn default_email_from() -> String {
    "ARBuilder <noreply@whymelabs.com>".to_string()
}

fn default_captcha_verify_url() -> Url {
    Url::parse("https://challenges.cloudflare.com/turnstile/v0/siteverify")
        .expect("static URL is valid")
}

fn default_cookie_secure() -> bool {
    true
}

// Secrets stay out of debug output.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_max_connections", &self.database_max_connections)
            .field("server_port", &self.server_port)
            .field("auth_secret", &self.auth_secret.as_ref().map(|_| "<redacted>"))
            .field("email_api_url", &self.email_api_url.as_str())
            .field("email_from", &self.email_from)
            .field("captcha_verify_url", &self.captcha_verify_url.as_str())
            .field("tool_backend_url", &self.tool_backend_url.as_str())
            .field("cookie_secure", &self.cookie_secure)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();

        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }
}
