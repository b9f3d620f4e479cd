//! Email delivery of one-time login codes.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use super::http_client;

/// Delivers a login code to an email address.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Send `code` to `email`. Returns false if delivery was not accepted.
    async fn send_code(&self, email: &str, code: &str) -> bool;
}

/// Sends codes through the Resend HTTP API.
pub struct ResendMailer {
    client: reqwest::Client,
    api_url: Url,
    api_key: String,
    from: String,
}

#[derive(Serialize)]
struct SendEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: String,
    text: String,
}

impl ResendMailer {
    pub fn new(api_url: Url, api_key: String, from: String) -> Self {
        Self {
            client: http_client(Duration::from_secs(10)),
            api_url,
            api_key,
            from,
        }
    }
}

/// Plain-text body of the login email.
pub fn code_message(code: &str) -> String {
    format!(
        "Your ARBuilder verification code is: {}\n\n\
         This code expires in 10 minutes.\n\n\
         If you didn't request this code, you can safely ignore this email.",
        code
    )
}

#[async_trait]
impl EmailSender for ResendMailer {
    async fn send_code(&self, email: &str, code: &str) -> bool {
        let body = SendEmail {
            from: &self.from,
            to: [email],
            subject: format!("Your ARBuilder verification code: {}", code),
            text: code_message(code),
        };

        let response = self
            .client
            .post(self.api_url.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::error!("Email API rejected message with status {}", resp.status());
                false
            }
            Err(e) => {
                tracing::error!("Failed to send login code email: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_contains_code_and_expiry() {
        let message = code_message("042917");
        assert!(message.contains("042917"));
        assert!(message.contains("10 minutes"));
    }
}
