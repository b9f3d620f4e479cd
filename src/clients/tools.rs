//! Tool handler backend.
//!
//! Retrieval, code generation, test generation and workflow lookup live in a
//! separate service. The gateway hands it a validated [`ToolCall`] and gets
//! back data plus the number of LLM tokens spent.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use super::http_client;
use crate::models::tool::{ToolCall, ToolOutput};

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool backend request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("tool backend returned {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("{0}")]
    Failed(String),
}

#[async_trait]
pub trait ToolBackend: Send + Sync {
    async fn call(&self, call: &ToolCall) -> Result<ToolOutput, ToolError>;
}

/// Forwards tool calls over HTTP.
///
/// `POST {base}/tools/{name}` with body `{"name": ..., "arguments": {...}}`,
/// expecting `{"data": ..., "tokens_used": n}` back.
pub struct HttpToolBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpToolBackend {
    pub fn new(mut base_url: Url) -> Self {
        // `join` replaces the last segment unless the path ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            // LLM-backed tools can take a while
            client: http_client(Duration::from_secs(120)),
            base_url,
        }
    }

    fn endpoint(&self, tool: &str) -> Result<Url, ToolError> {
        self.base_url
            .join(&format!("tools/{}", tool))
            .map_err(|e| ToolError::Failed(format!("invalid tool backend URL: {}", e)))
    }
}

#[async_trait]
impl ToolBackend for HttpToolBackend {
    async fn call(&self, call: &ToolCall) -> Result<ToolOutput, ToolError> {
        let response = self
            .client
            .post(self.endpoint(call.name())?)
            .json(call)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ToolError::Backend {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<ToolOutput>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_tool_name() {
        let backend = HttpToolBackend::new(Url::parse("http://tools.internal:8787/").unwrap());
        assert_eq!(
            backend.endpoint("ask_stylus").unwrap().as_str(),
            "http://tools.internal:8787/tools/ask_stylus"
        );
    }

    #[test]
    fn endpoint_keeps_base_path_without_trailing_slash() {
        let backend = HttpToolBackend::new(Url::parse("http://tools.internal/api").unwrap());
        assert_eq!(
            backend.endpoint("ask_stylus").unwrap().as_str(),
            "http://tools.internal/api/tools/ask_stylus"
        );
    }
}
