//! Shared harness for router-level tests.
//!
//! Builds the full router on a [`MemoryStore`] with in-process doubles for
//! the mailer, captcha and tool backend.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use credential_gateway::{
    AppState, build_router,
    clients::{
        captcha::CaptchaVerifier,
        email::EmailSender,
        tools::{ToolBackend, ToolError},
    },
    config::Config,
    models::tool::{ToolCall, ToolOutput},
    store::MemoryStore,
};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;

pub const ADMIN_SECRET: &str = "test-admin-secret";
pub const CAPTCHA_PASS: &str = "captcha-ok";

/// Mailer that keeps every code it was asked to send.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl RecordingMailer {
    pub fn last_code(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, code)| code.clone())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmailSender for RecordingMailer {
    async fn send_code(&self, email: &str, code: &str) -> bool {
        if self.fail.load(Ordering::SeqCst) {
            return false;
        }
        self.sent.lock().push((email.to_string(), code.to_string()));
        true
    }
}

/// Accepts exactly [`CAPTCHA_PASS`].
pub struct StaticCaptcha;

#[async_trait]
impl CaptchaVerifier for StaticCaptcha {
    async fn verify(&self, token: &str) -> bool {
        token == CAPTCHA_PASS
    }
}

/// Tool backend answering every call with a fixed shape.
///
/// `ask_stylus` with the question `"fail"` errors.
pub struct FakeTools;

#[async_trait]
impl ToolBackend for FakeTools {
    async fn call(&self, call: &ToolCall) -> Result<ToolOutput, ToolError> {
        if let ToolCall::AskStylus(args) = call {
            if args.question == "fail" {
                return Err(ToolError::Backend {
                    status: 503,
                    message: "model unavailable".to_string(),
                });
            }
        }
        Ok(ToolOutput {
            data: Value::String(format!("result from {}", call.name())),
            tokens_used: Some(11),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: MemoryStore,
    pub mailer: Arc<RecordingMailer>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// Values of every `Set-Cookie` header.
    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    /// Value a `Set-Cookie` header assigns to `name`.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.set_cookies().iter().find_map(|cookie| {
            let (pair, _) = cookie.split_once(';').unwrap_or((cookie.as_str(), ""));
            let (key, value) = pair.split_once('=')?;
            (key == name).then(|| value.to_string())
        })
    }
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://unused/test".to_string(),
        database_max_connections: 1,
        server_port: 0,
        auth_secret: Some(ADMIN_SECRET.to_string()),
        code_hash_key: "test-code-pepper".to_string(),
        email_api_key: "unused".to_string(),
        email_api_url: Url::parse("http://mail.invalid/emails").unwrap(),
        email_from: "Test <test@example.com>".to_string(),
        captcha_secret: "unused".to_string(),
        captcha_verify_url: Url::parse("http://captcha.invalid/verify").unwrap(),
        tool_backend_url: Url::parse("http://tools.invalid/").unwrap(),
        cookie_secure: true,
    }
}

pub fn spawn_app() -> TestApp {
    let store = MemoryStore::new();
    let mailer = Arc::new(RecordingMailer::default());
    let state = AppState::new(
        test_config(),
        Arc::new(store.clone()),
        mailer.clone(),
        Arc::new(StaticCaptcha),
        Arc::new(FakeTools),
    );

    TestApp {
        router: build_router(state.clone()),
        state,
        store,
        mailer,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Full login: send a code, read it from the mailer, redeem it.
    ///
    /// Returns `(access_token, refresh_token, user_id)`.
    pub async fn login(&self, email: &str) -> (String, String, String) {
        let sent = self
            .send(json_request(
                "POST",
                "/api/auth/send-code",
                json!({ "email": email, "captcha_token": CAPTCHA_PASS }),
            ))
            .await;
        assert_eq!(sent.status, StatusCode::OK, "send-code: {}", sent.body);

        let code = self.mailer.last_code(&email.trim().to_lowercase()).unwrap();
        let verified = self
            .send(json_request(
                "POST",
                "/api/auth/verify-code",
                json!({ "email": email, "code": code }),
            ))
            .await;
        assert_eq!(verified.status, StatusCode::OK, "verify-code: {}", verified.body);

        (
            verified.cookie("auth-token").unwrap(),
            verified.cookie("refresh-token").unwrap(),
            verified.body["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    /// Create an API key for the session behind `access_token`.
    pub async fn create_api_key(&self, access_token: &str) -> (String, String) {
        let response = self
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/api/keys")
                    .header(header::COOKIE, format!("auth-token={}", access_token))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({ "name": "test" }).to_string()))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);

        (
            response.body["key"].as_str().unwrap().to_string(),
            response.body["id"].as_str().unwrap().to_string(),
        )
    }
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn cookie_request(method: &str, uri: &str, cookies: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, cookies)
        .body(Body::empty())
        .unwrap()
}

pub fn bearer_request(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}
