//! Shared application state handed to every handler.

use std::sync::Arc;

use crate::clients::{captcha::CaptchaVerifier, email::EmailSender, tools::ToolBackend};
use crate::config::Config;
use crate::middleware::auth::Authenticator;
use crate::services::{
    api_key_service::ApiKeyService, gateway::Gateway, keyring::KeyRing,
    otc_service::OneTimeCodeService, token_service::TokenService,
};
use crate::store::Store;

/// Everything a request may need. Cloning is cheap (`Arc`s only) and no
/// field holds per-request mutable state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub keys: KeyRing,
    pub tokens: TokenService,
    pub codes: OneTimeCodeService,
    pub api_keys: ApiKeyService,
    pub authenticator: Authenticator,
    pub gateway: Gateway,
    pub mailer: Arc<dyn EmailSender>,
    pub captcha: Arc<dyn CaptchaVerifier>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        mailer: Arc<dyn EmailSender>,
        captcha: Arc<dyn CaptchaVerifier>,
        tools: Arc<dyn ToolBackend>,
    ) -> Self {
        let keys = KeyRing::new(Arc::clone(&store));
        let tokens = TokenService::new(Arc::clone(&store), keys.clone());
        let codes = OneTimeCodeService::new(Arc::clone(&store), &config.code_hash_key);
        let api_keys = ApiKeyService::new(Arc::clone(&store));
        let authenticator = Authenticator::new(api_keys.clone(), config.auth_secret.clone());
        let gateway = Gateway::new(tools, api_keys.clone());

        Self {
            config: Arc::new(config),
            store,
            keys,
            tokens,
            codes,
            api_keys,
            authenticator,
            gateway,
            mailer,
            captcha,
        }
    }
}
