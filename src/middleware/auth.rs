//! Request authentication dispatcher.
//!
//! Every protected endpoint resolves its caller through one decision
//! procedure:
//! 1. Missing or malformed `Authorization: Bearer <token>` header → 401
//! 2. Token starts with `arb_` → API key lookup
//! 3. Otherwise → constant-time comparison with the admin secret
//! 4. No match → 401
//!
//! Every rejection carries the same generic message.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::{
    error::AppError,
    services::api_key_service::{API_KEY_PREFIX, ApiKeyService},
    state::AppState,
};

/// An authenticated caller.
///
/// Inserted into request extensions by [`auth_middleware`]; handlers extract
/// it with `Extension<Principal>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    /// Holder of a non-revoked API key.
    ApiKey { user_id: Uuid, key_id: Uuid },

    /// Internal caller presenting the admin secret. Has no user.
    Admin,
}

impl Principal {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Principal::ApiKey { user_id, .. } => Some(*user_id),
            Principal::Admin => None,
        }
    }

    pub fn key_id(&self) -> Option<Uuid> {
        match self {
            Principal::ApiKey { key_id, .. } => Some(*key_id),
            Principal::Admin => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Principal::Admin)
    }
}

#[derive(Clone)]
pub struct Authenticator {
    api_keys: ApiKeyService,
    admin_secret: Option<String>,
}

impl Authenticator {
    pub fn new(api_keys: ApiKeyService, admin_secret: Option<String>) -> Self {
        // An empty secret would match `Bearer ` with nothing after it
        let admin_secret = admin_secret.filter(|secret| !secret.is_empty());
        Self {
            api_keys,
            admin_secret,
        }
    }

    /// Resolve the raw `Authorization` header value to a principal.
    ///
    /// # Errors
    ///
    /// - `AppError::Unauthorized` for every credential failure
    /// - `AppError::Store` if the key lookup itself fails
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<Principal, AppError> {
        let token = authorization
            .and_then(|value| value.strip_prefix("Bearer "))
            .filter(|token| !token.is_empty())
            .ok_or(AppError::Unauthorized)?;

        if token.starts_with(API_KEY_PREFIX) {
            return match self.api_keys.validate(token).await? {
                Some(identity) => Ok(Principal::ApiKey {
                    user_id: identity.user_id,
                    key_id: identity.key_id,
                }),
                None => Err(AppError::Unauthorized),
            };
        }

        match &self.admin_secret {
            Some(secret) if bool::from(token.as_bytes().ct_eq(secret.as_bytes())) => {
                Ok(Principal::Admin)
            }
            _ => Err(AppError::Unauthorized),
        }
    }
}

/// Authentication middleware for API-key/admin routes.
///
/// # Flow
///
/// 1. Read the `Authorization` header
/// 2. Run it through [`Authenticator::authenticate`]
/// 3. On success insert the [`Principal`] and call the next handler
/// 4. On failure return 401 with the generic error body
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let principal = state.authenticator.authenticate(authorization).await?;

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Reject anything but the admin principal.
pub fn require_admin(principal: &Principal) -> Result<(), AppError> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn authenticator(secret: Option<&str>) -> (Authenticator, ApiKeyService) {
        let api_keys = ApiKeyService::new(Arc::new(MemoryStore::new()));
        (
            Authenticator::new(api_keys.clone(), secret.map(str::to_string)),
            api_keys,
        )
    }

    #[tokio::test]
    async fn admin_secret_requires_exact_match() {
        let (auth, _) = authenticator(Some("s3cret-admin"));

        let principal = auth.authenticate(Some("Bearer s3cret-admin")).await.unwrap();
        assert!(principal.is_admin());
        assert!(principal.user_id().is_none());

        for header in [
            "Bearer s3cret-admi",
            "Bearer s3cret-admin2",
            "s3cret-admin",
            "Bearer  s3cret-admin",
            "Bearer s3cret-admin ",
            "Bearer   s3cret-admin \t",
        ] {
            assert!(matches!(
                auth.authenticate(Some(header)).await,
                Err(AppError::Unauthorized)
            ));
        }
    }

    #[tokio::test]
    async fn unset_secret_never_matches() {
        let (auth, _) = authenticator(None);
        assert!(auth.authenticate(Some("Bearer anything")).await.is_err());

        let (auth, _) = authenticator(Some(""));
        assert!(auth.authenticate(Some("Bearer ")).await.is_err());
        assert!(auth.authenticate(None).await.is_err());
    }

    #[tokio::test]
    async fn api_key_resolves_to_user_until_revoked() {
        let (auth, api_keys) = authenticator(Some("admin"));
        let user_id = Uuid::new_v4();
        let created = api_keys.create(user_id, None).await.unwrap();
        let header = format!("Bearer {}", created.key);

        let principal = auth.authenticate(Some(&header)).await.unwrap();
        assert_eq!(principal.user_id(), Some(user_id));
        assert_eq!(principal.key_id(), Some(created.id));
        assert!(!principal.is_admin());

        api_keys.revoke(created.id, user_id).await.unwrap();
        assert!(matches!(
            auth.authenticate(Some(&header)).await,
            Err(AppError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn prefixed_token_never_falls_through_to_admin() {
        let (auth, _) = authenticator(Some("arb_admin"));
        assert!(auth.authenticate(Some("Bearer arb_admin")).await.is_err());
    }
}
