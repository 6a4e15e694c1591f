use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use spendnorm_core::{AppConfig, Environment};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::api::ApiError;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id for one request, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Bearer tokens accepted by the protected routes. `None` means auth is off.
#[derive(Clone)]
pub struct AuthState {
    keys: Option<Arc<[String]>>,
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.keys {
            Some(keys) => write!(f, "AuthState({} keys redacted)", keys.len()),
            None => f.write_str("AuthState(disabled)"),
        }
    }
}

impl AuthState {
    /// Reads `SPENDNORM_API_KEYS` from config. An empty list is only
    /// accepted in development, where it turns auth off.
    ///
    /// # Errors
    ///
    /// Fails outside development when no key is configured.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        Self::new(
            &config.api_keys,
            matches!(config.env, Environment::Development),
        )
    }

    /// # Errors
    ///
    /// Fails when `api_keys` is empty and `allow_open` is false.
    pub fn new(api_keys: &[String], allow_open: bool) -> anyhow::Result<Self> {
        if !api_keys.is_empty() {
            return Ok(Self {
                keys: Some(api_keys.into()),
            });
        }
        if !allow_open {
            anyhow::bail!("SPENDNORM_API_KEYS must list at least one bearer token outside development");
        }
        tracing::warn!("SPENDNORM_API_KEYS not set; status API is unauthenticated");
        Ok(Self::disabled())
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self { keys: None }
    }

    /// Every configured key is compared in constant time, with no early exit.
    fn allows(keys: &[String], token: &str) -> bool {
        keys.iter().fold(false, |found, key| {
            found | bool::from(key.as_bytes().ct_eq(token.as_bytes()))
        })
    }
}

/// Takes `x-request-id` from the request or mints a `UUIDv4`, exposes it as
/// a [`RequestId`] extension and echoes it on the response.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_owned);
    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        res.headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    res
}

pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(keys) = auth.keys.as_deref() else {
        return next.run(req).await;
    };
    if bearer_token(req.headers()).is_some_and(|token| AuthState::allows(keys, token)) {
        return next.run(req).await;
    }

    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map_or("", |id| id.0.as_str());
    tracing::debug!(request_id, path = %req.uri().path(), "rejected unauthenticated request");
    ApiError::unauthorized(request_id).into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
