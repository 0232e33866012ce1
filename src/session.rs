//! Client-side session: one DPoP key plus the cached access token it is bound to.
//!
//! Token acquisition (client credentials, token exchange, ...) sits behind
//! [`TokenSource`]; the session only caches what it returns and signs proofs.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::DpopError;
use crate::key::DpopKey;
use crate::proof::create_proof;

/// Default margin between the token's real expiry and the cached one.
pub const DEFAULT_REFRESH_SKEW_SECONDS: i64 = 60;

/// Access token handed out by a [`TokenSource`].
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    // Lifetime reported by the issuer, seconds.
    pub expires_in: u64,
}

#[derive(Debug, Error)]
#[error("token source failed: {0}")]
pub struct TokenSourceError(pub String);

/// Where a session gets its (DPoP-bound) access tokens from.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self, key: &DpopKey) -> Result<IssuedToken, TokenSourceError>;
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    TokenSource(#[from] TokenSourceError),
    #[error(transparent)]
    Dpop(#[from] DpopError),
}

/// Header values for one outbound request.
#[derive(Debug, Clone)]
pub struct DpopHeaders {
    // `Authorization` value: `Bearer <token>`
    pub authorization: String,
    // `DPoP` value: the compact proof
    pub dpop: String,
    pub jti: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

pub struct ClientSession {
    key: DpopKey,
    tokens: Arc<dyn TokenSource>,
    cached: Mutex<Option<CachedToken>>,
    refresh_skew: ChronoDuration,
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("key", &self.key)
            .field("refresh_skew", &self.refresh_skew)
            .finish()
    }
}

impl ClientSession {
    /// Start a session with a freshly generated key.
    pub fn new(tokens: Arc<dyn TokenSource>) -> Result<Self, DpopError> {
        Ok(Self::with_key(DpopKey::generate()?, tokens))
    }

    pub fn with_key(key: DpopKey, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            key,
            tokens,
            cached: Mutex::new(None),
            refresh_skew: ChronoDuration::seconds(DEFAULT_REFRESH_SKEW_SECONDS),
        }
    }

    pub fn with_refresh_skew(mut self, seconds: i64) -> Self {
        self.refresh_skew =
            ChronoDuration::try_seconds(seconds.max(0)).unwrap_or(ChronoDuration::MAX);
        self
    }

    pub fn key(&self) -> &DpopKey {
        &self.key
    }

    /// Cached token if still valid, otherwise a freshly fetched one.
    ///
    /// The cache lock is held across the fetch, so concurrent callers wait for
    /// a single refresh instead of each starting their own.
    pub async fn access_token(&self) -> Result<String, SessionError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(token) = cached.as_ref() {
            if now < token.expires_at {
                return Ok(token.value.clone());
            }
            debug!(expired_at = %token.expires_at, "cached access token expired");
        }

        let issued = self.tokens.fetch_token(&self.key).await?;
        let lifetime = i64::try_from(issued.expires_in)
            .ok()
            .and_then(ChronoDuration::try_seconds)
            .unwrap_or(ChronoDuration::MAX);
        let expires_at = now
            .checked_add_signed(lifetime - self.refresh_skew)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        debug!(expires_at = %expires_at, "cached new access token");

        let value = issued.access_token;
        *cached = Some(CachedToken {
            value: value.clone(),
            expires_at,
        });
        Ok(value)
    }

    /// Forget the cached token; the next request fetches a new one.
    pub async fn clear_token(&self) {
        *self.cached.lock().await = None;
    }

    /// `Authorization` + `DPoP` header values for one request.
    pub async fn authorize(&self, method: &str, url: &str) -> Result<DpopHeaders, SessionError> {
        let token = self.access_token().await?;
        let proof = create_proof(method, url, &token, &self.key)?;

        Ok(DpopHeaders {
            authorization: format!("Bearer {}", token),
            jti: proof.jti().to_string(),
            dpop: proof.into_string(),
        })
    }
}
