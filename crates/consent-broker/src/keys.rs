//! Key discovery: fetch a client's JWKS and pick its signing key
//!
//! Trust is established per request from whatever the client publishes at
//! its key-discovery URL. [`HttpKeyResolver`] always fetches; wrap it in a
//! [`CachingKeyResolver`] to reuse keys for a bounded time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{Jwk, JwkSet, PublicKeyUse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to fetch key set from {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("malformed key set at {url}: {reason}")]
    Format { url: String, reason: String },

    #[error("no signing key{} in key set at {url}", key_id_suffix(.key_id))]
    NotFound { url: String, key_id: Option<String> },

    #[error("key set at {url} holds {count} signing keys and no key id was given")]
    Ambiguous { url: String, count: usize },
}

fn key_id_suffix(key_id: &Option<String>) -> String {
    key_id
        .as_ref()
        .map(|kid| format!(" with kid {kid:?}"))
        .unwrap_or_default()
}

/// A public signing key resolved from a client's key set
#[derive(Debug, Clone, PartialEq)]
pub struct PublicKey {
    url: String,
    jwk: Jwk,
}

impl PublicKey {
    pub fn new(url: impl Into<String>, jwk: Jwk) -> Self {
        Self {
            url: url.into(),
            jwk,
        }
    }

    /// The key-discovery URL this key was published at
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn jwk(&self) -> &Jwk {
        &self.jwk
    }

    pub fn key_id(&self) -> Option<&str> {
        self.jwk.common.key_id.as_deref()
    }

    pub fn decoding_key(&self) -> Result<DecodingKey, KeyError> {
        DecodingKey::from_jwk(&self.jwk).map_err(|e| KeyError::Format {
            url: self.url.clone(),
            reason: e.to_string(),
        })
    }

    /// JSON text of the JWK, as stored alongside a registered client
    pub fn to_json(&self) -> Result<String, KeyError> {
        serde_json::to_string(&self.jwk).map_err(|e| KeyError::Format {
            url: self.url.clone(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
pub trait KeyResolver: Send + Sync {
    /// Resolve the signing key published at `jwks_url`, disambiguated by `key_id`
    async fn resolve(&self, jwks_url: &str, key_id: Option<&str>) -> Result<PublicKey, KeyError>;

    /// Drop any remembered key for `(jwks_url, key_id)`.
    ///
    /// Returns `true` when something was dropped, meaning a fresh
    /// [`KeyResolver::resolve`] may yield a different key.
    fn invalidate(&self, _jwks_url: &str, _key_id: Option<&str>) -> bool {
        false
    }
}

/// Largest key set body accepted from a key-discovery URL
pub const MAX_KEY_SET_BYTES: usize = 64 * 1024;

/// Fetches the key set over HTTP on every call
#[derive(Debug, Clone)]
pub struct HttpKeyResolver {
    client: reqwest::Client,
}

impl HttpKeyResolver {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn fetch(&self, jwks_url: &str) -> Result<JwkSet, KeyError> {
        let fetch_error = |e: reqwest::Error| KeyError::Fetch {
            url: jwks_url.to_string(),
            reason: e.to_string(),
        };

        let too_large = || KeyError::Fetch {
            url: jwks_url.to_string(),
            reason: format!("key set exceeds {MAX_KEY_SET_BYTES} bytes"),
        };

        let mut response = self
            .client
            .get(jwks_url)
            .send()
            .await
            .map_err(fetch_error)?
            .error_for_status()
            .map_err(fetch_error)?;

        if response
            .content_length()
            .is_some_and(|len| len > MAX_KEY_SET_BYTES as u64)
        {
            return Err(too_large());
        }

        // The declared length may be absent or wrong; count what arrives
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(fetch_error)? {
            if body.len() + chunk.len() > MAX_KEY_SET_BYTES {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }

        serde_json::from_slice(&body).map_err(|e| KeyError::Format {
            url: jwks_url.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl KeyResolver for HttpKeyResolver {
    async fn resolve(&self, jwks_url: &str, key_id: Option<&str>) -> Result<PublicKey, KeyError> {
        tracing::debug!(jwks_url, ?key_id, "Fetching key set");
        let jwks = self.fetch(jwks_url).await?;
        let jwk = select_key(jwks_url, &jwks, key_id)?;
        Ok(PublicKey::new(jwks_url, jwk.clone()))
    }
}

/// Pick the signing key from a key set.
///
/// With a key id, exactly one signing key must carry it. Without one, the
/// set must hold exactly one signing key. Keys marked for any use other
/// than `sig` are never candidates.
pub fn select_key<'a>(
    jwks_url: &str,
    jwks: &'a JwkSet,
    key_id: Option<&str>,
) -> Result<&'a Jwk, KeyError> {
    let candidates: Vec<&Jwk> = jwks
        .keys
        .iter()
        .filter(|jwk| is_signing_key(jwk))
        .filter(|jwk| key_id.is_none() || jwk.common.key_id.as_deref() == key_id)
        .collect();

    match candidates.as_slice() {
        [jwk] => Ok(*jwk),
        [] => Err(KeyError::NotFound {
            url: jwks_url.to_string(),
            key_id: key_id.map(str::to_string),
        }),
        many => Err(KeyError::Ambiguous {
            url: jwks_url.to_string(),
            count: many.len(),
        }),
    }
}

fn is_signing_key(jwk: &Jwk) -> bool {
    matches!(jwk.common.public_key_use, None | Some(PublicKeyUse::Signature))
}

#[derive(Debug, Clone)]
struct CachedKey {
    key: PublicKey,
    expires_at: Instant,
}

type CacheKey = (String, Option<String>);

/// Reuses resolved keys for `ttl`, keyed by `(jwks_url, key_id)`
pub struct CachingKeyResolver<R> {
    inner: R,
    cache: Arc<DashMap<CacheKey, CachedKey>>,
    ttl: Duration,
}

impl<R: KeyResolver> CachingKeyResolver<R> {
    pub fn new(inner: R, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Arc::new(DashMap::new()),
            ttl,
        }
    }

    fn cache_key(jwks_url: &str, key_id: Option<&str>) -> CacheKey {
        (jwks_url.to_string(), key_id.map(str::to_string))
    }
}

#[async_trait]
impl<R: KeyResolver> KeyResolver for CachingKeyResolver<R> {
    async fn resolve(&self, jwks_url: &str, key_id: Option<&str>) -> Result<PublicKey, KeyError> {
        let cache_key = Self::cache_key(jwks_url, key_id);
        let cached = self
            .cache
            .get(&cache_key)
            .map(|entry| (entry.key.clone(), entry.expires_at));
        match cached {
            Some((key, expires_at)) if expires_at > Instant::now() => return Ok(key),
            Some(_) => {
                self.cache.remove(&cache_key);
            }
            None => {}
        }

        let key = self.inner.resolve(jwks_url, key_id).await?;

        // Both halves of the cache key come from the request; drop stale
        // entries so the map only holds live keys
        let now = Instant::now();
        self.cache.retain(|_, entry| entry.expires_at > now);
        self.cache.insert(
            cache_key,
            CachedKey {
                key: key.clone(),
                expires_at: now + self.ttl,
            },
        );
        Ok(key)
    }

    fn invalidate(&self, jwks_url: &str, key_id: Option<&str>) -> bool {
        self.cache
            .remove(&Self::cache_key(jwks_url, key_id))
            .is_some()
    }
}
