//! Signed envelopes and their verification
//!
//! A registration arrives as a compact JWS (`header.claims.signature`). The
//! verifier resolves the signer's key from a key-discovery URL and checks
//! the signature before any claim is trusted.
//!
//! The key-discovery URL is taken, in order, from the JWS `jku` header, the
//! URL the caller supplies next to the envelope, and finally the envelope's
//! own `jwksUrl` claim. Only the first and last are covered by the
//! signature; see [`SignatureVerifier::require_signed_jwks_url`].

use std::str::FromStr;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::{Jwk, KeyAlgorithm};
use jsonwebtoken::{Algorithm, Header, Validation, decode, decode_header};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::keys::{KeyError, KeyResolver, PublicKey};

/// Claim carrying the signer's key-discovery URL
pub const JWKS_URL_CLAIM: &str = "jwksUrl";

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("malformed envelope: {0}")]
    EnvelopeMalformed(String),

    #[error("unsupported signing algorithm: {0}")]
    AlgorithmUnsupported(String),

    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    #[error("no key-discovery url supplied")]
    MissingKeyUrl,

    #[error("key-discovery url {0} is not covered by the signature")]
    UnboundKeyUrl(String),

    #[error(transparent)]
    Key(#[from] KeyError),
}

/// A parsed, not yet verified, compact JWS
#[derive(Debug, Clone)]
pub struct SignedEnvelope {
    raw: String,
    header: Header,
    claims: Value,
}

impl SignedEnvelope {
    pub fn parse(raw: &str) -> Result<Self, VerifyError> {
        let raw = raw.trim();
        let segments: Vec<&str> = raw.split('.').collect();
        let [header_segment, claims_segment, signature] = segments.as_slice() else {
            return Err(VerifyError::EnvelopeMalformed(
                "expected three dot-separated segments".to_string(),
            ));
        };
        if signature.is_empty() {
            return Err(VerifyError::EnvelopeMalformed("missing signature".to_string()));
        }

        // Check `alg` by hand first: a missing or unknown algorithm is an
        // algorithm failure, not a malformed header.
        let header_json: Value = decode_segment(header_segment, "header")?;
        let alg = header_json
            .get("alg")
            .and_then(Value::as_str)
            .ok_or_else(|| VerifyError::AlgorithmUnsupported("none declared".to_string()))?;
        let algorithm = Algorithm::from_str(alg)
            .map_err(|_| VerifyError::AlgorithmUnsupported(alg.to_string()))?;
        ensure_algorithm_allowed(algorithm)?;

        let header = decode_header(raw)
            .map_err(|e| VerifyError::EnvelopeMalformed(format!("header: {e}")))?;

        let claims: Value = decode_segment(claims_segment, "claims")?;
        if !claims.is_object() {
            return Err(VerifyError::EnvelopeMalformed(
                "claims must be a JSON object".to_string(),
            ));
        }

        Ok(Self {
            raw: raw.to_string(),
            header,
            claims,
        })
    }

    pub fn key_id(&self) -> Option<&str> {
        self.header.kid.as_deref()
    }

    fn claimed(&self, name: &str) -> Option<&str> {
        non_empty(self.claims.get(name).and_then(Value::as_str))
    }

    /// The key-discovery URL to verify against
    pub fn key_url<'a>(&'a self, supplied: Option<&'a str>) -> Option<&'a str> {
        non_empty(self.header.jku.as_deref())
            .or_else(|| non_empty(supplied))
            .or_else(|| self.claimed(JWKS_URL_CLAIM))
    }

    /// Whether `url` appears in a signed part of the envelope
    fn is_signed_key_url(&self, url: &str) -> bool {
        self.header.jku.as_deref() == Some(url) || self.claimed(JWKS_URL_CLAIM) == Some(url)
    }

    /// Check the signature with `key` and return the claims
    pub fn verify_with(&self, key: &PublicKey) -> Result<Value, VerifyError> {
        let alg = self.header.alg;
        ensure_key_matches_algorithm(key.jwk(), alg)?;
        let decoding_key = key.decoding_key()?;

        // Registration payloads carry no registered claims; honour exp/nbf
        // only when present.
        let mut validation = Validation::new(alg);
        validation.required_spec_claims.clear();
        validation.validate_nbf = true;
        validation.validate_aud = false;

        let data = decode::<Value>(&self.raw, &decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidAlgorithm => VerifyError::AlgorithmUnsupported(format!(
                    "{alg:?} does not match the published key type"
                )),
                _ => VerifyError::SignatureInvalid(e.to_string()),
            }
        })?;
        Ok(data.claims)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn decode_segment<T: DeserializeOwned>(segment: &str, part: &str) -> Result<T, VerifyError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| VerifyError::EnvelopeMalformed(format!("{part}: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| VerifyError::EnvelopeMalformed(format!("{part}: {e}")))
}

/// Only asymmetric algorithms can be checked against a published key
fn ensure_algorithm_allowed(alg: Algorithm) -> Result<(), VerifyError> {
    match alg {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
            Err(VerifyError::AlgorithmUnsupported(format!("{alg:?}")))
        }
        _ => Ok(()),
    }
}

fn ensure_key_matches_algorithm(jwk: &Jwk, alg: Algorithm) -> Result<(), VerifyError> {
    let Some(key_alg) = jwk.common.key_algorithm else {
        return Ok(());
    };
    let matches = matches!(
        (key_alg, alg),
        (KeyAlgorithm::RS256, Algorithm::RS256)
            | (KeyAlgorithm::RS384, Algorithm::RS384)
            | (KeyAlgorithm::RS512, Algorithm::RS512)
            | (KeyAlgorithm::PS256, Algorithm::PS256)
            | (KeyAlgorithm::PS384, Algorithm::PS384)
            | (KeyAlgorithm::PS512, Algorithm::PS512)
            | (KeyAlgorithm::ES256, Algorithm::ES256)
            | (KeyAlgorithm::ES384, Algorithm::ES384)
            | (KeyAlgorithm::EdDSA, Algorithm::EdDSA)
    );
    if matches {
        Ok(())
    } else {
        Err(VerifyError::AlgorithmUnsupported(format!(
            "{alg:?} does not match key algorithm {key_alg:?}"
        )))
    }
}

/// Result of a successful verification
#[derive(Debug, Clone)]
pub struct Verified {
    pub claims: Value,
    pub key: PublicKey,
}

/// Verifies envelopes against keys published by their signers
pub struct SignatureVerifier {
    resolver: Arc<dyn KeyResolver>,
    require_signed_jwks_url: bool,
}

impl SignatureVerifier {
    pub fn new(resolver: Arc<dyn KeyResolver>) -> Self {
        Self {
            resolver,
            require_signed_jwks_url: false,
        }
    }

    /// Refuse key-discovery URLs that only arrive outside the signature.
    ///
    /// Off by default: the unsigned `jwksUrl` next to the envelope is accepted
    /// as-is, so the signer only proves control of whatever URL was supplied.
    pub fn require_signed_jwks_url(mut self, require: bool) -> Self {
        self.require_signed_jwks_url = require;
        self
    }

    /// Resolve the signer's key and verify the envelope.
    ///
    /// `supplied_jwks_url` is the key-discovery URL sent alongside the
    /// envelope, if any.
    pub async fn verify(
        &self,
        envelope: &SignedEnvelope,
        supplied_jwks_url: Option<&str>,
    ) -> Result<Verified, VerifyError> {
        let result = self.verify_inner(envelope, supplied_jwks_url).await;
        if let Err(err) = &result {
            tracing::warn!(
                client_id = envelope.claimed("clientId").unwrap_or("<unknown>"),
                jwks_url = envelope.key_url(supplied_jwks_url).unwrap_or("<none>"),
                error = %err,
                "Rejected signed envelope"
            );
        }
        result
    }

    async fn verify_inner(
        &self,
        envelope: &SignedEnvelope,
        supplied_jwks_url: Option<&str>,
    ) -> Result<Verified, VerifyError> {
        let jwks_url = envelope
            .key_url(supplied_jwks_url)
            .ok_or(VerifyError::MissingKeyUrl)?;
        if self.require_signed_jwks_url && !envelope.is_signed_key_url(jwks_url) {
            return Err(VerifyError::UnboundKeyUrl(jwks_url.to_string()));
        }

        let key_id = envelope.key_id();
        let key = self.resolver.resolve(jwks_url, key_id).await?;

        match envelope.verify_with(&key) {
            // A remembered key may be stale after rotation: the freshest key wins
            Err(VerifyError::SignatureInvalid(_)) if self.resolver.invalidate(jwks_url, key_id) => {
                tracing::debug!(jwks_url, "Signature failed against cached key, refetching");
                let fresh = self.resolver.resolve(jwks_url, key_id).await?;
                let claims = envelope.verify_with(&fresh)?;
                Ok(Verified { claims, key: fresh })
            }
            result => result.map(|claims| Verified { claims, key }),
        }
    }
}
