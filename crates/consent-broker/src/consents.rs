//! Consent queries forwarded to the consent decision service
//!
//! The proxy validates `(clientId, accountId)` and hands them to the
//! downstream service. Whatever the service answers is returned untouched.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::validation::{ValidationError, Validator};

/// The downstream service failed or could not be reached
#[derive(Debug, Error)]
#[error("consent service request failed: {0}")]
pub struct DependencyError(pub String);

#[derive(Debug, Error)]
pub enum ConsentError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Dependency(#[from] DependencyError),
}

#[async_trait]
pub trait ConsentService: Send + Sync {
    async fn get(&self, account_id: &str, client_id: &str) -> Result<Value, DependencyError>;
}

/// Talks to the consent decision service over HTTP.
///
/// Issues `GET {base_url}/consents?accountId=..&clientId=..` and returns the
/// JSON body.
#[derive(Debug, Clone)]
pub struct HttpConsentService {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpConsentService {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let mut base = Url::parse(base_url)?;
        // Without a trailing slash `join` would replace the last path segment
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join("consents")?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl ConsentService for HttpConsentService {
    async fn get(&self, account_id: &str, client_id: &str) -> Result<Value, DependencyError> {
        let to_dependency = |e: reqwest::Error| DependencyError(e.to_string());

        self.client
            .get(self.endpoint.clone())
            .query(&[("accountId", account_id), ("clientId", client_id)])
            .send()
            .await
            .map_err(to_dependency)?
            .error_for_status()
            .map_err(to_dependency)?
            .json::<Value>()
            .await
            .map_err(to_dependency)
    }
}

#[derive(Clone)]
pub struct ConsentQueryProxy {
    service: Arc<dyn ConsentService>,
}

impl ConsentQueryProxy {
    pub fn new(service: Arc<dyn ConsentService>) -> Self {
        Self { service }
    }

    /// Validate both ids, then ask the consent service.
    ///
    /// Nothing is sent downstream unless both ids are valid.
    pub async fn query_consents(
        &self,
        client_id: Option<&str>,
        account_id: Option<&str>,
    ) -> Result<Value, ConsentError> {
        let mut v = Validator::new();
        let client_id = v.http_url("clientId", client_id);
        let account_id = v.text("accountId", account_id);
        let (Some(client_id), Some(account_id)) = (client_id, account_id) else {
            return Err(v.into_error().into());
        };

        self.service
            .get(account_id, client_id)
            .await
            .inspect_err(|e| {
                tracing::error!(client_id, error = %e, "Consent service query failed");
            })
            .map_err(ConsentError::from)
    }
}
