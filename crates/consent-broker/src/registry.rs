//! Client registry: validate registration payloads and upsert clients

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;

use crate::storage::{Client, ClientStore, StoreError, UpsertOutcome};
use crate::validation::{ValidationError, Validator};

/// A validated registration payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationPayload {
    pub client_id: String,
    pub display_name: String,
    pub description: String,
    pub events_url: String,
    pub jwks_url: String,
}

impl RegistrationPayload {
    /// Validate verified claims, reporting every violated field
    pub fn from_claims(claims: &Value) -> Result<Self, ValidationError> {
        let mut v = Validator::new();
        let client_id = v.json_http_url("clientId", claims.get("clientId"));
        let display_name = v.json_text("displayName", claims.get("displayName"));
        let description = v.json_text("description", claims.get("description"));
        let events_url = v.json_http_url("eventsUrl", claims.get("eventsUrl"));
        let jwks_url = v.json_http_url("jwksUrl", claims.get("jwksUrl"));

        match (client_id, display_name, description, events_url, jwks_url) {
            (Some(client_id), Some(display_name), Some(description), Some(events_url), Some(jwks_url)) => {
                Ok(Self {
                    client_id: client_id.to_string(),
                    display_name: display_name.to_string(),
                    description: description.to_string(),
                    events_url: events_url.to_string(),
                    jwks_url: jwks_url.to_string(),
                })
            }
            _ => Err(v.into_error()),
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// The only component that writes client rows
#[derive(Clone)]
pub struct ClientRegistry {
    store: Arc<dyn ClientStore>,
}

impl ClientRegistry {
    pub fn new(store: Arc<dyn ClientStore>) -> Self {
        Self { store }
    }

    /// Register or re-register a client.
    ///
    /// `client_key` is the key that verified this registration. Every mutable
    /// field of an existing row is replaced.
    pub async fn register(
        &self,
        payload: RegistrationPayload,
        client_key: String,
    ) -> Result<UpsertOutcome, RegistrationError> {
        let now = Utc::now();
        let client = Client {
            client_id: payload.client_id,
            display_name: payload.display_name,
            description: payload.description,
            events_url: payload.events_url,
            jwks_url: payload.jwks_url,
            client_key,
            created_at: now,
            updated_at: now,
        };
        let client_id = client.client_id.clone();

        let outcome = self.store.upsert(client).await.inspect_err(|e| {
            tracing::error!(client_id = %client_id, error = %e, "Failed to store client");
        })?;

        match outcome {
            UpsertOutcome::Inserted => tracing::info!(client_id = %client_id, "Registered new client"),
            UpsertOutcome::Updated => tracing::info!(client_id = %client_id, "Updated registered client"),
        }
        Ok(outcome)
    }
}
