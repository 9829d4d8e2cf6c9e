//! Client registration and consent query handlers

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::Value;

use super::error::ApiError;
use super::AppState;
use crate::envelope::SignedEnvelope;
use crate::registry::RegistrationPayload;
use crate::validation::{FieldError, ValidationError, Validator};

/// Registration request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    /// Compact JWS whose claims are the registration payload
    #[serde(default)]
    pub envelope: Option<String>,

    /// Key-discovery URL sent outside the signature
    #[serde(default)]
    pub jwks_url: Option<String>,
}

/// Handler for `POST /api/clients`
///
/// Runs parse, key resolution, signature check, payload validation and
/// storage in order; the first failing stage rejects the request.
pub async fn register(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RegistrationRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(request) = body.map_err(|rejection| {
        ValidationError::single(FieldError::new("body", rejection.body_text()))
    })?;

    let mut v = Validator::new();
    let Some(raw) = v.text("envelope", request.envelope.as_deref()) else {
        return Err(v.into_error().into());
    };

    let envelope = SignedEnvelope::parse(raw)?;
    let verified = state
        .verifier
        .verify(&envelope, request.jwks_url.as_deref())
        .await?;
    let payload = RegistrationPayload::from_claims(&verified.claims)?;
    let client_key = verified.key.to_json()?;

    state.registry.register(payload, client_key).await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub struct ConsentParams {
    #[serde(rename = "accountId")]
    pub account_id: Option<String>,
}

/// Handler for `GET /api/clients/{clientId}/consents`
pub async fn consents(
    State(state): State<Arc<AppState>>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<ConsentParams>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let mut errors = Vec::new();
    let client_id = path
        .map_err(|rejection| errors.push(FieldError::new("clientId", rejection.body_text())))
        .ok();
    let params = query
        .map_err(|rejection| errors.push(FieldError::new("accountId", rejection.body_text())))
        .ok();
    let (Some(Path(client_id)), Some(Query(params))) = (client_id, params) else {
        return Err(ValidationError { details: errors }.into());
    };

    let result = state
        .consents
        .query_consents(Some(client_id.as_str()), params.account_id.as_deref())
        .await?;
    Ok(Json(result))
}
