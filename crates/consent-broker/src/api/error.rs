//! Error responses
//!
//! Every failure reaching the boundary becomes an [`ApiError`] with a stable
//! `error` code. Validation failures also list each violated field.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::consents::ConsentError;
use crate::envelope::VerifyError;
use crate::keys::KeyError;
use crate::registry::RegistrationError;
use crate::validation::{FieldError, ValidationError};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: code.to_string(),
                message: message.into(),
                details: None,
            },
        }
    }

    fn unauthorized(code: &str, err: &impl std::fmt::Display) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, code, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        let mut api = Self::new(StatusCode::BAD_REQUEST, "validation_error", err.message());
        api.body.details = Some(err.details);
        api
    }
}

impl From<KeyError> for ApiError {
    fn from(err: KeyError) -> Self {
        let code = match &err {
            KeyError::Fetch { .. } => "key_fetch_failed",
            KeyError::Format { .. } => "key_format_invalid",
            KeyError::NotFound { .. } => "key_not_found",
            KeyError::Ambiguous { .. } => "key_ambiguous",
        };
        Self::unauthorized(code, &err)
    }
}

impl From<VerifyError> for ApiError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::Key(err) => err.into(),
            VerifyError::MissingKeyUrl => ValidationError::single(FieldError::required("jwksUrl")).into(),
            VerifyError::EnvelopeMalformed(_) => Self::unauthorized("envelope_malformed", &err),
            VerifyError::AlgorithmUnsupported(_) => Self::unauthorized("algorithm_unsupported", &err),
            VerifyError::SignatureInvalid(_) | VerifyError::UnboundKeyUrl(_) => {
                Self::unauthorized("signature_invalid", &err)
            }
        }
    }
}

impl From<RegistrationError> for ApiError {
    fn from(err: RegistrationError) -> Self {
        match err {
            RegistrationError::Validation(err) => err.into(),
            // Logged by the registry; keep details server-side
            RegistrationError::Storage(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "Failed to register client",
            ),
        }
    }
}

impl From<ConsentError> for ApiError {
    fn from(err: ConsentError) -> Self {
        match err {
            ConsentError::Validation(err) => err.into(),
            ConsentError::Dependency(_) => Self::new(
                StatusCode::BAD_GATEWAY,
                "dependency_failed",
                "Consent service unavailable",
            ),
        }
    }
}
