//! Field-level request validation
//!
//! Validators accumulate every violation instead of stopping at the first,
//! so a caller can fix all of them in one round trip.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// A single violated constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn required(field: &str) -> Self {
        Self::new(field, format!("{field} is required"))
    }
}

/// Every violation found in one request, in field order
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", self.message())]
pub struct ValidationError {
    pub details: Vec<FieldError>,
}

impl ValidationError {
    pub fn single(error: FieldError) -> Self {
        Self {
            details: vec![error],
        }
    }

    /// The primary human-readable reason (first violation)
    pub fn message(&self) -> &str {
        self.details
            .first()
            .map(|e| e.message.as_str())
            .unwrap_or("validation failed")
    }
}

/// Collects field errors while extracting values
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A required, non-empty string taken from a JSON document
    pub fn json_text<'v>(&mut self, field: &str, value: Option<&'v Value>) -> Option<&'v str> {
        match value {
            None | Some(Value::Null) => {
                self.errors.push(FieldError::required(field));
                None
            }
            Some(Value::String(s)) => self.text(field, Some(s.as_str())),
            Some(_) => {
                self.errors
                    .push(FieldError::new(field, format!("{field} must be a string")));
                None
            }
        }
    }

    /// A required, non-empty string
    pub fn text<'v>(&mut self, field: &str, value: Option<&'v str>) -> Option<&'v str> {
        match value {
            None => {
                self.errors.push(FieldError::required(field));
                None
            }
            Some(s) if s.trim().is_empty() => {
                self.errors.push(FieldError::new(
                    field,
                    format!("{field} is not allowed to be empty"),
                ));
                None
            }
            Some(s) => Some(s),
        }
    }

    /// An absolute `http` or `https` URL
    pub fn http_url<'v>(&mut self, field: &str, value: Option<&'v str>) -> Option<&'v str> {
        let raw = self.text(field, value)?;
        if is_http_url(raw) {
            Some(raw)
        } else {
            self.errors.push(FieldError::new(
                field,
                format!("{field} must be a valid uri with a scheme matching the http|https pattern"),
            ));
            None
        }
    }

    /// Same as [`Validator::http_url`] for a JSON value
    pub fn json_http_url<'v>(&mut self, field: &str, value: Option<&'v Value>) -> Option<&'v str> {
        let raw = self.json_text(field, value)?;
        self.http_url(field, Some(raw))
    }

    /// The violations recorded so far
    pub fn into_error(self) -> ValidationError {
        ValidationError {
            details: self.errors,
        }
    }
}

fn is_http_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.has_host(),
        Err(_) => false,
    }
}
