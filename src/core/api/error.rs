use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::core::storage::StorageError;

/// Per-field validation messages, serialized as `{"field": ["message", ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Takes over messages for fields that have none yet.
    pub fn absorb(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_insert(messages);
        }
    }
}

impl From<validator::ValidationErrors> for FieldErrors {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields = FieldErrors::default();
        for (field, field_errors) in errors.field_errors() {
            let field = field.to_string();
            for error in field_errors {
                let message = error
                    .message
                    .as_ref()
                    .map(|message| message.to_string())
                    .unwrap_or_else(|| format!("The {} field is invalid.", field.replace('_', " ")));
                fields.add(&field, message);
            }
        }
        fields
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Post not found")]
    NotFound,
    #[error("The given data was invalid.")]
    Validation(FieldErrors),
    #[error("{0}")]
    InvalidBody(String),
    #[error("Unauthenticated.")]
    Unauthorized,
    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::DuplicateLink(_) => {
                let mut fields = FieldErrors::default();
                fields.add("link", "The link has already been taken.");
                ApiError::Validation(fields)
            }
            other => ApiError::Storage(other),
        }
    }
}

impl From<FieldErrors> for ApiError {
    fn from(fields: FieldErrors) -> Self {
        ApiError::Validation(fields)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidBody(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::InvalidBody(rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<FieldErrors>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, message, errors) = match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, message, None),
            ApiError::Validation(fields) => (StatusCode::UNPROCESSABLE_ENTITY, message, Some(fields)),
            ApiError::InvalidBody(_) => (StatusCode::UNPROCESSABLE_ENTITY, message, None),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, message, None),
            ApiError::Storage(error) => {
                tracing::error!(%error, "post storage failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Server Error".to_string(),
                    None,
                )
            }
        };
        (status, Json(ErrorResponse { message, errors })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_link_becomes_link_validation_error() {
        let error = ApiError::from(StorageError::DuplicateLink("https://x.com".to_string()));
        match error {
            ApiError::Validation(fields) => assert!(fields.contains("link")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn absorb_keeps_existing_messages() {
        let mut fields = FieldErrors::default();
        fields.add("title", "The title field must be a string.");
        let mut later = FieldErrors::default();
        later.add("title", "The title field is required.");
        later.add("link", "The link field is required.");

        fields.absorb(later);

        let json = serde_json::to_value(&fields).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "link": ["The link field is required."],
                "title": ["The title field must be a string."]
            })
        );
    }

    #[test]
    fn field_errors_serialize_as_map_of_lists() {
        let mut fields = FieldErrors::default();
        fields.add("link", "The link field is required.");
        fields.add("link", "second");
        let json = serde_json::to_value(&fields).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({ "link": ["The link field is required.", "second"] })
        );
    }
}
