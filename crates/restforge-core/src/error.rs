// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Public error type and its HTTP mapping.
//!
//! Every failure that reaches a client is an [`ApiError`]. Lower layers keep
//! their own error enums ([`StoreError`], [`ValidationErrors`],
//! [`SchemaError`], [`FilterError`]) and convert through `From`, so `?`
//! works across layers.
//!
//! # Response envelope
//!
//! ```json
//! {"detail": {"errors": ["object with value ann already exists"]}}
//! ```
//!
//! | Variant | Status |
//! |---------|--------|
//! | `Validation`, `EnumInvalid`, `BadRequest` | 400 |
//! | `Unauthorized` | 401 |
//! | `Forbidden` | 403 |
//! | `NotFound` | 404 |
//! | `Conflict` | 409 |
//! | `PreconditionFailed` | 428 |
//! | `Internal` | 500 |

use std::sync::LazyLock;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response}
};
use regex::Regex;
use serde_json::json;

use crate::{filter::FilterError, registry::SchemaError, store::StoreError, view::ValidationErrors};

/// Result alias used throughout the crate.
pub type ApiResult<T> = Result<T, ApiError>;

/// Client-facing error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Target row does not exist or is not visible.
    #[error("not found")]
    NotFound,

    /// Caller may not see or touch the target.
    #[error("forbidden")]
    Forbidden,

    /// No authenticated caller.
    #[error("unauthenticated")]
    Unauthorized,

    /// Write based on a stale read.
    #[error("request data is stale")]
    PreconditionFailed,

    /// Payload failed validation.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Value outside an enum's members.
    #[error("invalid enum value: {}", .0.join("; "))]
    EnumInvalid(Vec<String>),

    /// Unique constraint violated.
    #[error("conflict: {}", .0.join("; "))]
    Conflict(Vec<String>),

    /// Malformed request or constraint violation other than uniqueness.
    #[error("bad request: {}", .0.join("; "))]
    BadRequest(Vec<String>),

    /// Anything else; surfaces as a 500.
    #[error("internal error: {0}")]
    Internal(String)
}

impl ApiError {
    /// Internal error with a message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Single-message bad request.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(vec![message.into()])
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::PreconditionFailed => StatusCode::PRECONDITION_REQUIRED,
            Self::Validation(_) | Self::EnumInvalid(_) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    /// Messages placed in the envelope.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::Validation(m) | Self::EnumInvalid(m) | Self::Conflict(m) | Self::BadRequest(m) => {
                m.clone()
            }
            Self::Internal(_) => vec!["internal server error".to_string()],
            other => vec![other.to_string()]
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        let body = json!({ "detail": { "errors": self.messages() } });
        (status, Json(body)).into_response()
    }
}

static DUPLICATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r".*Duplicate entry '(.+)' for key.*",
        r"(?s).*duplicate key value violates unique constraint.*Key \(.+\)=\((.+)\).*",
        r"UNIQUE constraint failed: .*"
    ]
    .into_iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Translate a raw integrity message from a SQL backend.
fn translate_integrity(message: String) -> ApiError {
    for pattern in DUPLICATE_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(&message) {
            let text = match captures.get(1) {
                Some(value) => format!("object with value {} already exists", value.as_str()),
                None => "object already exists".to_string()
            };
            return ApiError::Conflict(vec![text]);
        }
    }
    tracing::warn!(message = %message, "integrity error not translated");
    ApiError::BadRequest(vec![message])
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unique {
                value, ..
            } => Self::Conflict(vec![format!("object with value {value} already exists")]),
            StoreError::Integrity(message) => translate_integrity(message),
            StoreError::NotFound {
                ..
            } => Self::NotFound,
            StoreError::Validation(message) => Self::BadRequest(vec![message]),
            other => {
                tracing::error!(error = %other, "untranslated store error");
                Self::Internal(other.to_string())
            }
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(err: ValidationErrors) -> Self {
        if err.is_enum_only() {
            Self::EnumInvalid(err.messages())
        } else {
            Self::Validation(err.messages())
        }
    }
}

impl From<SchemaError> for ApiError {
    fn from(err: SchemaError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<FilterError> for ApiError {
    fn from(err: FilterError) -> Self {
        match err {
            FilterError::InvalidJson(_) | FilterError::NotAnObject(_) => {
                Self::BadRequest(vec![err.to_string()])
            }
            FilterError::MalformedGroup {
                ..
            } => {
                tracing::error!(error = %err, "malformed condition group");
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(vec![err.to_string()])
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::PreconditionFailed.status().as_u16(), 428);
        assert_eq!(ApiError::Conflict(vec![]).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::internal("x").status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!ApiError::internal("x").is_client_error());
    }

    #[test]
    fn unique_violation_is_conflict() {
        let err: ApiError = StoreError::Unique {
            entity: "User".into(),
            field:  "name".into(),
            value:  "ann".into()
        }
        .into();
        assert_eq!(err, ApiError::Conflict(vec!["object with value ann already exists".into()]));
    }

    #[test]
    fn raw_duplicate_messages_are_conflicts() {
        let err = translate_integrity("(1062, \"Duplicate entry 'bob' for key 'name'\")".into());
        assert_eq!(err, ApiError::Conflict(vec!["object with value bob already exists".into()]));
        let err = translate_integrity("UNIQUE constraint failed: user.name".into());
        assert_eq!(err, ApiError::Conflict(vec!["object already exists".into()]));
        let err = translate_integrity(
            "duplicate key value violates unique constraint \"user_name_key\"\nDETAIL:  Key (name)=(cy) already exists.".into()
        );
        assert_eq!(err, ApiError::Conflict(vec!["object with value cy already exists".into()]));
    }

    #[test]
    fn other_integrity_errors_are_bad_requests() {
        let err = translate_integrity("NOT NULL constraint failed: user.name".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unmapped_store_errors_are_internal() {
        let err: ApiError = StoreError::UnknownField {
            entity: "User".into(),
            field:  "nope".into()
        }
        .into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn response_envelope() {
        let response = ApiError::Forbidden.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, json!({"detail": {"errors": ["forbidden"]}}));
    }
}
