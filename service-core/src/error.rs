//! Platform error type and wire envelope mapping.
//!
//! Every surface adapter returns `AppError`; `IntoResponse` renders the
//! standard error envelope:
//!
//! ```json
//! { "error": { "code": "...", "message": "...", "details": {}, "request_id": null } }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    /// 422 with a `details` object (e.g. `fields`, `missing_permissions`).
    #[error("Validation failed")]
    ValidationFailed(Value),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(anyhow::Error),

    #[error("Use limit exceeded")]
    UseLimitExceeded,

    #[error("Device limit exceeded")]
    DeviceLimitExceeded,

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Too many requests")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Service unavailable")]
    ServiceUnavailable,

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl AppError {
    /// Stable wire code for this error (§ error catalog).
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) | AppError::ValidationFailed(_) => "validation_failed",
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::UseLimitExceeded => "use_limit_exceeded",
            AppError::DeviceLimitExceeded => "device_limit_exceeded",
            AppError::Conflict(_) => "conflict",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::InternalError(_) | AppError::DatabaseError(_) | AppError::ConfigError(_) => {
                "internal_error"
            }
            AppError::ServiceUnavailable => "service_unavailable",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::ValidationFailed(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::UseLimitExceeded | AppError::DeviceLimitExceeded => {
                StatusCode::FORBIDDEN
            }
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::InternalError(_) | AppError::DatabaseError(_) | AppError::ConfigError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
            details: Value,
            request_id: Option<String>,
        }

        #[derive(Serialize)]
        struct ErrorEnvelope {
            error: ErrorBody,
        }

        let status = self.status();
        let code = self.code();

        let (message, details) = match &self {
            AppError::ValidationError(errs) => (
                "Validation failed".to_string(),
                json!({ "fields": validation_fields(errs) }),
            ),
            AppError::ValidationFailed(details) => ("Validation failed".to_string(), details.clone()),
            AppError::BadRequest(e) => (e.to_string(), json!({})),
            AppError::NotFound(_) => ("Not found".to_string(), json!({})),
            // Never reveals which verification step failed.
            AppError::Unauthorized => ("Unauthorized".to_string(), json!({})),
            AppError::Forbidden(e) => (e.to_string(), json!({})),
            AppError::UseLimitExceeded => ("Use limit exceeded".to_string(), json!({})),
            AppError::DeviceLimitExceeded => ("Device limit exceeded".to_string(), json!({})),
            AppError::Conflict(e) => (e.to_string(), json!({})),
            AppError::RateLimited { retry_after_seconds } => (
                "Too many requests".to_string(),
                json!({ "retry_after_seconds": retry_after_seconds }),
            ),
            AppError::InternalError(e) | AppError::DatabaseError(e) | AppError::ConfigError(e) => {
                tracing::error!(error = %e, code, "Internal error surfaced to client");
                ("Internal server error".to_string(), json!({}))
            }
            AppError::ServiceUnavailable => ("Service unavailable".to_string(), json!({})),
        };

        let mut res = (
            status,
            Json(ErrorEnvelope {
                error: ErrorBody {
                    code,
                    message,
                    details,
                    request_id: None,
                },
            }),
        )
            .into_response();

        if let AppError::RateLimited { retry_after_seconds } = self {
            res.headers_mut()
                .insert(axum::http::header::RETRY_AFTER, retry_after_seconds.into());
        }

        res
    }
}

/// Flatten validator errors into the `field -> [message…]` map the wire
/// envelope carries.
fn validation_fields(errs: &validator::ValidationErrors) -> Value {
    let mut fields = serde_json::Map::new();
    for (field, errors) in errs.field_errors() {
        let messages: Vec<Value> = errors
            .iter()
            .map(|e| {
                e.message
                    .as_ref()
                    .map(|m| Value::String(m.to_string()))
                    .unwrap_or_else(|| Value::String(e.code.to_string()))
            })
            .collect();
        fields.insert(field.to_string(), Value::Array(messages));
    }
    Value::Object(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_map_to_statuses() {
        let cases: Vec<(AppError, StatusCode, &str)> = vec![
            (
                AppError::BadRequest(anyhow::anyhow!("nope")),
                StatusCode::BAD_REQUEST,
                "bad_request",
            ),
            (AppError::Unauthorized, StatusCode::UNAUTHORIZED, "unauthorized"),
            (
                AppError::Forbidden(anyhow::anyhow!("missing capability")),
                StatusCode::FORBIDDEN,
                "forbidden",
            ),
            (
                AppError::UseLimitExceeded,
                StatusCode::FORBIDDEN,
                "use_limit_exceeded",
            ),
            (
                AppError::DeviceLimitExceeded,
                StatusCode::FORBIDDEN,
                "device_limit_exceeded",
            ),
            (
                AppError::NotFound(anyhow::anyhow!("gone")),
                StatusCode::NOT_FOUND,
                "not_found",
            ),
            (
                AppError::Conflict(anyhow::anyhow!("duplicate")),
                StatusCode::CONFLICT,
                "conflict",
            ),
            (
                AppError::ValidationFailed(json!({"fields": {}})),
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_failed",
            ),
            (
                AppError::RateLimited {
                    retry_after_seconds: 30,
                },
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
            ),
            (
                AppError::ServiceUnavailable,
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
            ),
        ];

        for (err, status, code) in cases {
            assert_eq!(err.code(), code);
            assert_eq!(err.status(), status);
        }
    }

    #[test]
    fn test_unauthorized_message_is_generic() {
        // The envelope must never leak which verification step failed.
        let res = AppError::Unauthorized.into_response();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
