//! Service layer errors.
//!
//! Services return typed errors; the surface adapter alone turns them
//! into wire envelopes via `From<ServiceError> for AppError`.

use serde_json::json;
use service_core::error::AppError;
use thiserror::Error;

use crate::models::CatalogViolation;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),

    /// Any credential-to-token failure: bad password, unknown public id,
    /// inactive key, unusable refresh token. Always surfaces generically.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// A refresh token already rotated was presented again. Surfaces as
    /// `unauthorized` but is a high-severity event internally.
    #[error("Refresh token replay detected")]
    Replay,

    #[error("Use limit exceeded")]
    UseLimitExceeded,

    #[error("Device limit exceeded")]
    DeviceLimitExceeded,

    #[error("Capability request rejected")]
    Catalog(CatalogViolation),

    #[error("Validation failed: {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Missing capability: {0}")]
    MissingCapability(String),

    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    #[error("Key is already retired")]
    AlreadyRetired,

    #[error("Email already registered")]
    EmailAlreadyRegistered,
}

impl From<CatalogViolation> for ServiceError {
    fn from(v: CatalogViolation) -> Self {
        ServiceError::Catalog(v)
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => {
                AppError::DatabaseError(anyhow::anyhow!("Database error: {}", e))
            }
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::InvalidCredentials | ServiceError::Replay => AppError::Unauthorized,
            ServiceError::UseLimitExceeded => AppError::UseLimitExceeded,
            ServiceError::DeviceLimitExceeded => AppError::DeviceLimitExceeded,
            ServiceError::Catalog(violation) => {
                let details = match violation {
                    CatalogViolation::Malformed(v) => json!({ "invalid_permissions": v }),
                    CatalogViolation::Unrecognized(v) => json!({ "invalid_permissions": v }),
                    CatalogViolation::OutsideEnvelope(v) => json!({ "missing_permissions": v }),
                    CatalogViolation::ForbiddenForUseKey(v) => {
                        json!({ "forbidden_permissions": v })
                    }
                };
                AppError::ValidationFailed(details)
            }
            ServiceError::Validation { field, message } => {
                AppError::ValidationFailed(json!({ "fields": { field: [message] } }))
            }
            ServiceError::NotFound(what) => AppError::NotFound(anyhow::anyhow!("{} not found", what)),
            ServiceError::MissingCapability(cap) => {
                AppError::Forbidden(anyhow::anyhow!("Missing capability: {}", cap))
            }
            ServiceError::Forbidden(msg) => AppError::Forbidden(anyhow::anyhow!(msg.to_string())),
            ServiceError::AlreadyRetired => {
                AppError::Conflict(anyhow::anyhow!("Key is already retired"))
            }
            ServiceError::EmailAlreadyRegistered => {
                AppError::Conflict(anyhow::anyhow!("Email already registered"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_violation_carries_missing_permissions() {
        let err: AppError = ServiceError::Catalog(CatalogViolation::OutsideEnvelope(vec![
            "keys:issue".to_string(),
        ]))
        .into();
        match err {
            AppError::ValidationFailed(details) => {
                assert_eq!(details["missing_permissions"][0], "keys:issue");
            }
            other => panic!("unexpected mapping: {other:?}"),
        }
    }

    #[test]
    fn test_use_key_violation_carries_forbidden_permissions() {
        let err: AppError = ServiceError::Catalog(CatalogViolation::ForbiddenForUseKey(vec![
            "posts:create".to_string(),
        ]))
        .into();
        match err {
            AppError::ValidationFailed(details) => {
                assert_eq!(details["forbidden_permissions"][0], "posts:create");
            }
            other => panic!("unexpected mapping: {other:?}"),
        }
    }

    #[test]
    fn test_replay_surfaces_as_unauthorized() {
        let err: AppError = ServiceError::Replay.into();
        assert_eq!(err.code(), "unauthorized");
    }

    #[test]
    fn test_limit_errors_have_refined_codes() {
        assert_eq!(AppError::from(ServiceError::UseLimitExceeded).code(), "use_limit_exceeded");
        assert_eq!(
            AppError::from(ServiceError::DeviceLimitExceeded).code(),
            "device_limit_exceeded"
        );
    }
}
