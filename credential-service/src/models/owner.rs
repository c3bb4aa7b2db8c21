//! Owner model - human principals on the Console surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::id;

/// Owner entity.
#[derive(Debug, Clone, FromRow)]
pub struct Owner {
    pub owner_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Owner {
    /// Create a new owner row.
    pub fn new(email: String, password_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            owner_id: id::fresh_id(),
            email,
            password_hash,
            created_utc: now,
            updated_utc: now,
        }
    }
}

/// Request to register an owner.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterOwnerRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 12, message = "must be at least 12 characters"))]
    pub password: String,
}

/// Request to log in as an owner.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Owner view for API responses.
#[derive(Debug, Serialize)]
pub struct OwnerResponse {
    pub owner_id: String,
    pub email: String,
    pub created_utc: DateTime<Utc>,
}

impl From<Owner> for OwnerResponse {
    fn from(o: Owner) -> Self {
        Self {
            owner_id: id::to_external(o.owner_id),
            email: o.email,
            created_utc: o.created_utc,
        }
    }
}
