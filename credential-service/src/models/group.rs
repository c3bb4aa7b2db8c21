//! Group model - named key collections owned by an owner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::id;

/// Group entity.
#[derive(Debug, Clone, FromRow)]
pub struct Group {
    pub group_id: Uuid,
    pub owner_id: Uuid,
    pub group_name: String,
    pub created_utc: DateTime<Utc>,
}

impl Group {
    pub fn new(owner_id: Uuid, group_name: String, now: DateTime<Utc>) -> Self {
        Self {
            group_id: id::fresh_id(),
            owner_id,
            group_name,
            created_utc: now,
        }
    }
}

/// Membership row; the pair is the identity.
#[derive(Debug, Clone, FromRow)]
pub struct GroupMember {
    pub group_id: Uuid,
    pub key_id: Uuid,
    pub created_utc: DateTime<Utc>,
}

/// Request to create a group.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateGroupRequest {
    #[validate(length(min = 1, max = 255, message = "must be 1-255 characters"))]
    pub name: String,
}

/// Request to add a key to a group.
#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub key_id: String,
}

/// Group view for API responses.
#[derive(Debug, Serialize)]
pub struct GroupResponse {
    pub group_id: String,
    pub name: String,
    pub created_utc: DateTime<Utc>,
}

impl From<Group> for GroupResponse {
    fn from(g: Group) -> Self {
        Self {
            group_id: id::to_external(g.group_id),
            name: g.group_name,
            created_utc: g.created_utc,
        }
    }
}
