//! Post access grant model.
//!
//! A grant authorizes one key or one group for one post with a bitmask.
//! `(post_id, target_kind, target_id)` is the identity; writes are
//! upserts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::id;

/// What a grant points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Key,
    Group,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Key => "key",
            TargetKind::Group => "group",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "key" => Some(TargetKind::Key),
            "group" => Some(TargetKind::Group),
            _ => None,
        }
    }
}

/// Access grant entity.
#[derive(Debug, Clone, FromRow)]
pub struct PostAccessGrant {
    pub grant_id: Uuid,
    pub post_id: Uuid,
    pub target_kind: String,
    pub target_id: Uuid,
    pub permission_mask: i32,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl PostAccessGrant {
    pub fn new(
        post_id: Uuid,
        target_kind: TargetKind,
        target_id: Uuid,
        permission_mask: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            grant_id: id::fresh_id(),
            post_id,
            target_kind: target_kind.as_str().to_string(),
            target_id,
            permission_mask,
            created_utc: now,
            updated_utc: now,
        }
    }
}

/// Request to upsert a grant.
#[derive(Debug, Deserialize)]
pub struct UpsertGrantRequest {
    pub target_kind: TargetKind,
    pub target_id: String,
    pub permission_mask: i32,
}

/// Grant view for API responses.
#[derive(Debug, Serialize)]
pub struct GrantResponse {
    pub post_id: String,
    pub target_kind: String,
    pub target_id: String,
    pub permission_mask: i32,
    pub updated_utc: DateTime<Utc>,
}

impl From<PostAccessGrant> for GrantResponse {
    fn from(g: PostAccessGrant) -> Self {
        Self {
            post_id: id::to_external(g.post_id),
            target_kind: g.target_kind,
            target_id: id::to_external(g.target_id),
            permission_mask: g.permission_mask,
            updated_utc: g.updated_utc,
        }
    }
}
