//! Audit event model - append-only action log.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use super::id;

/// Dotted action names recorded by the platform.
pub mod actions {
    pub const OWNERS_REGISTER: &str = "owners:register";
    pub const OWNERS_LOGIN: &str = "owners:login";
    pub const OWNERS_LOGOUT: &str = "owners:logout";
    pub const KEYS_MINT: &str = "keys:mint";
    pub const KEYS_ROTATE: &str = "keys:rotate";
    pub const KEYS_ACTIVATE: &str = "keys:activate";
    pub const KEYS_DEACTIVATE: &str = "keys:deactivate";
    pub const KEYS_EXCHANGE: &str = "keys:exchange";
    pub const REFRESH_REPLAY_ATTEMPT: &str = "refresh:replay_attempt";
    pub const POSTS_CREATE: &str = "posts:create";
    pub const ACCESS_GRANT: &str = "posts:access:grant";
    pub const ACCESS_REVOKE: &str = "posts:access:revoke";
    pub const GROUPS_CREATE: &str = "groups:create";
    pub const GROUPS_MEMBER_ADD: &str = "groups:member_add";
    pub const GROUPS_MEMBER_REMOVE: &str = "groups:member_remove";
}

/// Actor taxonomy for the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    Owner,
    Key,
}

impl ActorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorKind::Owner => "owner",
            ActorKind::Key => "key",
        }
    }
}

/// Audit event entity. Rows are append-only; there is no update or
/// delete path.
#[derive(Debug, Clone, FromRow)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub actor_kind: String,
    pub actor_id: Uuid,
    pub action: String,
    pub subject_kind: Option<String>,
    pub subject_id: Option<Uuid>,
    pub event_data: Option<serde_json::Value>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(actor_kind: ActorKind, actor_id: Uuid, action: &str, now: DateTime<Utc>) -> Self {
        Self {
            event_id: id::fresh_id(),
            actor_kind: actor_kind.as_str().to_string(),
            actor_id,
            action: action.to_string(),
            subject_kind: None,
            subject_id: None,
            event_data: None,
            ip: None,
            user_agent: None,
            created_utc: now,
        }
    }

    pub fn with_subject(mut self, kind: &str, subject_id: Uuid) -> Self {
        self.subject_kind = Some(kind.to_string());
        self.subject_id = Some(subject_id);
        self
    }

    /// Attach metadata; the recorder sanitizes it before the write.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.event_data = Some(metadata);
        self
    }

    pub fn with_request_meta(mut self, ip: Option<String>, user_agent: Option<String>) -> Self {
        self.ip = ip;
        self.user_agent = user_agent;
        self
    }
}
