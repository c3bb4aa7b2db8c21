//! Refresh token model.
//!
//! The opaque token value is never stored: `lookup_digest` (keyed, fast)
//! locates the row, `secret_hash` (memory-hard) authenticates it.
//! `rotated_utc` transitions null to non-null exactly once; a presented
//! token whose row is already rotated signals replay.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::id;

/// Who a refresh token renews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    Owner,
    Key,
}

impl SubjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::Owner => "owner",
            SubjectKind::Key => "key",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(SubjectKind::Owner),
            "key" => Some(SubjectKind::Key),
            _ => None,
        }
    }
}

/// Refresh token entity.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub token_id: Uuid,
    pub subject_kind: String,
    pub subject_id: Uuid,
    pub secret_hash: String,
    pub lookup_digest: Vec<u8>,
    pub issued_utc: DateTime<Utc>,
    pub expires_utc: DateTime<Utc>,
    pub revoked_utc: Option<DateTime<Utc>>,
    pub rotated_utc: Option<DateTime<Utc>>,
    pub replaced_by_id: Option<Uuid>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RefreshToken {
    /// Create a new refresh token row.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        subject_kind: SubjectKind,
        subject_id: Uuid,
        secret_hash: String,
        lookup_digest: Vec<u8>,
        ttl_seconds: i64,
        ip: Option<String>,
        user_agent: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            token_id: id::fresh_id(),
            subject_kind: subject_kind.as_str().to_string(),
            subject_id,
            secret_hash,
            lookup_digest,
            issued_utc: now,
            expires_utc: now + Duration::seconds(ttl_seconds),
            revoked_utc: None,
            rotated_utc: None,
            replaced_by_id: None,
            ip,
            user_agent,
        }
    }

    pub fn subject(&self) -> Option<SubjectKind> {
        SubjectKind::parse(&self.subject_kind)
    }

    /// Usable: not expired, not revoked, not yet rotated.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.expires_utc > now && self.revoked_utc.is_none() && self.rotated_utc.is_none()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_utc <= now
    }
}
