//! Key model - machine credentials forming a delegation hierarchy.
//!
//! Lineage fields (`parent_key_id`, `issued_by_key_id`,
//! `initial_author_key_id`, `rotated_from_id`, `rotated_to_id`) are
//! immutable after insert and only ever point backwards in time, so the
//! hierarchy is acyclic by construction. Once `retired_utc` is set the
//! row is terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::id;

/// Key subtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Primary,
    Secondary,
    Use,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Primary => "primary",
            KeyType::Secondary => "secondary",
            KeyType::Use => "use",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "primary" => Some(KeyType::Primary),
            "secondary" => Some(KeyType::Secondary),
            "use" => Some(KeyType::Use),
            _ => None,
        }
    }

    /// Key types allowed to mint children.
    pub fn may_issue(&self) -> bool {
        matches!(self, KeyType::Primary | KeyType::Secondary)
    }
}

/// Key entity.
#[derive(Debug, Clone, FromRow)]
pub struct Key {
    pub key_id: Uuid,
    pub owner_id: Option<Uuid>,
    pub key_type: String,
    pub secret_hash: String,
    pub permissions: Vec<String>,
    pub active: bool,
    pub issued_by_key_id: Option<Uuid>,
    pub parent_key_id: Option<Uuid>,
    pub initial_author_key_id: Uuid,
    pub rotated_from_id: Option<Uuid>,
    pub rotated_to_id: Option<Uuid>,
    pub retired_utc: Option<DateTime<Utc>>,
    pub use_count_limit: Option<i32>,
    pub use_count_current: i32,
    pub device_limit: Option<i32>,
    pub label: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Key {
    /// Create a primary key row: owner-rooted, its own lineage root.
    pub fn new_primary(
        owner_id: Uuid,
        secret_hash: String,
        permissions: Vec<String>,
        label: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let key_id = id::fresh_id();
        Self {
            key_id,
            owner_id: Some(owner_id),
            key_type: KeyType::Primary.as_str().to_string(),
            secret_hash,
            permissions,
            active: true,
            issued_by_key_id: None,
            parent_key_id: None,
            initial_author_key_id: key_id,
            rotated_from_id: None,
            rotated_to_id: None,
            retired_utc: None,
            use_count_limit: None,
            use_count_current: 0,
            device_limit: None,
            label,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Create a child key row under `parent`, inheriting the lineage root.
    #[allow(clippy::too_many_arguments)]
    pub fn new_child(
        parent: &Key,
        kind: KeyType,
        secret_hash: String,
        permissions: Vec<String>,
        use_count_limit: Option<i32>,
        device_limit: Option<i32>,
        label: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key_id: id::fresh_id(),
            owner_id: None,
            key_type: kind.as_str().to_string(),
            secret_hash,
            permissions,
            active: true,
            issued_by_key_id: Some(parent.key_id),
            parent_key_id: Some(parent.key_id),
            initial_author_key_id: parent.initial_author_key_id,
            rotated_from_id: None,
            rotated_to_id: None,
            retired_utc: None,
            use_count_limit,
            use_count_current: 0,
            device_limit,
            label,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Create the replacement row for a rotation.
    ///
    /// Preserves type, permissions, lineage, limits and label; resets the
    /// use counter and carries the back-reference to the retired row.
    pub fn replacement_for(old: &Key, secret_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            key_id: id::fresh_id(),
            owner_id: old.owner_id,
            key_type: old.key_type.clone(),
            secret_hash,
            permissions: old.permissions.clone(),
            active: true,
            issued_by_key_id: old.issued_by_key_id,
            parent_key_id: old.parent_key_id,
            initial_author_key_id: old.initial_author_key_id,
            rotated_from_id: Some(old.key_id),
            rotated_to_id: None,
            retired_utc: None,
            use_count_limit: old.use_count_limit,
            use_count_current: 0,
            device_limit: old.device_limit,
            label: old.label.clone(),
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Get the subtype as an enum.
    pub fn kind(&self) -> KeyType {
        KeyType::parse(&self.key_type).unwrap_or(KeyType::Use)
    }

    /// A key can authenticate while active and not retired.
    pub fn is_usable(&self) -> bool {
        self.active && self.retired_utc.is_none()
    }
}

/// 1:1 binding of an `apub_…` public id to a key row.
#[derive(Debug, Clone, FromRow)]
pub struct KeyPublicId {
    pub public_id: String,
    pub key_id: Uuid,
}

impl KeyPublicId {
    pub fn new(key_id: Uuid) -> Self {
        Self {
            public_id: id::fresh_public_id(),
            key_id,
        }
    }
}

/// Request to mint a primary key (Console).
#[derive(Debug, Deserialize)]
pub struct MintPrimaryRequest {
    pub permissions: Vec<String>,
    pub label: Option<String>,
}

/// Request to mint a child key (Gateway).
#[derive(Debug, Deserialize)]
pub struct MintChildRequest {
    pub key_type: KeyType,
    pub permissions: Vec<String>,
    pub use_count_limit: Option<i32>,
    pub device_limit: Option<i32>,
    pub label: Option<String>,
}

/// Response to a mint or rotate: the only time the secret is produced.
#[derive(Debug, Serialize)]
pub struct MintedKeyResponse {
    pub key_id: String,
    pub key_public_id: String,
    pub key_secret: String,
}

/// Key view for listings; the secret hash never leaves the store.
#[derive(Debug, Serialize)]
pub struct KeyResponse {
    pub key_id: String,
    pub key_type: String,
    pub permissions: Vec<String>,
    pub active: bool,
    pub parent_key_id: Option<String>,
    pub initial_author_key_id: String,
    pub rotated_from_id: Option<String>,
    pub rotated_to_id: Option<String>,
    pub retired_utc: Option<DateTime<Utc>>,
    pub use_count_limit: Option<i32>,
    pub use_count_current: i32,
    pub device_limit: Option<i32>,
    pub label: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl From<Key> for KeyResponse {
    fn from(k: Key) -> Self {
        Self {
            key_id: id::to_external(k.key_id),
            key_type: k.key_type,
            permissions: k.permissions,
            active: k.active,
            parent_key_id: k.parent_key_id.map(id::to_external),
            initial_author_key_id: id::to_external(k.initial_author_key_id),
            rotated_from_id: k.rotated_from_id.map(id::to_external),
            rotated_to_id: k.rotated_to_id.map(id::to_external),
            retired_utc: k.retired_utc,
            use_count_limit: k.use_count_limit,
            use_count_current: k.use_count_current,
            device_limit: k.device_limit,
            label: k.label,
            created_utc: k.created_utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn perms(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_primary_is_its_own_lineage_root() {
        let k = Key::new_primary(
            id::fresh_id(),
            "hash".into(),
            perms(&["keys:issue"]),
            Some("root".into()),
            now(),
        );
        assert_eq!(k.initial_author_key_id, k.key_id);
        assert!(k.parent_key_id.is_none());
        assert!(k.issued_by_key_id.is_none());
        assert!(k.owner_id.is_some());
        assert!(k.is_usable());
        assert_eq!(k.kind(), KeyType::Primary);
    }

    #[test]
    fn test_child_inherits_lineage_root() {
        let parent = Key::new_primary(
            id::fresh_id(),
            "hash".into(),
            perms(&["keys:issue", "posts:read"]),
            None,
            now(),
        );
        let child = Key::new_child(
            &parent,
            KeyType::Secondary,
            "hash2".into(),
            perms(&["posts:read"]),
            None,
            None,
            None,
            now(),
        );
        assert_eq!(child.initial_author_key_id, parent.initial_author_key_id);
        assert_eq!(child.parent_key_id, Some(parent.key_id));
        assert_eq!(child.issued_by_key_id, Some(parent.key_id));
        assert!(child.owner_id.is_none());

        let grandchild = Key::new_child(
            &child,
            KeyType::Use,
            "hash3".into(),
            perms(&["posts:read"]),
            Some(5),
            Some(2),
            None,
            now(),
        );
        assert_eq!(
            grandchild.initial_author_key_id,
            parent.initial_author_key_id
        );
    }

    #[test]
    fn test_replacement_preserves_shape_and_resets_counter() {
        let parent = Key::new_primary(
            id::fresh_id(),
            "h".into(),
            perms(&["keys:issue", "posts:read"]),
            None,
            now(),
        );
        let mut old = Key::new_child(
            &parent,
            KeyType::Use,
            "h2".into(),
            perms(&["posts:read"]),
            Some(10),
            Some(3),
            Some("ci".into()),
            now(),
        );
        old.use_count_current = 7;

        let new = Key::replacement_for(&old, "h3".into(), now());
        assert_ne!(new.key_id, old.key_id);
        assert_eq!(new.key_type, old.key_type);
        assert_eq!(new.permissions, old.permissions);
        assert_eq!(new.parent_key_id, old.parent_key_id);
        assert_eq!(new.issued_by_key_id, old.issued_by_key_id);
        assert_eq!(new.initial_author_key_id, old.initial_author_key_id);
        assert_eq!(new.rotated_from_id, Some(old.key_id));
        assert_eq!(new.use_count_limit, Some(10));
        assert_eq!(new.use_count_current, 0);
        assert_eq!(new.device_limit, Some(3));
        assert_eq!(new.label.as_deref(), Some("ci"));
        assert!(new.active);
        assert!(new.retired_utc.is_none());
    }

    #[test]
    fn test_key_type_issue_rights() {
        assert!(KeyType::Primary.may_issue());
        assert!(KeyType::Secondary.may_issue());
        assert!(!KeyType::Use.may_issue());
    }
}
