//! Authenticated principal attached to requests by the gatekeeper.
//!
//! Surface adapters produce it; every service consumes it. Handlers
//! never reach into raw token claims.

use uuid::Uuid;

use super::audit_event::ActorKind;
use super::key::KeyType;

/// The authenticated caller.
#[derive(Debug, Clone)]
pub enum Principal {
    Owner {
        id: Uuid,
        permissions: Vec<String>,
    },
    Key {
        id: Uuid,
        key_type: KeyType,
        permissions: Vec<String>,
        initial_author_key_id: Uuid,
    },
}

impl Principal {
    pub fn id(&self) -> Uuid {
        match self {
            Principal::Owner { id, .. } | Principal::Key { id, .. } => *id,
        }
    }

    pub fn permissions(&self) -> &[String] {
        match self {
            Principal::Owner { permissions, .. } | Principal::Key { permissions, .. } => {
                permissions
            }
        }
    }

    pub fn has_permission(&self, capability: &str) -> bool {
        self.permissions().iter().any(|p| p == capability)
    }

    /// Key subtype, when the principal is a key.
    pub fn key_type(&self) -> Option<KeyType> {
        match self {
            Principal::Key { key_type, .. } => Some(*key_type),
            Principal::Owner { .. } => None,
        }
    }

    pub fn actor_kind(&self) -> ActorKind {
        match self {
            Principal::Owner { .. } => ActorKind::Owner,
            Principal::Key { .. } => ActorKind::Key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::id;

    #[test]
    fn test_permission_lookup() {
        let p = Principal::Key {
            id: id::fresh_id(),
            key_type: KeyType::Secondary,
            permissions: vec!["posts:read".into(), "comments:write".into()],
            initial_author_key_id: id::fresh_id(),
        };
        assert!(p.has_permission("posts:read"));
        assert!(!p.has_permission("posts:create"));
        assert_eq!(p.key_type(), Some(KeyType::Secondary));
    }
}
