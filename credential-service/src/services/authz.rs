//! Authorization evaluator.
//!
//! Two layers: global capability strings, then per-post bitmasks with
//! group-membership resolution. For read-family actions the visibility
//! check runs before any capability denial so that a hidden post is
//! indistinguishable from a missing one.

use std::sync::Arc;
use uuid::Uuid;

use super::{Database, PostStore, ServiceError};
use crate::models::{access_mask, KeyType, Principal};

/// Which surface an action belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Owner,
    Key,
}

/// Closed enumeration of authorizable actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    // Console (owner) surface.
    MintPrimaryKey,
    ReadKeys,
    RotateKey,
    UpdateKeyState,
    ManageGroups,
    AdminReadPosts,
    OwnerManageAccess,
    // Gateway (key) surface.
    MintChildKey,
    CreatePost,
    ReadPost,
    Comment,
    ManagePostAccess,
    ReadGroups,
    ManageKeychains,
}

impl Action {
    /// Capability required by the action table.
    pub fn required_capability(&self) -> &'static str {
        match self {
            Action::MintPrimaryKey => "keys:issue",
            Action::ReadKeys => "keys:read",
            Action::RotateKey => "keys:rotate",
            Action::UpdateKeyState => "keys:state:update",
            Action::ManageGroups => "groups:manage",
            Action::AdminReadPosts => "posts:admin:read",
            Action::OwnerManageAccess => "posts:access:manage",
            Action::MintChildKey => "keys:issue",
            Action::CreatePost => "posts:create",
            Action::ReadPost => "posts:read",
            Action::Comment => "comments:write",
            Action::ManagePostAccess => "posts:access:manage",
            Action::ReadGroups => "groups:read",
            Action::ManageKeychains => "keychains:manage",
        }
    }

    pub fn surface(&self) -> Surface {
        match self {
            Action::MintPrimaryKey
            | Action::ReadKeys
            | Action::RotateKey
            | Action::UpdateKeyState
            | Action::ManageGroups
            | Action::AdminReadPosts
            | Action::OwnerManageAccess => Surface::Owner,
            Action::MintChildKey
            | Action::CreatePost
            | Action::ReadPost
            | Action::Comment
            | Action::ManagePostAccess
            | Action::ReadGroups
            | Action::ManageKeychains => Surface::Key,
        }
    }

    /// Post-scoped actions resolve an effective mask; others do not.
    pub fn is_post_scoped(&self) -> bool {
        matches!(self, Action::ReadPost | Action::Comment | Action::ManagePostAccess)
    }

    /// Read-family actions let visibility hiding take precedence over a
    /// capability denial.
    pub fn is_post_read_family(&self) -> bool {
        matches!(self, Action::ReadPost)
    }

    /// Mask bit the action additionally requires, beyond VIEW.
    pub fn required_mask_bit(&self) -> Option<i32> {
        match self {
            Action::ReadPost => None, // satisfied by the VIEW gate itself
            Action::Comment => Some(access_mask::COMMENT),
            Action::ManagePostAccess => Some(access_mask::MANAGE_ACCESS),
            _ => None,
        }
    }
}

/// Why a request was denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyKind {
    /// Hidden-or-missing; the caller must not be able to tell which.
    NotFound,
    /// Authenticated but not allowed; may name the missing capability
    /// when the caller is permitted to see the resource at all.
    Forbidden { missing_capability: Option<&'static str> },
}

/// Authorization decision. The 404-vs-403 contract is part of the type;
/// surface adapters must not reorder it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyKind),
}

impl Decision {
    pub fn forbidden(missing: &'static str) -> Self {
        Decision::Deny(DenyKind::Forbidden {
            missing_capability: Some(missing),
        })
    }

    pub fn forbidden_unnamed() -> Self {
        Decision::Deny(DenyKind::Forbidden {
            missing_capability: None,
        })
    }

    pub fn not_found() -> Self {
        Decision::Deny(DenyKind::NotFound)
    }

    /// Map a denial to the service error the surface adapter renders.
    pub fn into_result(self) -> Result<(), ServiceError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(DenyKind::NotFound) => Err(ServiceError::NotFound("post")),
            Decision::Deny(DenyKind::Forbidden { missing_capability }) => match missing_capability {
                Some(cap) => Err(ServiceError::MissingCapability(cap.to_string())),
                None => Err(ServiceError::Forbidden("Action not permitted")),
            },
        }
    }
}

/// Pure evaluation against an already-resolved effective mask.
///
/// `effective_mask` must be present for post-scoped actions and is
/// ignored otherwise.
pub fn evaluate_masked(
    principal: &Principal,
    action: Action,
    effective_mask: Option<i32>,
) -> Decision {
    let surface_matches = match action.surface() {
        Surface::Owner => matches!(principal, Principal::Owner { .. }),
        Surface::Key => matches!(principal, Principal::Key { .. }),
    };
    if !surface_matches {
        return Decision::forbidden_unnamed();
    }

    let capability = action.required_capability();
    let has_capability = principal.has_permission(capability);

    if !has_capability && !action.is_post_read_family() {
        return Decision::forbidden(capability);
    }

    if action.is_post_scoped() {
        let mask = effective_mask.unwrap_or(0);
        if !access_mask::has(mask, access_mask::VIEW) {
            return Decision::not_found();
        }
        // Visibility settled; a deferred capability failure may now
        // surface as forbidden without leaking existence.
        if !has_capability {
            return Decision::forbidden(capability);
        }
        if let Some(bit) = action.required_mask_bit() {
            if !access_mask::has(mask, bit) {
                return Decision::forbidden_unnamed();
            }
        }
    }

    // Key-type guards for non-post actions.
    if matches!(action, Action::CreatePost | Action::MintChildKey)
        && principal.key_type() == Some(KeyType::Use)
    {
        return Decision::forbidden_unnamed();
    }

    Decision::Allow
}

/// Evaluator bound to the credential store for mask resolution and the
/// post-store collaborator for existence checks.
#[derive(Clone)]
pub struct AuthzService {
    db: Database,
    posts: Arc<dyn PostStore>,
}

impl AuthzService {
    pub fn new(db: Database, posts: Arc<dyn PostStore>) -> Self {
        Self { db, posts }
    }

    /// Canonical entry point: for post-scoped actions, confirm the post
    /// exists and resolve the effective mask, then evaluate. A missing
    /// post and a hidden one produce the same denial.
    pub async fn authorize(
        &self,
        principal: &Principal,
        action: Action,
        post_id: Option<Uuid>,
    ) -> Result<Decision, ServiceError> {
        let effective_mask = match (action.is_post_scoped(), post_id) {
            (true, Some(post_id)) => {
                if !self.posts.post_exists(post_id).await? {
                    return Ok(Decision::not_found());
                }
                let groups = self.db.groups_for_key(principal.id()).await?;
                Some(
                    self.db
                        .resolve_access_mask(post_id, principal.id(), &groups)
                        .await?,
                )
            }
            (true, None) => Some(0),
            (false, _) => None,
        };
        Ok(evaluate_masked(principal, action, effective_mask))
    }
}
