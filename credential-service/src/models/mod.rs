//! Data models for the credential platform.
//!
//! PostgreSQL-backed entities plus the request/response types the JSON
//! surfaces exchange. Lineage and rotation fields are immutable after
//! insert; models expose constructors and predicates, never mutation of
//! those fields.

pub mod access_grant;
pub mod access_mask;
pub mod audit_event;
pub mod capability;
pub mod group;
pub mod id;
pub mod key;
pub mod owner;
pub mod post;
pub mod principal;
pub mod refresh_token;

// Re-export main types for convenience
pub use access_grant::{GrantResponse, PostAccessGrant, TargetKind, UpsertGrantRequest};
pub use audit_event::{actions, ActorKind, AuditEvent};
pub use capability::CatalogViolation;
pub use group::{AddMemberRequest, CreateGroupRequest, Group, GroupMember, GroupResponse};
pub use key::{
    Key, KeyPublicId, KeyResponse, KeyType, MintChildRequest, MintPrimaryRequest,
    MintedKeyResponse,
};
pub use owner::{LoginRequest, Owner, OwnerResponse, RegisterOwnerRequest};
pub use post::{
    Comment, CommentResponse, CreateCommentRequest, CreatePostRequest, Post, PostResponse,
};
pub use principal::Principal;
pub use refresh_token::{RefreshToken, SubjectKind};
