//! Post and comment models.
//!
//! The platform around the credential core owns post semantics; the core
//! needs only the ownership edge and enough storage to exercise the
//! authorization path end to end.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::id;

/// Post entity.
#[derive(Debug, Clone, FromRow)]
pub struct Post {
    pub post_id: Uuid,
    pub author_key_id: Uuid,
    pub title: String,
    pub body: String,
    pub created_utc: DateTime<Utc>,
}

impl Post {
    pub fn new(author_key_id: Uuid, title: String, body: String, now: DateTime<Utc>) -> Self {
        Self {
            post_id: id::fresh_id(),
            author_key_id,
            title,
            body,
            created_utc: now,
        }
    }
}

/// Comment entity.
#[derive(Debug, Clone, FromRow)]
pub struct Comment {
    pub comment_id: Uuid,
    pub post_id: Uuid,
    pub author_key_id: Uuid,
    pub body: String,
    pub created_utc: DateTime<Utc>,
}

impl Comment {
    pub fn new(post_id: Uuid, author_key_id: Uuid, body: String, now: DateTime<Utc>) -> Self {
        Self {
            comment_id: id::fresh_id(),
            post_id,
            author_key_id,
            body,
            created_utc: now,
        }
    }
}

/// Request to create a post.
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 255, message = "must be 1-255 characters"))]
    pub title: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub body: String,
}

/// Request to comment on a post.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub body: String,
}

/// Post view for API responses.
#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub post_id: String,
    pub author_key_id: String,
    pub title: String,
    pub body: String,
    pub created_utc: DateTime<Utc>,
}

impl From<Post> for PostResponse {
    fn from(p: Post) -> Self {
        Self {
            post_id: id::to_external(p.post_id),
            author_key_id: id::to_external(p.author_key_id),
            title: p.title,
            body: p.body,
            created_utc: p.created_utc,
        }
    }
}

/// Comment view for API responses.
#[derive(Debug, Serialize)]
pub struct CommentResponse {
    pub comment_id: String,
    pub post_id: String,
    pub author_key_id: String,
    pub body: String,
    pub created_utc: DateTime<Utc>,
}

impl From<Comment> for CommentResponse {
    fn from(c: Comment) -> Self {
        Self {
            comment_id: id::to_external(c.comment_id),
            post_id: id::to_external(c.post_id),
            author_key_id: id::to_external(c.author_key_id),
            body: c.body,
            created_utc: c.created_utc,
        }
    }
}
