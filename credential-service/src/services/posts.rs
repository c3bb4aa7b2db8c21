//! Post-store collaborator seam.
//!
//! The post store is external to the credential core; this is the narrow
//! contract the core needs from it, with the bundled PostgreSQL
//! implementation used by the platform.

use async_trait::async_trait;
use uuid::Uuid;

use super::{Database, ServiceError};
use crate::models::Post;

/// What the credential core requires from a post store.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn post_exists(&self, post_id: Uuid) -> Result<bool, ServiceError>;

    /// Lineage root of the post's authoring key, for ownership checks.
    async fn post_initial_author_key(&self, post_id: Uuid)
        -> Result<Option<Uuid>, ServiceError>;

    /// Ids of posts the key may VIEW, honoring mask resolution, newest
    /// first. `before` is an exclusive cursor post id.
    async fn list_visible_post_ids(
        &self,
        key_id: Uuid,
        group_ids: &[Uuid],
        before: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Uuid>, ServiceError>;
}

/// PostgreSQL-backed post store.
#[derive(Clone)]
pub struct PgPostStore {
    db: Database,
}

impl PgPostStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn find(&self, post_id: Uuid) -> Result<Option<Post>, ServiceError> {
        Ok(self.db.find_post_by_id(post_id).await?)
    }

    /// Resolve a page of post ids (e.g. from `list_visible_post_ids`)
    /// back to rows, preserving the input order.
    pub async fn find_many(&self, post_ids: &[Uuid]) -> Result<Vec<Post>, ServiceError> {
        let mut rows = self.db.find_posts_by_ids(post_ids).await?;
        rows.sort_by_key(|p| post_ids.iter().position(|id| *id == p.post_id));
        Ok(rows)
    }

    /// Full rows for the visible page; the trait's id-only view wraps
    /// this.
    pub async fn list_visible(
        &self,
        key_id: Uuid,
        group_ids: &[Uuid],
        before: Option<Uuid>,
        since: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Post>, ServiceError> {
        let before_row = self.cursor_row(before).await?;
        let since_row = self.cursor_row(since).await?;
        Ok(self
            .db
            .list_visible_posts(key_id, group_ids, limit, before_row.as_ref(), since_row.as_ref())
            .await?)
    }

    async fn cursor_row(&self, cursor: Option<Uuid>) -> Result<Option<Post>, ServiceError> {
        match cursor {
            Some(post_id) => Ok(Some(
                self.db
                    .find_post_by_id(post_id)
                    .await?
                    .ok_or(ServiceError::NotFound("cursor"))?,
            )),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn post_exists(&self, post_id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.db.find_post_by_id(post_id).await?.is_some())
    }

    async fn post_initial_author_key(
        &self,
        post_id: Uuid,
    ) -> Result<Option<Uuid>, ServiceError> {
        let Some(post) = self.db.find_post_by_id(post_id).await? else {
            return Ok(None);
        };
        let author = self.db.find_key_by_id(post.author_key_id).await?;
        Ok(author.map(|k| k.initial_author_key_id))
    }

    async fn list_visible_post_ids(
        &self,
        key_id: Uuid,
        group_ids: &[Uuid],
        before: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Uuid>, ServiceError> {
        Ok(self
            .list_visible(key_id, group_ids, before, None, limit)
            .await?
            .into_iter()
            .map(|p| p.post_id)
            .collect())
    }
}
