//! PostgreSQL credential store.
//!
//! One typed method per query. Operations that cross tables (key +
//! public id, rotations) run in a single transaction; everything else is
//! a plain statement. Idempotent inserts (group members, device rows)
//! swallow unique-constraint collisions via `ON CONFLICT DO NOTHING`.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::models::{
    AuditEvent, Comment, Group, Key, KeyPublicId, Owner, Post, PostAccessGrant, RefreshToken,
};

/// Outcome of the serialized use-key admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseGate {
    Allowed,
    UseLimitExceeded,
    DeviceLimitExceeded,
}

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database wrapper from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open the credential store. Connections are recycled aggressively:
    /// every request holds one only for the span of a query or a short
    /// transaction, so a stuck acquire means the store is unhealthy.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(3600))
            .connect(&config.url)
            .await?;

        tracing::info!(
            max_connections = config.max_connections,
            "Credential store connected"
        );

        Ok(Self::new(pool))
    }

    /// Apply the credential schema migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Credential schema migrations applied");
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ==================== Owner Operations ====================

    pub async fn find_owner_by_id(&self, owner_id: Uuid) -> Result<Option<Owner>, sqlx::Error> {
        sqlx::query_as::<_, Owner>("SELECT * FROM owners WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Email lookup is case-sensitive by contract.
    pub async fn find_owner_by_email(&self, email: &str) -> Result<Option<Owner>, sqlx::Error> {
        sqlx::query_as::<_, Owner>("SELECT * FROM owners WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn insert_owner(&self, owner: &Owner) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO owners (owner_id, email, password_hash, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(owner.owner_id)
        .bind(&owner.email)
        .bind(&owner.password_hash)
        .bind(owner.created_utc)
        .bind(owner.updated_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ==================== Key Operations ====================

    pub async fn find_key_by_id(&self, key_id: Uuid) -> Result<Option<Key>, sqlx::Error> {
        sqlx::query_as::<_, Key>("SELECT * FROM api_keys WHERE key_id = $1")
            .bind(key_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Resolve an `apub_…` public id to its key row.
    pub async fn find_key_by_public_id(&self, public_id: &str) -> Result<Option<Key>, sqlx::Error> {
        sqlx::query_as::<_, Key>(
            r#"
            SELECT k.* FROM api_keys k
            JOIN key_public_ids p ON p.key_id = k.key_id
            WHERE p.public_id = $1
            "#,
        )
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn find_public_id_for_key(
        &self,
        key_id: Uuid,
    ) -> Result<Option<KeyPublicId>, sqlx::Error> {
        sqlx::query_as::<_, KeyPublicId>("SELECT * FROM key_public_ids WHERE key_id = $1")
            .bind(key_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// All keys in lineages rooted at the owner's primary keys.
    pub async fn list_keys_for_owner(&self, owner_id: Uuid) -> Result<Vec<Key>, sqlx::Error> {
        sqlx::query_as::<_, Key>(
            r#"
            SELECT * FROM api_keys
            WHERE initial_author_key_id IN
                (SELECT key_id FROM api_keys WHERE owner_id = $1)
            ORDER BY created_utc DESC, key_id DESC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Insert a key and its public id atomically.
    pub async fn create_key(
        &self,
        key: &Key,
        public_id: &KeyPublicId,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        insert_key(&mut tx, key).await?;
        insert_public_id(&mut tx, public_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Insert the replacement key + public id and retire the old row in
    /// one transaction. Returns false when the old row was already
    /// retired by a concurrent rotation.
    pub async fn rotate_key(
        &self,
        new_key: &Key,
        new_public_id: &KeyPublicId,
        old_key_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        insert_key(&mut tx, new_key).await?;
        insert_public_id(&mut tx, new_public_id).await?;

        let updated = sqlx::query(
            r#"
            UPDATE api_keys
            SET active = FALSE, rotated_to_id = $1, retired_utc = $2, updated_utc = $2
            WHERE key_id = $3 AND retired_utc IS NULL
            "#,
        )
        .bind(new_key.key_id)
        .bind(now)
        .bind(old_key_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Flip `active` on a set of keys; retired rows are terminal and
    /// never transition. Returns the number of rows that changed.
    pub async fn set_keys_active(
        &self,
        key_ids: &[Uuid],
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let updated = sqlx::query(
            r#"
            UPDATE api_keys
            SET active = $1, updated_utc = $2
            WHERE key_id = ANY($3) AND active <> $1 AND retired_utc IS NULL
            "#,
        )
        .bind(active)
        .bind(now)
        .bind(key_ids)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated)
    }

    /// Transitive children of a key, breadth-first via an iterative
    /// recursive expansion in SQL.
    pub async fn descendants(&self, key_id: Uuid) -> Result<Vec<Key>, sqlx::Error> {
        sqlx::query_as::<_, Key>(
            r#"
            WITH RECURSIVE offspring AS (
                SELECT k.*, 1 AS depth FROM api_keys k WHERE k.parent_key_id = $1
                UNION ALL
                SELECT k.*, o.depth + 1 FROM api_keys k
                JOIN offspring o ON k.parent_key_id = o.key_id
            )
            SELECT * FROM offspring ORDER BY depth, created_utc, key_id
            "#,
        )
        .bind(key_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Walk `parent_key_id` upward; returns root-to-leaf order.
    pub async fn lineage(&self, key_id: Uuid) -> Result<Vec<Key>, sqlx::Error> {
        sqlx::query_as::<_, Key>(
            r#"
            WITH RECURSIVE ancestry AS (
                SELECT k.*, 0 AS height FROM api_keys k WHERE k.key_id = $1
                UNION ALL
                SELECT k.*, a.height + 1 FROM api_keys k
                JOIN ancestry a ON k.key_id = a.parent_key_id
            )
            SELECT * FROM ancestry ORDER BY height DESC
            "#,
        )
        .bind(key_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Serialized admission for a use-key exchange: checks the use-count
    /// and device limits and registers usage under a row lock, so two
    /// concurrent exchanges cannot both pass a boundary.
    pub async fn gate_use_key(
        &self,
        key_id: Uuid,
        fingerprint: Vec<u8>,
        now: DateTime<Utc>,
    ) -> Result<UseGate, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let (use_count_limit, use_count_current, device_limit): (Option<i32>, i32, Option<i32>) =
            sqlx::query_as(
                r#"
                SELECT use_count_limit, use_count_current, device_limit
                FROM api_keys WHERE key_id = $1 FOR UPDATE
                "#,
            )
            .bind(key_id)
            .fetch_one(&mut *tx)
            .await?;

        if let Some(limit) = use_count_limit {
            if use_count_current >= limit {
                tx.rollback().await?;
                return Ok(UseGate::UseLimitExceeded);
            }
        }

        if let Some(limit) = device_limit {
            let registered: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM key_devices WHERE key_id = $1 AND fingerprint = $2)",
            )
            .bind(key_id)
            .bind(&fingerprint)
            .fetch_one(&mut *tx)
            .await?;

            if !registered {
                let count: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM key_devices WHERE key_id = $1")
                        .bind(key_id)
                        .fetch_one(&mut *tx)
                        .await?;
                if count >= limit as i64 {
                    tx.rollback().await?;
                    return Ok(UseGate::DeviceLimitExceeded);
                }
                sqlx::query(
                    r#"
                    INSERT INTO key_devices (key_id, fingerprint, created_utc)
                    VALUES ($1, $2, $3)
                    ON CONFLICT DO NOTHING
                    "#,
                )
                .bind(key_id)
                .bind(&fingerprint)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
        }

        sqlx::query(
            "UPDATE api_keys SET use_count_current = use_count_current + 1, updated_utc = $2 WHERE key_id = $1",
        )
        .bind(key_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(UseGate::Allowed)
    }

    // ==================== Group Operations ====================

    pub async fn insert_group(&self, group: &Group) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO owner_groups (group_id, owner_id, group_name, created_utc)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(group.group_id)
        .bind(group.owner_id)
        .bind(&group.group_name)
        .bind(group.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_group_by_id(&self, group_id: Uuid) -> Result<Option<Group>, sqlx::Error> {
        sqlx::query_as::<_, Group>("SELECT * FROM owner_groups WHERE group_id = $1")
            .bind(group_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list_groups_for_owner(&self, owner_id: Uuid) -> Result<Vec<Group>, sqlx::Error> {
        sqlx::query_as::<_, Group>(
            "SELECT * FROM owner_groups WHERE owner_id = $1 ORDER BY created_utc DESC, group_id DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Idempotent: re-adding an existing member is a success.
    pub async fn add_group_member(
        &self,
        group_id: Uuid,
        key_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO group_members (group_id, key_id, created_utc)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(group_id)
        .bind(key_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_group_member(
        &self,
        group_id: Uuid,
        key_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM group_members WHERE group_id = $1 AND key_id = $2")
            .bind(group_id)
            .bind(key_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_group_member_ids(&self, group_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar("SELECT key_id FROM group_members WHERE group_id = $1 ORDER BY created_utc")
            .bind(group_id)
            .fetch_all(&self.pool)
            .await
    }

    /// Groups a key belongs to; feeds mask resolution.
    pub async fn groups_for_key(&self, key_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar("SELECT group_id FROM group_members WHERE key_id = $1")
            .bind(key_id)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn list_groups_containing_key(&self, key_id: Uuid) -> Result<Vec<Group>, sqlx::Error> {
        sqlx::query_as::<_, Group>(
            r#"
            SELECT g.* FROM owner_groups g
            JOIN group_members m ON m.group_id = g.group_id
            WHERE m.key_id = $1
            ORDER BY g.created_utc DESC, g.group_id DESC
            "#,
        )
        .bind(key_id)
        .fetch_all(&self.pool)
        .await
    }

    // ==================== Access Grant Operations ====================

    /// Upsert semantics on `(post, target_kind, target_id)`: a repeat
    /// write replaces the mask.
    pub async fn upsert_access_grant(&self, grant: &PostAccessGrant) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO post_access_grants
                (grant_id, post_id, target_kind, target_id, permission_mask, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (post_id, target_kind, target_id)
            DO UPDATE SET permission_mask = EXCLUDED.permission_mask,
                          updated_utc = EXCLUDED.updated_utc
            "#,
        )
        .bind(grant.grant_id)
        .bind(grant.post_id)
        .bind(&grant.target_kind)
        .bind(grant.target_id)
        .bind(grant.permission_mask)
        .bind(grant.created_utc)
        .bind(grant.updated_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn revoke_access_grant(
        &self,
        post_id: Uuid,
        target_kind: &str,
        target_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let deleted = sqlx::query(
            "DELETE FROM post_access_grants WHERE post_id = $1 AND target_kind = $2 AND target_id = $3",
        )
        .bind(post_id)
        .bind(target_kind)
        .bind(target_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(deleted)
    }

    /// Effective mask for a key on a post: bitwise OR over the direct
    /// grant and every group grant.
    pub async fn resolve_access_mask(
        &self,
        post_id: Uuid,
        key_id: Uuid,
        group_ids: &[Uuid],
    ) -> Result<i32, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT COALESCE(bit_or(permission_mask), 0)::int4
            FROM post_access_grants
            WHERE post_id = $1
              AND ((target_kind = 'key' AND target_id = $2)
                OR (target_kind = 'group' AND target_id = ANY($3)))
            "#,
        )
        .bind(post_id)
        .bind(key_id)
        .bind(group_ids)
        .fetch_one(&self.pool)
        .await
    }

    // ==================== Refresh Token Operations ====================

    pub async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens
                (token_id, subject_kind, subject_id, secret_hash, lookup_digest,
                 issued_utc, expires_utc, revoked_utc, rotated_utc, replaced_by_id, ip, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(token.token_id)
        .bind(&token.subject_kind)
        .bind(token.subject_id)
        .bind(&token.secret_hash)
        .bind(&token.lookup_digest)
        .bind(token.issued_utc)
        .bind(token.expires_utc)
        .bind(token.revoked_utc)
        .bind(token.rotated_utc)
        .bind(token.replaced_by_id)
        .bind(&token.ip)
        .bind(&token.user_agent)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_refresh_token_by_lookup_digest(
        &self,
        digest: &[u8],
    ) -> Result<Option<RefreshToken>, sqlx::Error> {
        sqlx::query_as::<_, RefreshToken>("SELECT * FROM refresh_tokens WHERE lookup_digest = $1")
            .bind(digest)
            .fetch_optional(&self.pool)
            .await
    }

    /// Rotation serialization point: the conditional update asserts the
    /// old row was not yet rotated or revoked. Exactly one of two
    /// concurrent presentations succeeds; the other sees `false`.
    pub async fn rotate_refresh_token(
        &self,
        old_token_id: Uuid,
        new_token: &RefreshToken,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET rotated_utc = $1, replaced_by_id = $2
            WHERE token_id = $3 AND rotated_utc IS NULL AND revoked_utc IS NULL
            "#,
        )
        .bind(now)
        .bind(new_token.token_id)
        .bind(old_token_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens
                (token_id, subject_kind, subject_id, secret_hash, lookup_digest,
                 issued_utc, expires_utc, revoked_utc, rotated_utc, replaced_by_id, ip, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(new_token.token_id)
        .bind(&new_token.subject_kind)
        .bind(new_token.subject_id)
        .bind(&new_token.secret_hash)
        .bind(&new_token.lookup_digest)
        .bind(new_token.issued_utc)
        .bind(new_token.expires_utc)
        .bind(new_token.revoked_utc)
        .bind(new_token.rotated_utc)
        .bind(new_token.replaced_by_id)
        .bind(&new_token.ip)
        .bind(&new_token.user_agent)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    pub async fn revoke_refresh_token(
        &self,
        token_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let updated = sqlx::query(
            "UPDATE refresh_tokens SET revoked_utc = $1 WHERE token_id = $2 AND revoked_utc IS NULL",
        )
        .bind(now)
        .bind(token_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated)
    }

    /// Revoke every live refresh token for a subject (replay response).
    pub async fn revoke_refresh_tokens_for_subject(
        &self,
        subject_kind: &str,
        subject_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let updated = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_utc = $1
            WHERE subject_kind = $2 AND subject_id = $3 AND revoked_utc IS NULL
            "#,
        )
        .bind(now)
        .bind(subject_kind)
        .bind(subject_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated)
    }

    // ==================== Audit Operations ====================

    /// Append-only; there is no update or delete path.
    pub async fn insert_audit_event(&self, event: &AuditEvent) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO audit_events
                (event_id, actor_kind, actor_id, action, subject_kind, subject_id,
                 event_data, ip, user_agent, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(event.event_id)
        .bind(&event.actor_kind)
        .bind(event.actor_id)
        .bind(&event.action)
        .bind(&event.subject_kind)
        .bind(event.subject_id)
        .bind(&event.event_data)
        .bind(&event.ip)
        .bind(&event.user_agent)
        .bind(event.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ==================== Post Operations ====================

    /// Insert a post and the author's own full-mask grant atomically.
    pub async fn create_post(
        &self,
        post: &Post,
        author_grant: &PostAccessGrant,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO posts (post_id, author_key_id, title, body, created_utc)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(post.post_id)
        .bind(post.author_key_id)
        .bind(&post.title)
        .bind(&post.body)
        .bind(post.created_utc)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO post_access_grants
                (grant_id, post_id, target_kind, target_id, permission_mask, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(author_grant.grant_id)
        .bind(author_grant.post_id)
        .bind(&author_grant.target_kind)
        .bind(author_grant.target_id)
        .bind(author_grant.permission_mask)
        .bind(author_grant.created_utc)
        .bind(author_grant.updated_utc)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn find_post_by_id(&self, post_id: Uuid) -> Result<Option<Post>, sqlx::Error> {
        sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE post_id = $1")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Batch load; callers reorder as needed.
    pub async fn find_posts_by_ids(&self, post_ids: &[Uuid]) -> Result<Vec<Post>, sqlx::Error> {
        sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE post_id = ANY($1)")
            .bind(post_ids)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn list_all_posts(&self, limit: i64) -> Result<Vec<Post>, sqlx::Error> {
        sqlx::query_as::<_, Post>(
            "SELECT * FROM posts ORDER BY created_utc DESC, post_id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Posts the key can VIEW, newest first. Ordering is strictly
    /// `created_utc DESC, post_id DESC` so pagination stays stable when
    /// timestamps tie. `before` returns rows strictly older than the
    /// cursor row, `since` strictly newer.
    pub async fn list_visible_posts(
        &self,
        key_id: Uuid,
        group_ids: &[Uuid],
        limit: i64,
        before: Option<&Post>,
        since: Option<&Post>,
    ) -> Result<Vec<Post>, sqlx::Error> {
        let (before_utc, before_id) = match before {
            Some(p) => (Some(p.created_utc), Some(p.post_id)),
            None => (None, None),
        };
        let (since_utc, since_id) = match since {
            Some(p) => (Some(p.created_utc), Some(p.post_id)),
            None => (None, None),
        };

        sqlx::query_as::<_, Post>(
            r#"
            SELECT p.* FROM posts p
            WHERE EXISTS (
                SELECT 1 FROM post_access_grants g
                WHERE g.post_id = p.post_id
                  AND ((g.target_kind = 'key' AND g.target_id = $1)
                    OR (g.target_kind = 'group' AND g.target_id = ANY($2)))
                  AND (g.permission_mask & 1) <> 0
            )
            AND ($4::timestamptz IS NULL OR (p.created_utc, p.post_id) < ($4, $5))
            AND ($6::timestamptz IS NULL OR (p.created_utc, p.post_id) > ($6, $7))
            ORDER BY p.created_utc DESC, p.post_id DESC
            LIMIT $3
            "#,
        )
        .bind(key_id)
        .bind(group_ids)
        .bind(limit)
        .bind(before_utc)
        .bind(before_id)
        .bind(since_utc)
        .bind(since_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn insert_comment(&self, comment: &Comment) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO comments (comment_id, post_id, author_key_id, body, created_utc)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(comment.comment_id)
        .bind(comment.post_id)
        .bind(comment.author_key_id)
        .bind(&comment.body)
        .bind(comment.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

async fn insert_key(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    key: &Key,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO api_keys
            (key_id, owner_id, key_type, secret_hash, permissions, active,
             issued_by_key_id, parent_key_id, initial_author_key_id,
             rotated_from_id, rotated_to_id, retired_utc,
             use_count_limit, use_count_current, device_limit, label,
             created_utc, updated_utc)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
        "#,
    )
    .bind(key.key_id)
    .bind(key.owner_id)
    .bind(&key.key_type)
    .bind(&key.secret_hash)
    .bind(&key.permissions)
    .bind(key.active)
    .bind(key.issued_by_key_id)
    .bind(key.parent_key_id)
    .bind(key.initial_author_key_id)
    .bind(key.rotated_from_id)
    .bind(key.rotated_to_id)
    .bind(key.retired_utc)
    .bind(key.use_count_limit)
    .bind(key.use_count_current)
    .bind(key.device_limit)
    .bind(&key.label)
    .bind(key.created_utc)
    .bind(key.updated_utc)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_public_id(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    public_id: &KeyPublicId,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO key_public_ids (public_id, key_id) VALUES ($1, $2)")
        .bind(&public_id.public_id)
        .bind(public_id.key_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
