//! Key lifecycle: minting, rotation, activation state, lineage.
//!
//! A key belongs to an owner through its lineage root: the primary key's
//! `owner_id` covers every descendant. Keys an owner does not hold are
//! reported as missing, never as forbidden.

use serde_json::json;
use uuid::Uuid;

use super::auth::RequestMeta;
use super::{AuditService, Database, SecretHasher, ServiceError};
use crate::models::{
    actions, capability, id, ActorKind, AuditEvent, Key, KeyPublicId, KeyType, MintChildRequest,
    MintPrimaryRequest, MintedKeyResponse,
};
use crate::utils::{self, Clock};

#[derive(Clone)]
pub struct KeyLifecycleService {
    db: Database,
    hasher: SecretHasher,
    audit: AuditService,
    clock: Clock,
}

impl KeyLifecycleService {
    pub fn new(db: Database, hasher: SecretHasher, audit: AuditService, clock: Clock) -> Self {
        Self {
            db,
            hasher,
            audit,
            clock,
        }
    }

    /// Mint a primary key for an owner. The returned secret is produced
    /// exactly once; losing it means rotating the key.
    pub async fn mint_primary(
        &self,
        owner_id: Uuid,
        req: MintPrimaryRequest,
        meta: &RequestMeta,
    ) -> Result<MintedKeyResponse, ServiceError> {
        let permissions = capability::validate_key_scope(&req.permissions)?;

        let secret = utils::generate_key_secret();
        let key = Key::new_primary(
            owner_id,
            self.hasher.hash_secret(&secret)?,
            permissions,
            req.label,
            self.clock.now(),
        );
        let public_id = KeyPublicId::new(key.key_id);

        self.db.create_key(&key, &public_id).await?;

        tracing::info!(
            key_id = %id::to_external(key.key_id),
            key_type = %key.key_type,
            "Key minted"
        );

        self.audit
            .emit(
                AuditEvent::new(ActorKind::Owner, owner_id, actions::KEYS_MINT, self.clock.now())
                    .with_subject("key", key.key_id)
                    .with_metadata(json!({
                        "key_type": key.key_type,
                        "permissions": key.permissions,
                        "label": key.label,
                    }))
                    .with_request_meta(meta.ip.clone(), meta.user_agent.clone()),
            )
            .await;

        Ok(MintedKeyResponse {
            key_id: id::to_external(key.key_id),
            key_public_id: public_id.public_id,
            key_secret: secret,
        })
    }

    /// Mint a secondary or use key under the acting key.
    pub async fn mint_child(
        &self,
        actor_key_id: Uuid,
        req: MintChildRequest,
        meta: &RequestMeta,
    ) -> Result<MintedKeyResponse, ServiceError> {
        let parent = self
            .db
            .find_key_by_id(actor_key_id)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        // Request validation comes first: a rejected permission set is a
        // validation failure even when the actor could not mint at all.
        if req.key_type == KeyType::Primary {
            return Err(ServiceError::Validation {
                field: "key_type",
                message: "child keys must be secondary or use".to_string(),
            });
        }
        let permissions = capability::validate_key_scope(&req.permissions)?;
        capability::validate_envelope(&permissions, &parent.permissions)?;
        if req.key_type == KeyType::Use {
            capability::validate_use_key(&permissions)?;
        } else if req.use_count_limit.is_some() || req.device_limit.is_some() {
            return Err(ServiceError::Validation {
                field: "use_count_limit",
                message: "usage limits apply to use keys only".to_string(),
            });
        }
        if req.use_count_limit.is_some_and(|v| v < 0) {
            return Err(ServiceError::Validation {
                field: "use_count_limit",
                message: "must not be negative".to_string(),
            });
        }
        if req.device_limit.is_some_and(|v| v < 0) {
            return Err(ServiceError::Validation {
                field: "device_limit",
                message: "must not be negative".to_string(),
            });
        }

        if !parent.is_usable() {
            return Err(ServiceError::Forbidden("Key is inactive or retired"));
        }
        if !parent.kind().may_issue() {
            return Err(ServiceError::Forbidden("Use keys cannot issue child keys"));
        }
        if !parent.permissions.iter().any(|p| p == "keys:issue") {
            return Err(ServiceError::MissingCapability("keys:issue".to_string()));
        }

        let secret = utils::generate_key_secret();
        let key = Key::new_child(
            &parent,
            req.key_type,
            self.hasher.hash_secret(&secret)?,
            permissions,
            req.use_count_limit,
            req.device_limit,
            req.label,
            self.clock.now(),
        );
        let public_id = KeyPublicId::new(key.key_id);

        self.db.create_key(&key, &public_id).await?;

        tracing::info!(
            key_id = %id::to_external(key.key_id),
            parent_key_id = %id::to_external(parent.key_id),
            key_type = %key.key_type,
            "Key minted"
        );

        self.audit
            .emit(
                AuditEvent::new(ActorKind::Key, actor_key_id, actions::KEYS_MINT, self.clock.now())
                    .with_subject("key", key.key_id)
                    .with_metadata(json!({
                        "key_type": key.key_type,
                        "permissions": key.permissions,
                        "label": key.label,
                    }))
                    .with_request_meta(meta.ip.clone(), meta.user_agent.clone()),
            )
            .await;

        Ok(MintedKeyResponse {
            key_id: id::to_external(key.key_id),
            key_public_id: public_id.public_id,
            key_secret: secret,
        })
    }

    /// Rotate a key: retire the old row and mint a replacement that
    /// preserves type, permissions, lineage, limits and label.
    pub async fn rotate(
        &self,
        owner_id: Uuid,
        key_id: Uuid,
        meta: &RequestMeta,
    ) -> Result<MintedKeyResponse, ServiceError> {
        let old = self.owned_key(owner_id, key_id).await?;
        if old.retired_utc.is_some() {
            return Err(ServiceError::AlreadyRetired);
        }

        let now = self.clock.now();
        let secret = utils::generate_key_secret();
        let new_key = Key::replacement_for(&old, self.hasher.hash_secret(&secret)?, now);
        let public_id = KeyPublicId::new(new_key.key_id);

        if !self
            .db
            .rotate_key(&new_key, &public_id, old.key_id, now)
            .await?
        {
            return Err(ServiceError::AlreadyRetired);
        }

        tracing::info!(
            old_key_id = %id::to_external(old.key_id),
            new_key_id = %id::to_external(new_key.key_id),
            "Key rotated"
        );

        self.audit
            .emit(
                AuditEvent::new(ActorKind::Owner, owner_id, actions::KEYS_ROTATE, now)
                    .with_subject("key", old.key_id)
                    .with_metadata(json!({ "key_type": old.key_type }))
                    .with_request_meta(meta.ip.clone(), meta.user_agent.clone()),
            )
            .await;

        Ok(MintedKeyResponse {
            key_id: id::to_external(new_key.key_id),
            key_public_id: public_id.public_id,
            key_secret: secret,
        })
    }

    /// Activate a key. Idempotent; retired keys never transition.
    pub async fn activate(
        &self,
        owner_id: Uuid,
        key_id: Uuid,
        meta: &RequestMeta,
    ) -> Result<u64, ServiceError> {
        let key = self.owned_key(owner_id, key_id).await?;
        if key.retired_utc.is_some() {
            return Err(ServiceError::AlreadyRetired);
        }

        let now = self.clock.now();
        let changed = self.db.set_keys_active(&[key.key_id], true, now).await?;

        self.audit
            .emit(
                AuditEvent::new(ActorKind::Owner, owner_id, actions::KEYS_ACTIVATE, now)
                    .with_subject("key", key.key_id)
                    .with_request_meta(meta.ip.clone(), meta.user_agent.clone()),
            )
            .await;

        Ok(changed)
    }

    /// Deactivate a key, optionally cascading through every transitive
    /// descendant. Idempotent: a second cascade deactivates zero keys.
    /// Cascade never sets `retired_utc`; only rotation retires.
    pub async fn deactivate(
        &self,
        owner_id: Uuid,
        key_id: Uuid,
        cascade: bool,
        meta: &RequestMeta,
    ) -> Result<u64, ServiceError> {
        let key = self.owned_key(owner_id, key_id).await?;
        if key.retired_utc.is_some() {
            return Err(ServiceError::AlreadyRetired);
        }

        let mut targets = vec![key.key_id];
        if cascade {
            targets.extend(self.db.descendants(key.key_id).await?.iter().map(|k| k.key_id));
        }

        let now = self.clock.now();
        let deactivated = self.db.set_keys_active(&targets, false, now).await?;

        tracing::info!(
            key_id = %id::to_external(key.key_id),
            cascade,
            keys_deactivated = deactivated,
            "Key deactivated"
        );

        self.audit
            .emit(
                AuditEvent::new(ActorKind::Owner, owner_id, actions::KEYS_DEACTIVATE, now)
                    .with_subject("key", key.key_id)
                    .with_metadata(json!({
                        "cascade": cascade,
                        "keys_deactivated": deactivated,
                    }))
                    .with_request_meta(meta.ip.clone(), meta.user_agent.clone()),
            )
            .await;

        Ok(deactivated)
    }

    pub async fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<Key>, ServiceError> {
        Ok(self.db.list_keys_for_owner(owner_id).await?)
    }

    pub async fn get(&self, owner_id: Uuid, key_id: Uuid) -> Result<Key, ServiceError> {
        self.owned_key(owner_id, key_id).await
    }

    /// Root-to-leaf chain of `parent_key_id` links.
    pub async fn lineage(&self, owner_id: Uuid, key_id: Uuid) -> Result<Vec<Key>, ServiceError> {
        self.owned_key(owner_id, key_id).await?;
        Ok(self.db.lineage(key_id).await?)
    }

    /// Breadth-first expansion of the parent-child relation.
    pub async fn descendants(
        &self,
        owner_id: Uuid,
        key_id: Uuid,
    ) -> Result<Vec<Key>, ServiceError> {
        self.owned_key(owner_id, key_id).await?;
        Ok(self.db.descendants(key_id).await?)
    }

    /// Load a key and verify it sits in one of the owner's lineages.
    /// Keys of other owners are indistinguishable from missing ones.
    async fn owned_key(&self, owner_id: Uuid, key_id: Uuid) -> Result<Key, ServiceError> {
        let key = self
            .db
            .find_key_by_id(key_id)
            .await?
            .ok_or(ServiceError::NotFound("key"))?;
        let root = self
            .db
            .find_key_by_id(key.initial_author_key_id)
            .await?
            .ok_or_else(|| {
                ServiceError::Internal(anyhow::anyhow!("key lineage root row is missing"))
            })?;
        if root.owner_id != Some(owner_id) {
            return Err(ServiceError::NotFound("key"));
        }
        Ok(key)
    }
}
