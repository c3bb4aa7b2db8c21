//! Authenticator: the three credential-to-token flows.
//!
//! Password login for owners, opaque-key exchange for keys, and
//! single-use refresh rotation with replay detection. Every failure on
//! these paths surfaces as the same generic `unauthorized`.

use serde::Serialize;
use serde_json::json;

use super::{AuditService, Database, SecretHasher, ServiceError, SigningService, UseGate};
use crate::models::{
    actions, capability, id, ActorKind, AuditEvent, Key, KeyType, LoginRequest, Owner,
    RegisterOwnerRequest, RefreshToken, SubjectKind,
};
use crate::utils::{self, Clock};

/// Token pair returned to a successfully authenticated caller.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Request metadata threaded through for audit and device binding.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone)]
pub struct AuthService {
    db: Database,
    signer: SigningService,
    hasher: SecretHasher,
    audit: AuditService,
    clock: Clock,
    refresh_token_ttl_seconds: i64,
}

impl AuthService {
    pub fn new(
        db: Database,
        signer: SigningService,
        hasher: SecretHasher,
        audit: AuditService,
        clock: Clock,
        refresh_token_ttl_seconds: i64,
    ) -> Self {
        Self {
            db,
            signer,
            hasher,
            audit,
            clock,
            refresh_token_ttl_seconds,
        }
    }

    /// Owners implicitly hold the full owner-scope capability set; there
    /// is no per-owner permission storage.
    fn owner_permissions() -> Vec<String> {
        capability::OWNER_SCOPE.iter().map(|s| s.to_string()).collect()
    }

    pub async fn register_owner(
        &self,
        req: RegisterOwnerRequest,
        meta: &RequestMeta,
    ) -> Result<Owner, ServiceError> {
        if self
            .db
            .find_owner_by_email(&req.email)
            .await?
            .is_some()
        {
            return Err(ServiceError::EmailAlreadyRegistered);
        }

        let password_hash = self.hasher.hash_secret(&req.password)?;
        let owner = Owner::new(req.email, password_hash, self.clock.now());

        if let Err(e) = self.db.insert_owner(&owner).await {
            if is_unique_violation(&e) {
                return Err(ServiceError::EmailAlreadyRegistered);
            }
            return Err(e.into());
        }

        tracing::info!(owner_id = %id::to_external(owner.owner_id), "Owner registered");

        self.audit
            .emit(
                AuditEvent::new(
                    ActorKind::Owner,
                    owner.owner_id,
                    actions::OWNERS_REGISTER,
                    self.clock.now(),
                )
                .with_metadata(json!({ "email": owner.email }))
                .with_request_meta(meta.ip.clone(), meta.user_agent.clone()),
            )
            .await;

        Ok(owner)
    }

    /// Owner login: email + password for a Console token pair.
    pub async fn login_owner(
        &self,
        req: LoginRequest,
        meta: &RequestMeta,
    ) -> Result<TokenResponse, ServiceError> {
        let Some(owner) = self.db.find_owner_by_email(&req.email).await? else {
            // Equalize timing with the wrong-password path.
            self.hasher.dummy_verify(&req.password);
            return Err(ServiceError::InvalidCredentials);
        };

        if !self.hasher.verify_secret(&req.password, &owner.password_hash) {
            return Err(ServiceError::InvalidCredentials);
        }

        let now = self.clock.now();
        let access_token =
            self.signer
                .issue_owner_token(owner.owner_id, Self::owner_permissions(), now)?;
        let refresh_token = self
            .issue_refresh_token(SubjectKind::Owner, owner.owner_id, meta)
            .await?;

        self.audit
            .emit(
                AuditEvent::new(ActorKind::Owner, owner.owner_id, actions::OWNERS_LOGIN, now)
                    .with_request_meta(meta.ip.clone(), meta.user_agent.clone()),
            )
            .await;

        Ok(self.token_response(access_token, refresh_token))
    }

    /// Opaque-key exchange: `apub_…` public id + key secret for a
    /// Gateway token pair.
    pub async fn exchange_key(
        &self,
        key_public_id: &str,
        key_secret: &str,
        meta: &RequestMeta,
    ) -> Result<TokenResponse, ServiceError> {
        let Some(key) = self.db.find_key_by_public_id(key_public_id).await? else {
            self.hasher.dummy_verify(key_secret);
            return Err(ServiceError::InvalidCredentials);
        };

        if !key.is_usable() {
            return Err(ServiceError::InvalidCredentials);
        }

        if !self.hasher.verify_secret(key_secret, &key.secret_hash) {
            return Err(ServiceError::InvalidCredentials);
        }

        let now = self.clock.now();

        if key.kind() == KeyType::Use {
            let fingerprint = utils::device_fingerprint(
                meta.ip.as_deref().unwrap_or(""),
                meta.user_agent.as_deref().unwrap_or(""),
            );
            match self.db.gate_use_key(key.key_id, fingerprint, now).await? {
                UseGate::Allowed => {}
                UseGate::UseLimitExceeded => return Err(ServiceError::UseLimitExceeded),
                UseGate::DeviceLimitExceeded => return Err(ServiceError::DeviceLimitExceeded),
            }
        }

        let access_token = self.signer.issue_key_token(
            key.key_id,
            key.kind(),
            Some(key_public_id.to_string()),
            key.permissions.clone(),
            now,
        )?;
        let refresh_token = self
            .issue_refresh_token(SubjectKind::Key, key.key_id, meta)
            .await?;

        self.audit
            .emit(
                AuditEvent::new(ActorKind::Key, key.key_id, actions::KEYS_EXCHANGE, now)
                    .with_metadata(json!({ "key_type": key.key_type }))
                    .with_request_meta(meta.ip.clone(), meta.user_agent.clone()),
            )
            .await;

        Ok(self.token_response(access_token, refresh_token))
    }

    /// Refresh rotation. The old row is consumed exactly once; a second
    /// presentation takes the replay path. `expected_subject` pins the
    /// token to the surface it was presented on.
    pub async fn refresh(
        &self,
        presented: &str,
        expected_subject: SubjectKind,
        meta: &RequestMeta,
    ) -> Result<TokenResponse, ServiceError> {
        let digest = self.hasher.refresh_lookup_digest(presented);
        let Some(row) = self.db.find_refresh_token_by_lookup_digest(&digest).await? else {
            self.hasher.dummy_verify(presented);
            return Err(ServiceError::InvalidCredentials);
        };

        if !self.hasher.verify_secret(presented, &row.secret_hash) {
            return Err(ServiceError::InvalidCredentials);
        }
        if row.subject() != Some(expected_subject) {
            return Err(ServiceError::InvalidCredentials);
        }

        let now = self.clock.now();

        if row.revoked_utc.is_some() {
            return Err(ServiceError::InvalidCredentials);
        }
        if row.is_expired(now) {
            return Err(ServiceError::InvalidCredentials);
        }
        if row.rotated_utc.is_some() {
            return self.handle_replay(&row, meta).await;
        }

        // Re-derive the subject's current token material before burning
        // the old row.
        let access_token = self.issue_access_for_subject(expected_subject, &row).await?;

        let opaque = utils::generate_refresh_token();
        let new_row = RefreshToken::new(
            expected_subject,
            row.subject_id,
            self.hasher.hash_secret(&opaque)?,
            self.hasher.refresh_lookup_digest(&opaque),
            self.refresh_token_ttl_seconds,
            meta.ip.clone(),
            meta.user_agent.clone(),
            now,
        );

        // Serialization point: exactly one of two concurrent
        // presentations wins the conditional update.
        if !self.db.rotate_refresh_token(row.token_id, &new_row, now).await? {
            return self.handle_replay(&row, meta).await;
        }

        Ok(self.token_response(access_token, opaque))
    }

    /// Revoke the presented refresh token (owner logout).
    pub async fn revoke_refresh(
        &self,
        presented: &str,
        meta: &RequestMeta,
    ) -> Result<(), ServiceError> {
        let digest = self.hasher.refresh_lookup_digest(presented);
        let Some(row) = self.db.find_refresh_token_by_lookup_digest(&digest).await? else {
            return Err(ServiceError::InvalidCredentials);
        };
        if !self.hasher.verify_secret(presented, &row.secret_hash) {
            return Err(ServiceError::InvalidCredentials);
        }

        let now = self.clock.now();
        self.db.revoke_refresh_token(row.token_id, now).await?;

        if row.subject() == Some(SubjectKind::Owner) {
            self.audit
                .emit(
                    AuditEvent::new(ActorKind::Owner, row.subject_id, actions::OWNERS_LOGOUT, now)
                        .with_request_meta(meta.ip.clone(), meta.user_agent.clone()),
                )
                .await;
        }

        Ok(())
    }

    async fn handle_replay(
        &self,
        row: &RefreshToken,
        meta: &RequestMeta,
    ) -> Result<TokenResponse, ServiceError> {
        let now = self.clock.now();
        let actor_kind = match row.subject() {
            Some(SubjectKind::Owner) => ActorKind::Owner,
            _ => ActorKind::Key,
        };

        tracing::warn!(
            subject_kind = %row.subject_kind,
            subject_id = %id::to_external(row.subject_id),
            "Refresh token replay detected"
        );

        // Contain the damage: the whole family is revoked.
        let revoked = self
            .db
            .revoke_refresh_tokens_for_subject(&row.subject_kind, row.subject_id, now)
            .await?;

        self.audit
            .emit(
                AuditEvent::new(actor_kind, row.subject_id, actions::REFRESH_REPLAY_ATTEMPT, now)
                    .with_subject(&row.subject_kind, row.subject_id)
                    .with_metadata(json!({ "revoked_tokens": revoked }))
                    .with_request_meta(meta.ip.clone(), meta.user_agent.clone()),
            )
            .await;

        Err(ServiceError::Replay)
    }

    async fn issue_access_for_subject(
        &self,
        subject: SubjectKind,
        row: &RefreshToken,
    ) -> Result<String, ServiceError> {
        let now = self.clock.now();
        let token = match subject {
            SubjectKind::Owner => {
                let owner = self
                    .db
                    .find_owner_by_id(row.subject_id)
                    .await?
                    .ok_or(ServiceError::InvalidCredentials)?;
                self.signer
                    .issue_owner_token(owner.owner_id, Self::owner_permissions(), now)?
            }
            SubjectKind::Key => {
                let key = self.load_usable_key(row.subject_id).await?;
                let public_id = self
                    .db
                    .find_public_id_for_key(key.key_id)
                    .await?
                    .map(|p| p.public_id);
                self.signer.issue_key_token(
                    key.key_id,
                    key.kind(),
                    public_id,
                    key.permissions.clone(),
                    now,
                )?
            }
        };
        Ok(token)
    }

    async fn load_usable_key(&self, key_id: uuid::Uuid) -> Result<Key, ServiceError> {
        let key = self
            .db
            .find_key_by_id(key_id)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;
        if !key.is_usable() {
            return Err(ServiceError::InvalidCredentials);
        }
        Ok(key)
    }

    async fn issue_refresh_token(
        &self,
        subject_kind: SubjectKind,
        subject_id: uuid::Uuid,
        meta: &RequestMeta,
    ) -> Result<String, ServiceError> {
        let opaque = utils::generate_refresh_token();
        let row = RefreshToken::new(
            subject_kind,
            subject_id,
            self.hasher.hash_secret(&opaque)?,
            self.hasher.refresh_lookup_digest(&opaque),
            self.refresh_token_ttl_seconds,
            meta.ip.clone(),
            meta.user_agent.clone(),
            self.clock.now(),
        );
        self.db.insert_refresh_token(&row).await?;
        Ok(opaque)
    }

    fn token_response(&self, access_token: String, refresh_token: String) -> TokenResponse {
        TokenResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.signer.access_token_ttl_seconds(),
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}
