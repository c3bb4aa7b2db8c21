//! Access grant handlers.
//!
//! Owner-side (Console) grant management over the owner's posts, and
//! key-side (Gateway) management gated on the MANAGE_ACCESS bit.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use serde_json::json;
use uuid::Uuid;

use super::{key_id, owner_id, parse_id};
use crate::middleware::{AuthPrincipal, Meta};
use crate::models::{
    access_mask, actions, id, AuditEvent, PostAccessGrant, Principal, TargetKind,
    UpsertGrantRequest,
};
use crate::services::{evaluate_masked, Action, PostStore, RequestMeta, ServiceError};
use crate::AppState;
use service_core::envelope::Data;
use service_core::error::AppError;

/// Upsert a grant on one of the owner's posts.
///
/// PUT /console/posts/{post_id}/access
#[tracing::instrument(skip(state, principal, req, meta), fields(post_id = %post))]
pub async fn owner_upsert_grant(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Meta(meta): Meta,
    Path(post): Path<String>,
    Json(req): Json<UpsertGrantRequest>,
) -> Result<Json<Data<serde_json::Value>>, AppError> {
    evaluate_masked(&principal, Action::OwnerManageAccess, None).into_result()?;
    let owner = owner_id(&principal)?;
    let post_id = owned_post(&state, owner, &post).await?;
    apply_grant(&state, &principal, post_id, req, &meta).await
}

/// Revoke a grant on one of the owner's posts. Idempotent.
///
/// DELETE /console/posts/{post_id}/access/{target_kind}/{target_id}
#[tracing::instrument(skip(state, principal, meta), fields(post_id = %post))]
pub async fn owner_revoke_grant(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Meta(meta): Meta,
    Path((post, target_kind, target_id)): Path<(String, String, String)>,
) -> Result<StatusCode, AppError> {
    evaluate_masked(&principal, Action::OwnerManageAccess, None).into_result()?;
    let owner = owner_id(&principal)?;
    let post_id = owned_post(&state, owner, &post).await?;
    remove_grant(&state, &principal, post_id, &target_kind, &target_id, &meta).await
}

/// Upsert a grant from the Gateway; requires MANAGE_ACCESS on the post.
///
/// PUT /api/posts/{post_id}/access
#[tracing::instrument(skip(state, principal, req, meta), fields(post_id = %post))]
pub async fn key_upsert_grant(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Meta(meta): Meta,
    Path(post): Path<String>,
    Json(req): Json<UpsertGrantRequest>,
) -> Result<Json<Data<serde_json::Value>>, AppError> {
    key_id(&principal)?;
    let post_id = parse_id(&post)?;
    state
        .authz
        .authorize(&principal, Action::ManagePostAccess, Some(post_id))
        .await?
        .into_result()?;
    apply_grant(&state, &principal, post_id, req, &meta).await
}

/// Revoke a grant from the Gateway; requires MANAGE_ACCESS on the post.
///
/// DELETE /api/posts/{post_id}/access/{target_kind}/{target_id}
#[tracing::instrument(skip(state, principal, meta), fields(post_id = %post))]
pub async fn key_revoke_grant(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Meta(meta): Meta,
    Path((post, target_kind, target_id)): Path<(String, String, String)>,
) -> Result<StatusCode, AppError> {
    key_id(&principal)?;
    let post_id = parse_id(&post)?;
    state
        .authz
        .authorize(&principal, Action::ManagePostAccess, Some(post_id))
        .await?
        .into_result()?;
    remove_grant(&state, &principal, post_id, &target_kind, &target_id, &meta).await
}

async fn apply_grant(
    state: &AppState,
    principal: &Principal,
    post_id: Uuid,
    req: UpsertGrantRequest,
    meta: &RequestMeta,
) -> Result<Json<Data<serde_json::Value>>, AppError> {
    if req.permission_mask < 1 || !access_mask::is_valid(req.permission_mask) {
        return Err(ServiceError::Validation {
            field: "permission_mask",
            message: "must set only assigned bits and be at least 1".to_string(),
        }
        .into());
    }

    let target_id = parse_id(&req.target_id)?;
    match req.target_kind {
        TargetKind::Key => {
            state
                .db
                .find_key_by_id(target_id)
                .await
                .map_err(ServiceError::Database)?
                .ok_or(ServiceError::NotFound("key"))?;
        }
        TargetKind::Group => {
            state
                .db
                .find_group_by_id(target_id)
                .await
                .map_err(ServiceError::Database)?
                .ok_or(ServiceError::NotFound("group"))?;
        }
    }

    let grant = PostAccessGrant::new(
        post_id,
        req.target_kind,
        target_id,
        req.permission_mask,
        state.clock.now(),
    );
    state
        .db
        .upsert_access_grant(&grant)
        .await
        .map_err(ServiceError::Database)?;

    state
        .audit
        .emit(
            AuditEvent::new(
                principal.actor_kind(),
                principal.id(),
                actions::ACCESS_GRANT,
                state.clock.now(),
            )
            .with_subject("post", post_id)
            .with_metadata(json!({
                "target_kind": grant.target_kind,
                "target_id": id::to_external(target_id),
                "permission_mask": grant.permission_mask,
            }))
            .with_request_meta(meta.ip.clone(), meta.user_agent.clone()),
        )
        .await;

    Ok(Json(Data::new(json!({
        "post_id": id::to_external(post_id),
        "target_kind": grant.target_kind,
        "target_id": id::to_external(target_id),
        "permission_mask": grant.permission_mask,
    }))))
}

async fn remove_grant(
    state: &AppState,
    principal: &Principal,
    post_id: Uuid,
    target_kind: &str,
    target_id: &str,
    meta: &RequestMeta,
) -> Result<StatusCode, AppError> {
    if TargetKind::parse(target_kind).is_none() {
        return Err(AppError::BadRequest(anyhow::anyhow!("unknown target kind")));
    }
    let target_id = parse_id(target_id)?;

    state
        .db
        .revoke_access_grant(post_id, target_kind, target_id)
        .await
        .map_err(ServiceError::Database)?;

    state
        .audit
        .emit(
            AuditEvent::new(
                principal.actor_kind(),
                principal.id(),
                actions::ACCESS_REVOKE,
                state.clock.now(),
            )
            .with_subject("post", post_id)
            .with_metadata(json!({
                "target_kind": target_kind,
                "target_id": id::to_external(target_id),
            }))
            .with_request_meta(meta.ip.clone(), meta.user_agent.clone()),
        )
        .await;

    Ok(StatusCode::NO_CONTENT)
}

/// Resolve a post and require that its authoring lineage is rooted in
/// one of the owner's primary keys. Foreign posts read as missing.
async fn owned_post(state: &AppState, owner: Uuid, external: &str) -> Result<Uuid, AppError> {
    let post_id = parse_id(external)?;
    let root = state
        .posts
        .post_initial_author_key(post_id)
        .await?
        .ok_or(ServiceError::NotFound("post"))?;
    let root_key = state
        .db
        .find_key_by_id(root)
        .await
        .map_err(ServiceError::Database)?
        .ok_or(ServiceError::NotFound("post"))?;
    if root_key.owner_id != Some(owner) {
        return Err(ServiceError::NotFound("post").into());
    }
    Ok(post_id)
}
