//! Group handlers: owner-side management, key-side read.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use serde_json::json;
use validator::Validate;

use super::{key_id, owner_id, parse_id};
use crate::middleware::{AuthPrincipal, Meta};
use crate::models::{
    actions, id, AddMemberRequest, AuditEvent, CreateGroupRequest, Group, GroupResponse,
};
use crate::services::{evaluate_masked, Action, ServiceError};
use crate::AppState;
use service_core::envelope::Data;
use service_core::error::AppError;

/// Create a group.
///
/// POST /console/groups
#[tracing::instrument(skip(state, principal, req, meta))]
pub async fn create_group(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Meta(meta): Meta,
    Json(req): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<Data<GroupResponse>>), AppError> {
    evaluate_masked(&principal, Action::ManageGroups, None).into_result()?;
    let owner = owner_id(&principal)?;
    req.validate()?;

    let group = Group::new(owner, req.name, state.clock.now());
    state
        .db
        .insert_group(&group)
        .await
        .map_err(ServiceError::Database)?;

    state
        .audit
        .emit(
            AuditEvent::new(
                principal.actor_kind(),
                owner,
                actions::GROUPS_CREATE,
                state.clock.now(),
            )
            .with_subject("group", group.group_id)
            .with_request_meta(meta.ip.clone(), meta.user_agent.clone()),
        )
        .await;

    Ok((StatusCode::CREATED, Json(Data::new(group.into()))))
}

/// List the owner's groups.
///
/// GET /console/groups
#[tracing::instrument(skip(state, principal))]
pub async fn list_groups(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
) -> Result<Json<Data<Vec<GroupResponse>>>, AppError> {
    evaluate_masked(&principal, Action::ManageGroups, None).into_result()?;
    let owner = owner_id(&principal)?;
    let groups = state
        .db
        .list_groups_for_owner(owner)
        .await
        .map_err(ServiceError::Database)?;
    Ok(Json(Data::new(groups.into_iter().map(GroupResponse::from).collect())))
}

/// Add a key to a group. Idempotent.
///
/// POST /console/groups/{group_id}/members
#[tracing::instrument(skip(state, principal, req, meta), fields(group_id = %group))]
pub async fn add_member(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Meta(meta): Meta,
    Path(group): Path<String>,
    Json(req): Json<AddMemberRequest>,
) -> Result<Json<Data<serde_json::Value>>, AppError> {
    evaluate_masked(&principal, Action::ManageGroups, None).into_result()?;
    let owner = owner_id(&principal)?;

    let group = owned_group(&state, owner, &group).await?;
    // The key must sit in one of the owner's lineages too.
    let key = state.keys.get(owner, parse_id(&req.key_id)?).await?;

    state
        .db
        .add_group_member(group.group_id, key.key_id, state.clock.now())
        .await
        .map_err(ServiceError::Database)?;

    state
        .audit
        .emit(
            AuditEvent::new(
                principal.actor_kind(),
                owner,
                actions::GROUPS_MEMBER_ADD,
                state.clock.now(),
            )
            .with_subject("group", group.group_id)
            .with_metadata(json!({ "group_id": id::to_external(group.group_id) }))
            .with_request_meta(meta.ip.clone(), meta.user_agent.clone()),
        )
        .await;

    Ok(Json(Data::new(json!({ "group_id": id::to_external(group.group_id) }))))
}

/// Remove a key from a group.
///
/// DELETE /console/groups/{group_id}/members/{key_id}
#[tracing::instrument(skip(state, principal, meta), fields(group_id = %group, key_id = %member))]
pub async fn remove_member(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Meta(meta): Meta,
    Path((group, member)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    evaluate_masked(&principal, Action::ManageGroups, None).into_result()?;
    let owner = owner_id(&principal)?;

    let group = owned_group(&state, owner, &group).await?;
    state
        .db
        .remove_group_member(group.group_id, parse_id(&member)?)
        .await
        .map_err(ServiceError::Database)?;

    state
        .audit
        .emit(
            AuditEvent::new(
                principal.actor_kind(),
                owner,
                actions::GROUPS_MEMBER_REMOVE,
                state.clock.now(),
            )
            .with_subject("group", group.group_id)
            .with_request_meta(meta.ip.clone(), meta.user_agent.clone()),
        )
        .await;

    Ok(StatusCode::NO_CONTENT)
}

/// List member key ids of a group.
///
/// GET /console/groups/{group_id}/members
#[tracing::instrument(skip(state, principal), fields(group_id = %group))]
pub async fn list_members(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(group): Path<String>,
) -> Result<Json<Data<Vec<String>>>, AppError> {
    evaluate_masked(&principal, Action::ManageGroups, None).into_result()?;
    let owner = owner_id(&principal)?;

    let group = owned_group(&state, owner, &group).await?;
    let members = state
        .db
        .list_group_member_ids(group.group_id)
        .await
        .map_err(ServiceError::Database)?;
    Ok(Json(Data::new(members.into_iter().map(id::to_external).collect())))
}

/// Groups containing the authenticated key.
///
/// GET /api/groups
#[tracing::instrument(skip(state, principal))]
pub async fn list_groups_for_key(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
) -> Result<Json<Data<Vec<GroupResponse>>>, AppError> {
    evaluate_masked(&principal, Action::ReadGroups, None).into_result()?;
    let key = key_id(&principal)?;
    let groups = state
        .db
        .list_groups_containing_key(key)
        .await
        .map_err(ServiceError::Database)?;
    Ok(Json(Data::new(groups.into_iter().map(GroupResponse::from).collect())))
}

/// A group of a different owner is indistinguishable from a missing one.
async fn owned_group(
    state: &AppState,
    owner: uuid::Uuid,
    external: &str,
) -> Result<Group, AppError> {
    let group = state
        .db
        .find_group_by_id(parse_id(external)?)
        .await
        .map_err(ServiceError::Database)?
        .ok_or(ServiceError::NotFound("group"))?;
    if group.owner_id != owner {
        return Err(ServiceError::NotFound("group").into());
    }
    Ok(group)
}
