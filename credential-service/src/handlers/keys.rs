//! Key lifecycle handlers.
//!
//! Console: mint primary, list/view, rotate, activate/deactivate,
//! lineage. Gateway: mint child.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::json;

use super::{key_id, owner_id, parse_id};
use crate::middleware::{AuthPrincipal, Meta};
use crate::models::{KeyResponse, MintChildRequest, MintPrimaryRequest, MintedKeyResponse};
use crate::services::{evaluate_masked, Action};
use crate::AppState;
use service_core::envelope::Data;
use service_core::error::AppError;

#[derive(Debug, Deserialize)]
pub struct DeactivateRequest {
    #[serde(default)]
    pub cascade: bool,
}

/// Mint a primary key.
///
/// POST /console/keys/primary
#[tracing::instrument(skip(state, principal, req, meta))]
pub async fn mint_primary(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Meta(meta): Meta,
    Json(req): Json<MintPrimaryRequest>,
) -> Result<(StatusCode, Json<Data<MintedKeyResponse>>), AppError> {
    evaluate_masked(&principal, Action::MintPrimaryKey, None).into_result()?;
    let owner = owner_id(&principal)?;
    let minted = state.keys.mint_primary(owner, req, &meta).await?;
    Ok((StatusCode::CREATED, Json(Data::new(minted))))
}

/// List every key in the owner's lineages.
///
/// GET /console/keys
#[tracing::instrument(skip(state, principal))]
pub async fn list_keys(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
) -> Result<Json<Data<Vec<KeyResponse>>>, AppError> {
    evaluate_masked(&principal, Action::ReadKeys, None).into_result()?;
    let owner = owner_id(&principal)?;
    let keys = state.keys.list_for_owner(owner).await?;
    Ok(Json(Data::new(keys.into_iter().map(KeyResponse::from).collect())))
}

/// View one key.
///
/// GET /console/keys/{key_id}
#[tracing::instrument(skip(state, principal), fields(key_id = %key))]
pub async fn get_key(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(key): Path<String>,
) -> Result<Json<Data<KeyResponse>>, AppError> {
    evaluate_masked(&principal, Action::ReadKeys, None).into_result()?;
    let owner = owner_id(&principal)?;
    let key = state.keys.get(owner, parse_id(&key)?).await?;
    Ok(Json(Data::new(key.into())))
}

/// Root-to-leaf lineage of a key.
///
/// GET /console/keys/{key_id}/lineage
#[tracing::instrument(skip(state, principal), fields(key_id = %key))]
pub async fn get_lineage(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(key): Path<String>,
) -> Result<Json<Data<Vec<KeyResponse>>>, AppError> {
    evaluate_masked(&principal, Action::ReadKeys, None).into_result()?;
    let owner = owner_id(&principal)?;
    let chain = state.keys.lineage(owner, parse_id(&key)?).await?;
    Ok(Json(Data::new(chain.into_iter().map(KeyResponse::from).collect())))
}

/// Breadth-first descendants of a key.
///
/// GET /console/keys/{key_id}/descendants
#[tracing::instrument(skip(state, principal), fields(key_id = %key))]
pub async fn get_descendants(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(key): Path<String>,
) -> Result<Json<Data<Vec<KeyResponse>>>, AppError> {
    evaluate_masked(&principal, Action::ReadKeys, None).into_result()?;
    let owner = owner_id(&principal)?;
    let tree = state.keys.descendants(owner, parse_id(&key)?).await?;
    Ok(Json(Data::new(tree.into_iter().map(KeyResponse::from).collect())))
}

/// Rotate a key, retiring the old row.
///
/// POST /console/keys/{key_id}/rotate
#[tracing::instrument(skip(state, principal, meta), fields(key_id = %key))]
pub async fn rotate_key(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Meta(meta): Meta,
    Path(key): Path<String>,
) -> Result<Json<Data<MintedKeyResponse>>, AppError> {
    evaluate_masked(&principal, Action::RotateKey, None).into_result()?;
    let owner = owner_id(&principal)?;
    let minted = state.keys.rotate(owner, parse_id(&key)?, &meta).await?;
    Ok(Json(Data::new(minted)))
}

/// Re-activate a key.
///
/// POST /console/keys/{key_id}/activate
#[tracing::instrument(skip(state, principal, meta), fields(key_id = %key))]
pub async fn activate_key(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Meta(meta): Meta,
    Path(key): Path<String>,
) -> Result<Json<Data<serde_json::Value>>, AppError> {
    evaluate_masked(&principal, Action::UpdateKeyState, None).into_result()?;
    let owner = owner_id(&principal)?;
    let changed = state.keys.activate(owner, parse_id(&key)?, &meta).await?;
    Ok(Json(Data::new(json!({ "keys_activated": changed }))))
}

/// Deactivate a key, optionally cascading to all descendants.
///
/// POST /console/keys/{key_id}/deactivate
#[tracing::instrument(skip(state, principal, meta, req), fields(key_id = %key))]
pub async fn deactivate_key(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Meta(meta): Meta,
    Path(key): Path<String>,
    Json(req): Json<DeactivateRequest>,
) -> Result<Json<Data<serde_json::Value>>, AppError> {
    evaluate_masked(&principal, Action::UpdateKeyState, None).into_result()?;
    let owner = owner_id(&principal)?;
    let changed = state
        .keys
        .deactivate(owner, parse_id(&key)?, req.cascade, &meta)
        .await?;
    Ok(Json(Data::new(json!({ "keys_deactivated": changed }))))
}

/// Mint a child key under the authenticated key.
///
/// POST /api/keys
#[tracing::instrument(skip(state, principal, req, meta))]
pub async fn mint_child(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Meta(meta): Meta,
    Json(req): Json<MintChildRequest>,
) -> Result<(StatusCode, Json<Data<MintedKeyResponse>>), AppError> {
    // Catalog and envelope validation precede the capability check here;
    // the lifecycle service owns the full ordering.
    let actor = key_id(&principal)?;
    let minted = state.keys.mint_child(actor, req, &meta).await?;
    Ok((StatusCode::CREATED, Json(Data::new(minted))))
}
