//! Authentication handlers for both surfaces.

use axum::{
    extract::{Json, State},
    http::StatusCode,
};
use serde::Deserialize;
use validator::Validate;

use crate::middleware::Meta;
use crate::models::{LoginRequest, OwnerResponse, RegisterOwnerRequest, SubjectKind};
use crate::services::TokenResponse;
use crate::AppState;
use service_core::envelope::Data;
use service_core::error::AppError;

/// Body carrying an opaque refresh token.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Body for the opaque-key exchange.
#[derive(Debug, Deserialize)]
pub struct ExchangeRequest {
    pub key_public_id: String,
    pub key_secret: String,
}

/// Register an owner.
///
/// POST /console/owners/register
#[tracing::instrument(skip(state, req, meta))]
pub async fn register(
    State(state): State<AppState>,
    Meta(meta): Meta,
    Json(req): Json<RegisterOwnerRequest>,
) -> Result<(StatusCode, Json<Data<OwnerResponse>>), AppError> {
    req.validate()?;
    let owner = state.auth.register_owner(req, &meta).await?;
    Ok((StatusCode::CREATED, Json(Data::new(owner.into()))))
}

/// Owner login.
///
/// POST /console/auth/login
#[tracing::instrument(skip(state, req, meta))]
pub async fn login(
    State(state): State<AppState>,
    Meta(meta): Meta,
    Json(req): Json<LoginRequest>,
) -> Result<Json<Data<TokenResponse>>, AppError> {
    let tokens = state.auth.login_owner(req, &meta).await?;
    Ok(Json(Data::new(tokens)))
}

/// Rotate an owner refresh token.
///
/// POST /console/auth/refresh
#[tracing::instrument(skip(state, req, meta))]
pub async fn console_refresh(
    State(state): State<AppState>,
    Meta(meta): Meta,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<Data<TokenResponse>>, AppError> {
    let tokens = state
        .auth
        .refresh(&req.refresh_token, SubjectKind::Owner, &meta)
        .await?;
    Ok(Json(Data::new(tokens)))
}

/// Revoke the presented refresh token.
///
/// POST /console/auth/logout
#[tracing::instrument(skip(state, req, meta))]
pub async fn logout(
    State(state): State<AppState>,
    Meta(meta): Meta,
    Json(req): Json<RefreshRequest>,
) -> Result<StatusCode, AppError> {
    state.auth.revoke_refresh(&req.refresh_token, &meta).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Exchange an opaque key credential for a Gateway token pair.
///
/// POST /api/auth/exchange
#[tracing::instrument(skip(state, req, meta))]
pub async fn exchange(
    State(state): State<AppState>,
    Meta(meta): Meta,
    Json(req): Json<ExchangeRequest>,
) -> Result<Json<Data<TokenResponse>>, AppError> {
    let tokens = state
        .auth
        .exchange_key(&req.key_public_id, &req.key_secret, &meta)
        .await?;
    Ok(Json(Data::new(tokens)))
}

/// Rotate a key refresh token.
///
/// POST /api/auth/refresh
#[tracing::instrument(skip(state, req, meta))]
pub async fn gateway_refresh(
    State(state): State<AppState>,
    Meta(meta): Meta,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<Data<TokenResponse>>, AppError> {
    let tokens = state
        .auth
        .refresh(&req.refresh_token, SubjectKind::Key, &meta)
        .await?;
    Ok(Json(Data::new(tokens)))
}
