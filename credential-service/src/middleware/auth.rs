//! Request gatekeeper.
//!
//! Per-surface bearer verification: Console requests must carry owner
//! tokens, Gateway requests key tokens. On success the authenticated
//! `Principal` rides the request extensions; failures log on the `auth`
//! target (never a secret) and return the standard envelope.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::models::{id, KeyType, Principal};
use crate::services::{RequestMeta, TokenType};
use crate::AppState;
use service_core::error::AppError;

/// Console surface: owner tokens only.
pub async fn console_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = authenticate(&state, req.headers(), TokenType::Owner).await?;
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

/// Gateway surface: key tokens only.
pub async fn gateway_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = authenticate(&state, req.headers(), TokenType::Key).await?;
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    expected: TokenType,
) -> Result<Principal, AppError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let Some(token) = token else {
        tracing::debug!(target: "auth", "Missing or malformed Authorization header");
        return Err(AppError::Unauthorized);
    };

    let claims = state
        .signer
        .verify(token, expected, state.clock.now())
        .map_err(|failure| {
            tracing::warn!(
                target: "auth",
                reason = failure.as_str(),
                surface = expected.as_str(),
                "Token verification failed"
            );
            AppError::Unauthorized
        })?;

    match expected {
        TokenType::Owner => {
            let owner_id = claims
                .owner_id
                .as_deref()
                .and_then(|s| id::from_external(s).ok())
                .ok_or(AppError::Unauthorized)?;
            Ok(Principal::Owner {
                id: owner_id,
                permissions: claims.permissions,
            })
        }
        TokenType::Key => {
            let key_id = claims
                .key_id
                .as_deref()
                .and_then(|s| id::from_external(s).ok())
                .ok_or(AppError::Unauthorized)?;
            // The row backs the principal with its subtype and lineage
            // root; a token for a deleted row is dead.
            let key = state
                .db
                .find_key_by_id(key_id)
                .await
                .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?
                .ok_or(AppError::Unauthorized)?;
            let key_type = claims
                .roles
                .first()
                .and_then(|r| KeyType::parse(r))
                .unwrap_or_else(|| key.kind());
            Ok(Principal::Key {
                id: key_id,
                key_type,
                permissions: claims.permissions,
                initial_author_key_id: key.initial_author_key_id,
            })
        }
    }
}

/// Extractor handing handlers the authenticated principal.
pub struct AuthPrincipal(pub Principal);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthPrincipal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let principal = parts.extensions.get::<Principal>().cloned().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!("principal missing from request extensions"))
        })?;
        Ok(AuthPrincipal(principal))
    }
}

/// Extractor for request metadata used in audit and device binding.
pub struct Meta(pub RequestMeta);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Meta
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Meta(meta_from_headers(&parts.headers)))
    }
}

fn meta_from_headers(headers: &HeaderMap) -> RequestMeta {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    RequestMeta { ip, user_agent }
}
