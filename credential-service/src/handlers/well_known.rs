//! Key-set publication endpoint.

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    Json,
};

use crate::AppState;

/// Published verification keys. Unauthenticated; cacheable for ten
/// minutes. Only public keys appear here.
///
/// GET /.well-known/jwks.json
pub async fn jwks(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "public, max-age=600, must-revalidate")],
        Json(state.signer.jwks().clone()),
    )
}
