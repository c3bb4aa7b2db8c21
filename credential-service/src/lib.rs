//! Credential platform core.
//!
//! Hierarchical capability-based credentialing with two surfaces:
//! - Console (`/console`): human owners authenticated by password.
//! - Gateway (`/api`): machine keys authenticated by opaque secret
//!   exchange and bearer access tokens.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::handlers::{auth, grants, groups, keys, posts, well_known};
use crate::middleware::{console_auth, gateway_auth};
use crate::services::{
    AuditService, AuthService, AuthzService, Database, KeyLifecycleService, PgPostStore,
    SecretHasher, SigningService,
};
use crate::utils::Clock;
use service_core::error::AppError;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServiceConfig,
    pub db: Database,
    pub signer: SigningService,
    pub clock: Clock,
    pub audit: AuditService,
    pub auth: AuthService,
    pub keys: KeyLifecycleService,
    pub authz: AuthzService,
    pub posts: PgPostStore,
}

impl AppState {
    /// Wire the service graph. Fails fast on bad key material or hash
    /// parameters.
    pub fn build(config: ServiceConfig, db: Database, clock: Clock) -> Result<Self, AppError> {
        let signer = SigningService::new(&config.token, &config.signing)
            .map_err(AppError::ConfigError)?;
        let hasher = SecretHasher::new(&config.hashing).map_err(AppError::ConfigError)?;
        let audit = AuditService::new(db.clone());

        let auth = AuthService::new(
            db.clone(),
            signer.clone(),
            hasher.clone(),
            audit.clone(),
            clock.clone(),
            config.token.refresh_token_ttl_seconds,
        );
        let keys = KeyLifecycleService::new(db.clone(), hasher, audit.clone(), clock.clone());
        let posts = PgPostStore::new(db.clone());
        let authz = AuthzService::new(db.clone(), Arc::new(posts.clone()));

        Ok(Self {
            config,
            db,
            signer,
            clock,
            audit,
            auth,
            keys,
            authz,
            posts,
        })
    }
}

/// Build the application router: both surfaces plus the public
/// endpoints.
pub fn build_router(state: AppState) -> Router {
    let console_protected = Router::new()
        .route("/keys/primary", post(keys::mint_primary))
        .route("/keys", get(keys::list_keys))
        .route("/keys/:key_id", get(keys::get_key))
        .route("/keys/:key_id/lineage", get(keys::get_lineage))
        .route("/keys/:key_id/descendants", get(keys::get_descendants))
        .route("/keys/:key_id/rotate", post(keys::rotate_key))
        .route("/keys/:key_id/activate", post(keys::activate_key))
        .route("/keys/:key_id/deactivate", post(keys::deactivate_key))
        .route("/groups", post(groups::create_group).get(groups::list_groups))
        .route(
            "/groups/:group_id/members",
            post(groups::add_member).get(groups::list_members),
        )
        .route(
            "/groups/:group_id/members/:key_id",
            delete(groups::remove_member),
        )
        .route("/posts", get(posts::admin_list_posts))
        .route("/posts/:post_id/access", put(grants::owner_upsert_grant))
        .route(
            "/posts/:post_id/access/:target_kind/:target_id",
            delete(grants::owner_revoke_grant),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            console_auth,
        ));

    let console = Router::new()
        .route("/owners/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::console_refresh))
        .route("/auth/logout", post(auth::logout))
        .merge(console_protected);

    let gateway_protected = Router::new()
        .route("/keys", post(keys::mint_child))
        .route("/posts", post(posts::create_post).get(posts::list_posts))
        .route("/posts/:post_id", get(posts::get_post))
        .route("/posts/:post_id/comments", post(posts::create_comment))
        .route("/posts/:post_id/access", put(grants::key_upsert_grant))
        .route(
            "/posts/:post_id/access/:target_kind/:target_id",
            delete(grants::key_revoke_grant),
        )
        .route("/groups", get(groups::list_groups_for_key))
        .route("/feeds/:use_key_id/posts", get(posts::feed))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            gateway_auth,
        ));

    let gateway = Router::new()
        .route("/auth/exchange", post(auth::exchange))
        .route("/auth/refresh", post(auth::gateway_refresh))
        .merge(gateway_protected);

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/.well-known/jwks.json", get(well_known::jwks))
        .nest("/console", console)
        .nest("/api", gateway)
        .layer(TraceLayer::new_for_http())
        // Every request carries a deadline; slow database work is cut
        // off rather than held open indefinitely.
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(state)
}

/// Liveness probe - service is running.
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
    }))
}

/// Readiness probe - service can reach its database.
pub async fn readiness_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.db.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Database readiness check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(serde_json::json!({
        "status": "ready",
        "service": state.config.service_name,
        "checks": { "postgresql": "up" }
    })))
}
