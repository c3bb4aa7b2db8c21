//! Post handlers on the Gateway surface, plus the Console admin view.
//!
//! Reads go through the authorization evaluator so a post the caller
//! cannot VIEW is indistinguishable from a missing one.

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use validator::Validate;

use super::{key_id, parse_id};
use crate::middleware::{AuthPrincipal, Meta};
use crate::models::{
    access_mask, actions, AuditEvent, Comment, CommentResponse, CreateCommentRequest,
    CreatePostRequest, Post, PostAccessGrant, PostResponse, TargetKind,
};
use crate::services::{evaluate_masked, Action, PostStore, ServiceError};
use crate::AppState;
use service_core::envelope::{Data, ListData};
use service_core::error::AppError;

const DEFAULT_PAGE_LIMIT: i64 = 50;
const MAX_PAGE_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    /// External id of the last post of the previous page; returns rows
    /// strictly older than it.
    pub cursor: Option<String>,
    /// External post id; returns rows strictly newer than it.
    pub since: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

/// Create a post authored by the authenticated key. The author gets a
/// full-mask grant in the same transaction.
///
/// POST /api/posts
#[tracing::instrument(skip(state, principal, req, meta))]
pub async fn create_post(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Meta(meta): Meta,
    Json(req): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Data<PostResponse>>), AppError> {
    evaluate_masked(&principal, Action::CreatePost, None).into_result()?;
    let author = key_id(&principal)?;
    req.validate()?;

    let now = state.clock.now();
    let post = Post::new(author, req.title, req.body, now);
    let author_grant = PostAccessGrant::new(
        post.post_id,
        TargetKind::Key,
        author,
        access_mask::VIEW | access_mask::COMMENT | access_mask::MANAGE_ACCESS,
        now,
    );
    state
        .db
        .create_post(&post, &author_grant)
        .await
        .map_err(ServiceError::Database)?;

    state
        .audit
        .emit(
            AuditEvent::new(principal.actor_kind(), author, actions::POSTS_CREATE, now)
                .with_subject("post", post.post_id)
                .with_request_meta(meta.ip.clone(), meta.user_agent.clone()),
        )
        .await;

    Ok((StatusCode::CREATED, Json(Data::new(post.into()))))
}

/// Read a post.
///
/// GET /api/posts/{post_id}
#[tracing::instrument(skip(state, principal), fields(post_id = %post))]
pub async fn get_post(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(post): Path<String>,
) -> Result<Json<Data<PostResponse>>, AppError> {
    key_id(&principal)?;
    let post_id = parse_id(&post)?;

    state
        .authz
        .authorize(&principal, Action::ReadPost, Some(post_id))
        .await?
        .into_result()?;

    let post = state
        .posts
        .find(post_id)
        .await?
        .ok_or(ServiceError::NotFound("post"))?;
    Ok(Json(Data::new(post.into())))
}

/// List posts visible to the authenticated key, newest first.
///
/// GET /api/posts
#[tracing::instrument(skip(state, principal, query))]
pub async fn list_posts(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListData<PostResponse>>, AppError> {
    let key = key_id(&principal)?;
    if !principal.has_permission("posts:read") {
        return Err(ServiceError::MissingCapability("posts:read".to_string()).into());
    }

    list_visible_page(&state, key, query).await
}

/// Use-key feed. The path id must name the authenticated key itself;
/// any other id reads as missing so foreign feeds stay unobservable.
/// The page is assembled from the post store's visible-id contract.
///
/// GET /api/feeds/{use_key_id}/posts
#[tracing::instrument(skip(state, principal, query), fields(use_key_id = %use_key))]
pub async fn feed(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(use_key): Path<String>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<ListData<PostResponse>>, AppError> {
    let key = key_id(&principal)?;
    let requested = parse_id(&use_key)?;
    if requested != key {
        return Err(ServiceError::NotFound("feed").into());
    }
    if !principal.has_permission("posts:read") {
        return Err(ServiceError::MissingCapability("posts:read".to_string()).into());
    }

    let limit = clamp_limit(query.limit);
    let before = query.cursor.as_deref().map(parse_id).transpose()?;
    let groups = state
        .db
        .groups_for_key(key)
        .await
        .map_err(ServiceError::Database)?;
    let ids = state
        .posts
        .list_visible_post_ids(key, &groups, before, limit)
        .await?;
    let posts = state.posts.find_many(&ids).await?;
    Ok(Json(page_response(posts, limit)))
}

/// Comment on a post; requires the COMMENT bit.
///
/// POST /api/posts/{post_id}/comments
#[tracing::instrument(skip(state, principal, req), fields(post_id = %post))]
pub async fn create_comment(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(post): Path<String>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Data<CommentResponse>>), AppError> {
    let author = key_id(&principal)?;
    let post_id = parse_id(&post)?;
    req.validate()?;

    state
        .authz
        .authorize(&principal, Action::Comment, Some(post_id))
        .await?
        .into_result()?;

    let comment = Comment::new(post_id, author, req.body, state.clock.now());
    state
        .db
        .insert_comment(&comment)
        .await
        .map_err(ServiceError::Database)?;

    Ok((StatusCode::CREATED, Json(Data::new(comment.into()))))
}

/// Admin view over all posts.
///
/// GET /console/posts
#[tracing::instrument(skip(state, principal, query))]
pub async fn admin_list_posts(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListData<PostResponse>>, AppError> {
    evaluate_masked(&principal, Action::AdminReadPosts, None).into_result()?;

    let limit = clamp_limit(query.limit);
    let posts = state
        .db
        .list_all_posts(limit)
        .await
        .map_err(ServiceError::Database)?;
    Ok(Json(page_response(posts, limit)))
}

async fn list_visible_page(
    state: &AppState,
    key: uuid::Uuid,
    query: ListQuery,
) -> Result<Json<ListData<PostResponse>>, AppError> {
    let limit = clamp_limit(query.limit);
    let before = query.cursor.as_deref().map(parse_id).transpose()?;
    let since = query.since.as_deref().map(parse_id).transpose()?;
    let groups = state
        .db
        .groups_for_key(key)
        .await
        .map_err(ServiceError::Database)?;
    let posts = state
        .posts
        .list_visible(key, &groups, before, since, limit)
        .await?;
    Ok(Json(page_response(posts, limit)))
}

fn page_response(posts: Vec<Post>, limit: i64) -> ListData<PostResponse> {
    let cursor = if posts.len() as i64 == limit {
        posts.last().map(|p| crate::models::id::to_external(p.post_id))
    } else {
        None
    };
    let items = posts.into_iter().map(PostResponse::from).collect();
    ListData::new(items, limit, cursor)
}

fn clamp_limit(requested: Option<i64>) -> i64 {
    requested.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT)
}
