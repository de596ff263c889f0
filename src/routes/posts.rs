use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::auth::ownership::ensure_author;
use crate::db::models::{NewPost, PostView, Tags};
use crate::error::{AppError, AppResult};
use crate::extractors::{ApiJson, CurrentUser};
use crate::routes::not_found;
use crate::state::AppState;
use crate::store::PostFilter;

const MISSING_POST_ID: &str = "Post id is required.";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts))
        .route("/posts/{id}", get(get_post))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/posts", post(create_post).put(update_post))
        .route("/posts/{id}", delete(delete_post))
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub author: Option<String>,
}

#[derive(Deserialize)]
pub struct CreatePostRequest {
    pub doc: String,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub comments: Vec<String>,
}

/// Partial update. Absent fields are left as stored; `likes` is unsigned so
/// a negative count is rejected while decoding.
#[derive(Deserialize)]
pub struct UpdatePostRequest {
    pub id: Option<String>,
    pub doc: Option<String>,
    pub tags: Option<Tags>,
    pub comments: Option<Vec<String>>,
    pub likes: Option<u32>,
}

async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<PostView>>> {
    let filter = match query.author.as_deref() {
        Some(author) => PostFilter::by_author(author),
        None => PostFilter::all(),
    };
    let posts = state.store.list_posts(&filter).await?;
    Ok(Json(posts.into_iter().map(PostView::from).collect()))
}

async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<PostView>> {
    let post = state
        .store
        .query_post(&PostFilter::by_id(&id))
        .await
        .map_err(not_found("Post"))?;
    Ok(Json(post.into()))
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(body): ApiJson<CreatePostRequest>,
) -> AppResult<Json<PostView>> {
    let post = state
        .store
        .insert_post(NewPost {
            author: user.id,
            document: body.doc,
            comments: body.comments,
            tags: body.tags,
        })
        .await?;
    tracing::info!(user_id = %post.author, post_id = %post.id, "Created post");
    Ok(Json(post.into()))
}

async fn update_post(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(body): ApiJson<UpdatePostRequest>,
) -> AppResult<Json<PostView>> {
    let id = body
        .id
        .ok_or_else(|| AppError::Validation(MISSING_POST_ID.into()))?;
    let mut post = state
        .store
        .query_post(&PostFilter::by_id(&id))
        .await
        .map_err(not_found("Post"))?;

    ensure_author(&user, &post)?;

    if let Some(doc) = body.doc {
        post.document = doc;
    }
    if let Some(tags) = body.tags {
        post.tags = tags;
    }
    if let Some(comments) = body.comments {
        post.comments = comments;
    }
    if let Some(likes) = body.likes {
        post.likes = likes;
    }

    let post = state
        .store
        .update_post(&post)
        .await
        .map_err(not_found("Post"))?;
    Ok(Json(post.into()))
}

async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<PostView>> {
    let filter = PostFilter::by_id(&id);
    let post = state
        .store
        .query_post(&filter)
        .await
        .map_err(not_found("Post"))?;

    ensure_author(&user, &post)?;

    let post = state
        .store
        .delete_post(&filter)
        .await
        .map_err(not_found("Post"))?;
    tracing::info!(user_id = %user.id, post_id = %post.id, "Deleted post");
    Ok(Json(post.into()))
}
