use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use super::error::ApiError;
use super::requests::{CreatePostRequest, ListPostsQuery, UpdatePostRequest};
use super::AppState;
use crate::core::storage::{Page, PostRecord};

pub async fn list_posts(
    State(state): State<AppState>,
    query: Result<Query<ListPostsQuery>, QueryRejection>,
) -> Result<Json<Page<PostRecord>>, ApiError> {
    let Query(query) = query?;
    let filter = query.into_filter()?;
    let page = state.repository.list(&filter).await?;
    Ok(Json(page))
}

pub async fn create_post(
    State(state): State<AppState>,
    payload: Result<Json<CreatePostRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PostRecord>), ApiError> {
    let Json(payload) = payload?;
    let new_post = payload.into_new_post()?;
    let post = state.repository.create(&new_post).await?;
    tracing::info!(id = post.id, link = %post.link, "post created");
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn show_post(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<PostRecord>, ApiError> {
    let id = post_id(id)?;
    let post = state.repository.find(id).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(post))
}

/// Existence is checked before the payload, so a missing id answers 404 even
/// when the body is invalid.
pub async fn update_post(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdatePostRequest>, JsonRejection>,
) -> Result<Json<PostRecord>, ApiError> {
    let id = post_id(id)?;
    if state.repository.find(id).await?.is_none() {
        return Err(ApiError::NotFound);
    }
    let Json(payload) = payload?;
    let changes = payload.into_changes()?;
    let post = state
        .repository
        .update(id, &changes)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(post))
}

pub async fn delete_post(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let id = post_id(id)?;
    if !state.repository.delete(id).await? {
        return Err(ApiError::NotFound);
    }
    tracing::info!(id, "post deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// A non-numeric id can never match a post.
fn post_id(id: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    id.map(|Path(id)| id).map_err(|_| ApiError::NotFound)
}
