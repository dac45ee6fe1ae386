use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, auth::CurrentUser, validation};
use crate::db::NewComment;
use crate::services::CommentNode;

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    pub page_id: String,
    pub text: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateCommentRequest {
    pub text: String,
}

#[derive(Serialize)]
pub struct DeleteCommentResponse {
    /// Number of comments removed, replies included.
    pub deleted: usize,
}

#[derive(Serialize)]
pub struct CommentDto {
    pub id: String,
    pub text: String,
    pub user_id: i32,
    pub page_id: String,
    pub parent_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<crate::db::Comment> for CommentDto {
    fn from(comment: crate::db::Comment) -> Self {
        Self {
            id: comment.id,
            text: comment.text,
            user_id: comment.user_id,
            page_id: comment.page_id,
            parent_id: comment.parent_id,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
        }
    }
}

/// POST /comments
/// Post a comment on a page, optionally as a reply. The parent must
/// belong to the same page.
pub async fn create_comment(
    State(state): State<Arc<AppState>>,
    current_user: axum::Extension<CurrentUser>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<Json<ApiResponse<CommentDto>>, ApiError> {
    validation::validate_comment_text(&payload.text)?;

    let comment = state
        .store()
        .create_comment(NewComment {
            text: payload.text,
            user_id: current_user.id,
            page_id: payload.page_id,
            parent_id: payload.parent_id,
        })
        .await?;

    tracing::info!(
        comment_id = %comment.id,
        page_id = %comment.page_id,
        user_id = current_user.id,
        "comment created"
    );
    metrics::counter!("marginalia_comments_created_total").increment(1);

    Ok(Json(ApiResponse::success(CommentDto::from(comment))))
}

/// GET /pages/{id}/comments
/// Full comment thread for a page: a forest of nested nodes in posting
/// order, each annotated with its author and avatar hash.
pub async fn page_thread(
    State(state): State<Arc<AppState>>,
    Path(page_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<CommentNode>>>, ApiError> {
    let thread = state.comment_trees().page_thread(&page_id).await?;
    Ok(Json(ApiResponse::success(thread)))
}

/// GET /comments/{id}
/// One comment with all of its descendants nested beneath it.
pub async fn get_comment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<CommentNode>>, ApiError> {
    let node = state.comment_trees().comment_subtree(&id).await?;
    Ok(Json(ApiResponse::success(node)))
}

/// PUT /comments/{id}
/// Edit a comment's text. Author only.
pub async fn update_comment(
    State(state): State<Arc<AppState>>,
    current_user: axum::Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateCommentRequest>,
) -> Result<Json<ApiResponse<CommentDto>>, ApiError> {
    validation::validate_comment_text(&payload.text)?;

    let existing = state
        .store()
        .get_comment(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Comment", &id))?;

    if existing.user_id != current_user.id {
        return Err(ApiError::Unauthorized(
            "Only the comment author may edit it".to_string(),
        ));
    }

    let comment = state.store().update_comment_text(&id, &payload.text).await?;
    Ok(Json(ApiResponse::success(CommentDto::from(comment))))
}

/// DELETE /comments/{id}
/// Remove a comment and its whole reply subtree. Allowed for the
/// comment author and for the owner of the page it sits on.
pub async fn delete_comment(
    State(state): State<Arc<AppState>>,
    current_user: axum::Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<DeleteCommentResponse>>, ApiError> {
    let existing = state
        .store()
        .get_comment(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Comment", &id))?;

    if existing.user_id != current_user.id {
        let page = state
            .store()
            .get_page(&existing.page_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Page", &existing.page_id))?;
        if page.user_id != current_user.id {
            return Err(ApiError::Unauthorized(
                "Only the author or the page owner may delete a comment".to_string(),
            ));
        }
    }

    let deleted = state.store().remove_comment(&id).await?;

    tracing::info!(comment_id = %id, deleted, "comment subtree removed");

    Ok(Json(ApiResponse::success(DeleteCommentResponse { deleted })))
}
