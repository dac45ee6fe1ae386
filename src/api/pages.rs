use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;

use super::{
    ApiError, ApiResponse, AppState,
    auth::CurrentUser,
    types::{MessageResponse, PageDto},
    validation,
};

#[derive(Deserialize)]
pub struct CreatePageRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct RenamePageRequest {
    pub name: String,
}

/// GET /pages
/// List the caller's pages, oldest first.
pub async fn list_pages(
    State(state): State<Arc<AppState>>,
    current_user: axum::Extension<CurrentUser>,
) -> Result<Json<ApiResponse<Vec<PageDto>>>, ApiError> {
    let pages = state.store().list_pages_for_user(current_user.id).await?;
    Ok(Json(ApiResponse::success(
        pages.into_iter().map(PageDto::from).collect(),
    )))
}

/// POST /pages
pub async fn create_page(
    State(state): State<Arc<AppState>>,
    current_user: axum::Extension<CurrentUser>,
    Json(payload): Json<CreatePageRequest>,
) -> Result<Json<ApiResponse<PageDto>>, ApiError> {
    validation::validate_page_name(&payload.name)?;

    let page = state
        .store()
        .create_page(payload.name.trim(), current_user.id)
        .await?;

    tracing::info!(page_id = %page.id, user_id = current_user.id, "page created");
    metrics::counter!("marginalia_pages_created_total").increment(1);

    Ok(Json(ApiResponse::success(PageDto::from(page))))
}

/// GET /pages/{id}
pub async fn get_page(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<PageDto>>, ApiError> {
    let page = state
        .store()
        .get_page(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Page", &id))?;

    Ok(Json(ApiResponse::success(PageDto::from(page))))
}

/// PUT /pages/{id}
/// Rename a page. Owner only.
pub async fn rename_page(
    State(state): State<Arc<AppState>>,
    current_user: axum::Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(payload): Json<RenamePageRequest>,
) -> Result<Json<ApiResponse<PageDto>>, ApiError> {
    validation::validate_page_name(&payload.name)?;
    require_owner(&state, &id, current_user.id).await?;

    let page = state.store().rename_page(&id, payload.name.trim()).await?;
    Ok(Json(ApiResponse::success(PageDto::from(page))))
}

/// DELETE /pages/{id}
/// Remove a page together with its comments and stylesheet. Owner only.
pub async fn delete_page(
    State(state): State<Arc<AppState>>,
    current_user: axum::Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    require_owner(&state, &id, current_user.id).await?;

    let page = state.store().remove_page(&id).await?;
    state
        .stylesheets()
        .remove(&page.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to remove stylesheet: {e}")))?;

    tracing::info!(page_id = %id, user_id = current_user.id, "page deleted");

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Page deleted",
    ))))
}

/// PUT /pages/{id}/stylesheet
/// Upload the page's custom stylesheet (raw CSS body). Owner only.
pub async fn put_stylesheet(
    State(state): State<Arc<AppState>>,
    current_user: axum::Extension<CurrentUser>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ApiResponse<PageDto>>, ApiError> {
    require_owner(&state, &id, current_user.id).await?;

    let path = state
        .stylesheets()
        .save(&id, &body)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to store stylesheet: {e}")))?;

    let page = state.store().set_page_stylesheet(&id, Some(path)).await?;
    Ok(Json(ApiResponse::success(PageDto::from(page))))
}

/// GET /pages/{id}/stylesheet
/// Serve the stored CSS.
pub async fn get_stylesheet(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    // 404 for unknown pages and for pages without a stylesheet alike
    state
        .store()
        .get_page(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Page", &id))?;

    let css = state
        .stylesheets()
        .load(&id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to read stylesheet: {e}")))?
        .ok_or_else(|| ApiError::not_found("Stylesheet for page", &id))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        css,
    ))
}

/// DELETE /pages/{id}/stylesheet
/// Remove the stylesheet. Idempotent; owner only.
pub async fn delete_stylesheet(
    State(state): State<Arc<AppState>>,
    current_user: axum::Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<PageDto>>, ApiError> {
    require_owner(&state, &id, current_user.id).await?;

    state
        .stylesheets()
        .remove(&id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to remove stylesheet: {e}")))?;

    let page = state.store().set_page_stylesheet(&id, None).await?;
    Ok(Json(ApiResponse::success(PageDto::from(page))))
}

/// Fetch the page and check the caller owns it.
async fn require_owner(state: &AppState, page_id: &str, user_id: i32) -> Result<(), ApiError> {
    let page = state
        .store()
        .get_page(page_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Page", page_id))?;

    if page.user_id != user_id {
        return Err(ApiError::Unauthorized(
            "Only the page owner may do that".to_string(),
        ));
    }
    Ok(())
}
