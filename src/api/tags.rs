//! Tag API endpoints.

use axum::{extract::State, Json};

use super::{ApiJson, ApiResult, Created};
use crate::errors::AppError;
use crate::models::{CreateTagRequest, Tag};
use crate::AppState;

/// GET /api/tags - List all tags.
pub async fn list_tags(State(state): State<AppState>) -> ApiResult<Json<Vec<Tag>>> {
    Ok(Json(state.repo.list_tags().await?))
}

/// POST /api/tags - Create a new tag.
pub async fn create_tag(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateTagRequest>,
) -> ApiResult<Created<Tag>> {
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("Tag name is required".to_string()));
    }

    let tag = state.repo.create_tag(&request).await?;
    Ok(Created(tag))
}
