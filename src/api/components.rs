//! Component API endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use super::{ApiJson, ApiResult, Created};
use crate::errors::AppError;
use crate::models::{Component, ComponentRequest};
use crate::AppState;

/// GET /api/components?tags=a&tags=b - List components, optionally filtered by tag names.
pub async fn list_components(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Json<Vec<Component>>> {
    let tag_names = tag_filter(params);
    Ok(Json(state.repo.list_components(&tag_names).await?))
}

/// POST /api/components - Create a component with its tags.
pub async fn create_component(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ComponentRequest>,
) -> ApiResult<Created<Component>> {
    if request.name.trim().is_empty() {
        return Err(AppError::Validation(
            "Component name is required".to_string(),
        ));
    }

    let component = state.repo.create_component(&request).await?;
    Ok(Created(component))
}

/// PUT /api/components/:id - Overwrite a component and replace its tags.
pub async fn update_component(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<ComponentRequest>,
) -> ApiResult<Json<Component>> {
    Ok(Json(state.repo.update_component(&id, &request).await?))
}

/// DELETE /api/components/:id - Delete a component and its tag associations.
pub async fn delete_component(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.repo.delete_component(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Collect the repeated `tags` query parameters, skipping blanks and duplicates.
fn tag_filter(params: Vec<(String, String)>) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for (key, value) in params {
        let value = value.trim();
        if key == "tags" && !value.is_empty() && !names.iter().any(|n| n == value) {
            names.push(value.to_string());
        }
    }
    names
}
