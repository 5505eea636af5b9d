//! Service API endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::{parse_id, ApiJson, ApiResult, Created};
use crate::errors::AppError;
use crate::models::{Service, ServiceRequest};
use crate::AppState;

/// GET /api/services - List all services.
pub async fn list_services(State(state): State<AppState>) -> ApiResult<Json<Vec<Service>>> {
    Ok(Json(state.repo.list_services().await?))
}

/// GET /api/services/:id - Get a single service.
pub async fn get_service(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Service>> {
    let id = parse_id(&id, "Service")?;
    state
        .repo
        .get_service(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Service {} not found", id)))
}

/// POST /api/services - Create a new service.
pub async fn create_service(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ServiceRequest>,
) -> ApiResult<Created<Service>> {
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("Service name is required".to_string()));
    }

    let service = state.repo.create_service(&request).await?;
    Ok(Created(service))
}

/// PUT /api/services/:id - Overwrite a service.
pub async fn update_service(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<ServiceRequest>,
) -> ApiResult<Json<Service>> {
    let id = parse_id(&id, "Service")?;
    Ok(Json(state.repo.update_service(id, &request).await?))
}

/// DELETE /api/services/:id - Delete a service. Unknown ids, malformed or not, are a no-op.
pub async fn delete_service(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let Ok(id) = Uuid::parse_str(&id) else {
        return Ok(StatusCode::NO_CONTENT);
    };
    state.repo.delete_service(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
