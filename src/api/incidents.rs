//! Incident API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{parse_id, ApiJson, ApiResult, Created};
use crate::errors::AppError;
use crate::models::{CreateIncidentRequest, Incident, IncidentDetails, UpdateIncidentRequest};
use crate::AppState;

/// GET /api/incidents - List all incidents with their services.
pub async fn list_incidents(State(state): State<AppState>) -> ApiResult<Json<Vec<Incident>>> {
    Ok(Json(state.repo.list_incidents().await?))
}

/// POST /api/incidents - Create a new incident.
pub async fn create_incident(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateIncidentRequest>,
) -> ApiResult<Created<Incident>> {
    if request.title.trim().is_empty() {
        return Err(AppError::Validation("Incident title is required".to_string()));
    }

    let incident = state.repo.create_incident(&request).await?;
    Ok(Created(incident))
}

/// PUT /api/incidents/:id - Overwrite an incident.
pub async fn update_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateIncidentRequest>,
) -> ApiResult<Json<Incident>> {
    let id = parse_id(&id, "Incident")?;
    Ok(Json(state.repo.update_incident(id, &request).await?))
}

/// GET /api/incidents/:id - Get an incident with its timeline.
pub async fn get_incident_details(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<IncidentDetails>> {
    let id = parse_id(&id, "Incident")?;
    Ok(Json(state.repo.get_incident_details(id).await?))
}
