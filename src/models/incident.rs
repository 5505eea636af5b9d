//! Incident and incident timeline models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{IncidentImpact, IncidentStatus, Service};

/// An event affecting a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: IncidentStatus,
    pub impact: IncidentImpact,
    pub service_id: Uuid,
    /// The owning service, absent when the reference dangles
    pub service: Option<Service>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Stamped the first time the incident is resolved, never cleared
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Request body for creating a new incident.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateIncidentRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: IncidentStatus,
    pub impact: IncidentImpact,
    pub service_id: Uuid,
}

/// Request body for overwriting an incident.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateIncidentRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: IncidentStatus,
    pub impact: IncidentImpact,
}

/// A timeline entry attached to an incident. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentUpdate {
    pub id: Uuid,
    pub incident_id: Uuid,
    pub message: String,
    pub status: IncidentStatus,
    pub created_at: DateTime<Utc>,
}

/// An incident together with its timeline.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentDetails {
    pub incident: Incident,
    pub updates: Vec<IncidentUpdate>,
}
