//! Service model: a monitored unit of the product.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ServiceStatus;

/// A monitored service with its current operational status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub status: ServiceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for creating or overwriting a service.
///
/// Updates replace every mutable field; omitted fields are written as empty.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: ServiceStatus,
}
