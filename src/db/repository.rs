//! Database repository for CRUD operations.
//!
//! Uses prepared statements throughout; multi-statement writes run inside a transaction.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{
    Component, ComponentRequest, CreateIncidentRequest, CreateTagRequest, Incident,
    IncidentDetails, IncidentStatus, IncidentUpdate, Service, ServiceRequest, Tag,
    UpdateIncidentRequest,
};

const SERVICE_COLUMNS: &str = "id, name, description, status, created_at, updated_at";

const INCIDENT_SELECT: &str = r#"SELECT i.id, i.title, i.description, i.status, i.impact,
              i.service_id, i.created_at, i.updated_at, i.resolved_at,
              s.id AS s_id, s.name AS s_name, s.description AS s_description,
              s.status AS s_status, s.created_at AS s_created_at, s.updated_at AS s_updated_at
       FROM incidents i
       LEFT JOIN services s ON s.id = i.service_id"#;

const COMPONENT_COLUMNS: &str = "c.id, c.name, c.description, c.status, c.created_at, c.updated_at";

/// Ids of components carrying any tag named in a JSON array; the array is bound right after.
const TAGGED_COMPONENT_IDS: &str = "SELECT ct.component_id FROM component_tags ct \
     JOIN tags t ON t.id = ct.tag_id WHERE t.name IN (SELECT value FROM json_each(";

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== SERVICE OPERATIONS ====================

    /// List all services.
    pub async fn list_services(&self) -> Result<Vec<Service>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM services ORDER BY name",
            SERVICE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(service_from_row).collect()
    }

    /// Get a service by ID.
    pub async fn get_service(&self, id: Uuid) -> Result<Option<Service>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM services WHERE id = ?",
            SERVICE_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(service_from_row).transpose()
    }

    /// Create a new service.
    pub async fn create_service(&self, request: &ServiceRequest) -> Result<Service, AppError> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO services (id, name, description, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.status.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        tracing::info!(service_id = %id, "Created service");

        Ok(Service {
            id,
            name: request.name.clone(),
            description: request.description.clone(),
            status: request.status,
            created_at: now,
            updated_at: now,
        })
    }

    /// Overwrite the mutable fields of a service.
    pub async fn update_service(
        &self,
        id: Uuid,
        request: &ServiceRequest,
    ) -> Result<Service, AppError> {
        let row = sqlx::query(&format!(
            "UPDATE services SET name = ?, description = ?, status = ?, updated_at = ? WHERE id = ? RETURNING {}",
            SERVICE_COLUMNS
        ))
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.status.as_str())
        .bind(Utc::now())
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or_else(|| AppError::NotFound(format!("Service {} not found", id)))?;
        tracing::info!(service_id = %id, "Updated service");
        service_from_row(&row)
    }

    /// Delete a service.
    ///
    /// Refuses while any incident still references the service. Deleting an unknown id is a no-op.
    pub async fn delete_service(&self, id: Uuid) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let referencing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM incidents WHERE service_id = ?")
                .bind(id.to_string())
                .fetch_one(&mut *tx)
                .await?;

        if referencing > 0 {
            return Err(AppError::Conflict(format!(
                "Service {} is referenced by {} incident(s)",
                id, referencing
            )));
        }

        sqlx::query("DELETE FROM services WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(service_id = %id, "Deleted service");
        Ok(())
    }

    // ==================== INCIDENT OPERATIONS ====================

    /// List all incidents with their service attached, newest first.
    pub async fn list_incidents(&self) -> Result<Vec<Incident>, AppError> {
        let rows = sqlx::query(&format!("{} ORDER BY i.created_at DESC", INCIDENT_SELECT))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(incident_from_row).collect()
    }

    /// Get an incident by ID with its service attached.
    pub async fn get_incident(&self, id: Uuid) -> Result<Option<Incident>, AppError> {
        let row = sqlx::query(&format!("{} WHERE i.id = ?", INCIDENT_SELECT))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(incident_from_row).transpose()
    }

    /// Create a new incident.
    ///
    /// The service reference is stored as given without checking that the service exists.
    pub async fn create_incident(
        &self,
        request: &CreateIncidentRequest,
    ) -> Result<Incident, AppError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let resolved_at = (request.status == IncidentStatus::Resolved).then_some(now);

        sqlx::query(
            r#"INSERT INTO incidents (
                id, title, description, status, impact, service_id,
                created_at, updated_at, resolved_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(id.to_string())
        .bind(&request.title)
        .bind(&request.description)
        .bind(request.status.as_str())
        .bind(request.impact.as_str())
        .bind(request.service_id.to_string())
        .bind(now)
        .bind(now)
        .bind(resolved_at)
        .execute(&self.pool)
        .await?;

        tracing::info!(incident_id = %id, service_id = %request.service_id, "Created incident");

        self.get_incident(id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Incident {} vanished after insert", id)))
    }

    /// Overwrite the mutable fields of an incident.
    ///
    /// `resolved_at` is stamped the first time the status becomes `resolved` and kept from then on.
    pub async fn update_incident(
        &self,
        id: Uuid,
        request: &UpdateIncidentRequest,
    ) -> Result<Incident, AppError> {
        let now = Utc::now();
        let resolving = request.status == IncidentStatus::Resolved;

        let result = sqlx::query(
            r#"UPDATE incidents SET
                title = ?, description = ?, status = ?, impact = ?, updated_at = ?,
                resolved_at = CASE WHEN ? AND resolved_at IS NULL THEN ? ELSE resolved_at END
            WHERE id = ?"#,
        )
        .bind(&request.title)
        .bind(&request.description)
        .bind(request.status.as_str())
        .bind(request.impact.as_str())
        .bind(now)
        .bind(resolving)
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Incident {} not found", id)));
        }

        tracing::info!(incident_id = %id, status = %request.status, "Updated incident");

        self.get_incident(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Incident {} not found", id)))
    }

    /// Get an incident together with its timeline.
    pub async fn get_incident_details(&self, id: Uuid) -> Result<IncidentDetails, AppError> {
        let incident = self
            .get_incident(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Incident {} not found", id)))?;

        let updates = self.list_incident_updates(id).await?;

        Ok(IncidentDetails { incident, updates })
    }

    /// List the timeline entries of an incident, oldest first.
    pub async fn list_incident_updates(
        &self,
        incident_id: Uuid,
    ) -> Result<Vec<IncidentUpdate>, AppError> {
        let rows = sqlx::query(
            "SELECT id, incident_id, message, status, created_at FROM incident_updates WHERE incident_id = ? ORDER BY created_at",
        )
        .bind(incident_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(incident_update_from_row).collect()
    }

    /// Append a timeline entry to an incident.
    ///
    /// Not exposed over HTTP; timeline entries are written through the repository only.
    #[cfg_attr(not(test), allow(dead_code))]
    pub async fn create_incident_update(
        &self,
        incident_id: Uuid,
        message: &str,
        status: IncidentStatus,
    ) -> Result<IncidentUpdate, AppError> {
        if self.get_incident(incident_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "Incident {} not found",
                incident_id
            )));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO incident_updates (id, incident_id, message, status, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(incident_id.to_string())
        .bind(message)
        .bind(status.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(IncidentUpdate {
            id,
            incident_id,
            message: message.to_string(),
            status,
            created_at: now,
        })
    }

    // ==================== TAG OPERATIONS ====================

    /// List all tags.
    pub async fn list_tags(&self) -> Result<Vec<Tag>, AppError> {
        let rows = sqlx::query("SELECT id, name, description FROM tags ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(tag_from_row).collect())
    }

    /// Create a new tag. A duplicate name is a conflict.
    pub async fn create_tag(&self, request: &CreateTagRequest) -> Result<Tag, AppError> {
        let id = Uuid::new_v4().to_string();
        let name = request.name.trim();

        sqlx::query("INSERT INTO tags (id, name, description) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(name)
            .bind(&request.description)
            .execute(&self.pool)
            .await?;

        tracing::info!(tag_id = %id, name, "Created tag");

        Ok(Tag {
            id,
            name: name.to_string(),
            description: request.description.clone(),
        })
    }

    // ==================== COMPONENT OPERATIONS ====================

    /// List components with their tags.
    ///
    /// With a non-empty `tag_names`, only components carrying at least one of the named tags are returned.
    pub async fn list_components(&self, tag_names: &[String]) -> Result<Vec<Component>, AppError> {
        // The filter travels as one JSON array parameter, however many names it holds
        let filter = if tag_names.is_empty() {
            None
        } else {
            Some(serde_json::to_string(tag_names).map_err(|e| {
                AppError::Internal(format!("Failed to encode tag filter: {}", e))
            })?)
        };

        let mut tx = self.pool.begin().await?;

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM components c", COMPONENT_COLUMNS));
        if let Some(filter) = &filter {
            query.push(" WHERE c.id IN (");
            query.push(TAGGED_COMPONENT_IDS);
            query.push_bind(filter);
            query.push("))");
        }
        query.push(" ORDER BY c.name, c.created_at");
        let rows = query.build().fetch_all(&mut *tx).await?;

        let mut tags = tags_by_component(&mut *tx, filter.as_deref()).await?;
        tx.commit().await?;

        Ok(rows
            .iter()
            .map(|row| {
                let id: String = row.get("id");
                let component_tags = tags.remove(&id).unwrap_or_default();
                component_from_row(row, component_tags)
            })
            .collect())
    }

    /// Get a component by ID with its tags.
    pub async fn get_component(&self, id: &str) -> Result<Option<Component>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM components c WHERE c.id = ?",
            COMPONENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let tags = sqlx::query(
            "SELECT t.id, t.name, t.description FROM component_tags ct \
             JOIN tags t ON t.id = ct.tag_id WHERE ct.component_id = ? ORDER BY t.name",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(component_from_row(
            &row,
            tags.iter().map(tag_from_row).collect(),
        )))
    }

    /// Create a component and its tag associations atomically.
    pub async fn create_component(&self, request: &ComponentRequest) -> Result<Component, AppError> {
        let tag_names = request.tag_names().map_err(AppError::Validation)?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO components (id, name, description, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.effective_status())
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        attach_tags(&mut *tx, &id, &tag_names).await?;

        tx.commit().await?;

        tracing::info!(component_id = %id, tags = tag_names.len(), "Created component");

        self.get_component(&id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Component {} vanished after insert", id)))
    }

    /// Overwrite a component and replace its tag set atomically.
    pub async fn update_component(
        &self,
        id: &str,
        request: &ComponentRequest,
    ) -> Result<Component, AppError> {
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE components SET name = ?, description = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.effective_status())
        .bind(&now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Component {} not found", id)));
        }

        // Dropping the transaction on a bad tag list rolls back the overwrite above
        let tag_names = request.tag_names().map_err(AppError::Validation)?;

        sqlx::query("DELETE FROM component_tags WHERE component_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        attach_tags(&mut *tx, id, &tag_names).await?;

        tx.commit().await?;

        tracing::info!(component_id = %id, tags = tag_names.len(), "Updated component");

        self.get_component(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Component {} not found", id)))
    }

    /// Delete a component and its tag associations atomically. Tags themselves are kept.
    pub async fn delete_component(&self, id: &str) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM component_tags WHERE component_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM components WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(component_id = %id, "Deleted component");
        Ok(())
    }
}

/// Load component tags keyed by component id, limited to the components matched by `filter`.
async fn tags_by_component(
    conn: &mut SqliteConnection,
    filter: Option<&str>,
) -> Result<HashMap<String, Vec<Tag>>, AppError> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT ct.component_id, t.id, t.name, t.description \
         FROM component_tags ct JOIN tags t ON t.id = ct.tag_id",
    );
    if let Some(filter) = filter {
        query.push(" WHERE ct.component_id IN (");
        query.push(TAGGED_COMPONENT_IDS);
        query.push_bind(filter);
        query.push("))");
    }
    query.push(" ORDER BY t.name");

    let rows = query.build().fetch_all(&mut *conn).await?;

    let mut tags: HashMap<String, Vec<Tag>> = HashMap::new();
    for row in &rows {
        let component_id: String = row.get("component_id");
        tags.entry(component_id).or_default().push(tag_from_row(row));
    }

    Ok(tags)
}

/// Associate each named tag with the component, creating missing tags on the way.
async fn attach_tags(
    conn: &mut SqliteConnection,
    component_id: &str,
    tag_names: &[String],
) -> Result<(), AppError> {
    for name in tag_names {
        let tag_id = find_or_create_tag(&mut *conn, name).await?;

        sqlx::query("INSERT INTO component_tags (component_id, tag_id) VALUES (?, ?)")
            .bind(component_id)
            .bind(&tag_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Return the id of the tag named `name`, inserting it first if it does not exist.
async fn find_or_create_tag(conn: &mut SqliteConnection, name: &str) -> Result<String, AppError> {
    sqlx::query("INSERT INTO tags (id, name, description) VALUES (?, ?, '') ON CONFLICT(name) DO NOTHING")
        .bind(Uuid::new_v4().to_string())
        .bind(name)
        .execute(&mut *conn)
        .await?;

    let id: String = sqlx::query_scalar("SELECT id FROM tags WHERE name = ?")
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;

    Ok(id)
}

// Helper functions for row conversion

fn uuid_column(row: &SqliteRow, column: &str) -> Result<Uuid, AppError> {
    let raw: String = row.try_get(column)?;
    Uuid::parse_str(&raw)
        .map_err(|e| AppError::Internal(format!("Invalid UUID in column {}: {}", column, e)))
}

fn enum_column<T>(row: &SqliteRow, column: &str) -> Result<T, AppError>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(AppError::Internal)
}

fn service_from_row(row: &SqliteRow) -> Result<Service, AppError> {
    Ok(Service {
        id: uuid_column(row, "id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        status: enum_column(row, "status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn incident_from_row(row: &SqliteRow) -> Result<Incident, AppError> {
    let service_id: Option<String> = row.try_get("s_id")?;
    let service = match service_id {
        Some(_) => Some(Service {
            id: uuid_column(row, "s_id")?,
            name: row.try_get("s_name")?,
            description: row.try_get("s_description")?,
            status: enum_column(row, "s_status")?,
            created_at: row.try_get("s_created_at")?,
            updated_at: row.try_get("s_updated_at")?,
        }),
        None => None,
    };

    let resolved_at: Option<DateTime<Utc>> = row.try_get("resolved_at")?;

    Ok(Incident {
        id: uuid_column(row, "id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        status: enum_column(row, "status")?,
        impact: enum_column(row, "impact")?,
        service_id: uuid_column(row, "service_id")?,
        service,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        resolved_at,
    })
}

fn incident_update_from_row(row: &SqliteRow) -> Result<IncidentUpdate, AppError> {
    Ok(IncidentUpdate {
        id: uuid_column(row, "id")?,
        incident_id: uuid_column(row, "incident_id")?,
        message: row.try_get("message")?,
        status: enum_column(row, "status")?,
        created_at: row.try_get("created_at")?,
    })
}

fn tag_from_row(row: &SqliteRow) -> Tag {
    Tag {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
    }
}

fn component_from_row(row: &SqliteRow, tags: Vec<Tag>) -> Component {
    Component {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        status: row.get("status"),
        tags,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
