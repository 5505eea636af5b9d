//! Component model: a status page grouping classified by tags.

use serde::{Deserialize, Serialize};

use super::Tag;

/// Status given to components created without one.
pub const DEFAULT_COMPONENT_STATUS: &str = "operational";

/// A piece of infrastructure shown on the status page.
///
/// Timestamps are RFC 3339 text written by the application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: String,
    pub tags: Vec<Tag>,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for creating or overwriting a component.
///
/// `tags` is the complete desired tag set; it replaces the current one.
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ComponentRequest {
    /// Status to persist, falling back to the default when blank.
    pub fn effective_status(&self) -> &str {
        if self.status.trim().is_empty() {
            DEFAULT_COMPONENT_STATUS
        } else {
            &self.status
        }
    }

    /// Trimmed tag names in request order with duplicates removed.
    pub fn tag_names(&self) -> Result<Vec<String>, String> {
        let mut names: Vec<String> = Vec::with_capacity(self.tags.len());
        for raw in &self.tags {
            let name = raw.trim();
            if name.is_empty() {
                return Err("Tag names must not be empty".to_string());
            }
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}
