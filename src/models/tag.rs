//! Tag model: a shared label for components.

use serde::{Deserialize, Serialize};

/// A label that many components may carry. Names are unique.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Request body for creating a new tag.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTagRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}
