//! Item categories

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named grouping of items and attribute types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    /// Leading SKU segment, already sanitized to `[A-Z0-9-]`
    pub prefix: Option<String>,
    /// Only one level of nesting is allowed: a parent is always a root
    pub parent_id: Option<Uuid>,
    pub is_system: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Input for creating a category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub prefix: Option<String>,
    pub parent_id: Option<Uuid>,
    pub is_system: bool,
    pub sort_order: i32,
}

/// Partial update of a category; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryChanges {
    pub name: Option<String>,
    /// An empty string clears the prefix
    pub prefix: Option<String>,
    pub sort_order: Option<i32>,
}

impl CategoryChanges {
    pub fn apply(self, category: &mut Category) {
        if let Some(name) = self.name {
            category.name = name;
        }
        if let Some(prefix) = self.prefix {
            category.prefix = Some(prefix).filter(|p| !p.is_empty());
        }
        if let Some(sort_order) = self.sort_order {
            category.sort_order = sort_order;
        }
    }
}
