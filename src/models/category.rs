//! Category model
//!
//! Categories form a shallow tree through `parent_id` and carry a Hindi display
//! name next to the English one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub name_hi: Option<String>,
    pub slug: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub parent_id: Option<i64>,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn summary(&self) -> CategorySummary {
        CategorySummary {
            id: self.id,
            name: self.name.clone(),
            name_hi: self.name_hi.clone(),
            slug: self.slug.clone(),
        }
    }

    pub fn apply(&mut self, changes: CategoryChanges) {
        if let Some(v) = changes.name {
            self.name = v;
        }
        if let Some(v) = changes.name_hi {
            self.name_hi = v;
        }
        if let Some(v) = changes.slug {
            self.slug = v;
        }
        if let Some(v) = changes.description {
            self.description = v;
        }
        if let Some(v) = changes.image {
            self.image = v;
        }
        if let Some(v) = changes.icon {
            self.icon = v;
        }
        if let Some(v) = changes.color {
            self.color = v;
        }
        if let Some(v) = changes.parent_id {
            self.parent_id = v;
        }
        if let Some(v) = changes.sort_order {
            self.sort_order = v;
        }
        self.updated_at = Utc::now();
    }
}

/// Minimal projection embedded in other resources
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub id: i64,
    pub name: String,
    pub name_hi: Option<String>,
    pub slug: String,
}

/// A category together with its parent's summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryWithParent {
    #[serde(flatten)]
    pub category: Category,
    pub parent: Option<CategorySummary>,
}

#[derive(Debug, Clone, Default)]
pub struct NewCategory {
    pub name: String,
    pub name_hi: Option<String>,
    pub slug: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub parent_id: Option<i64>,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryChanges {
    pub name: Option<String>,
    pub name_hi: Option<Option<String>>,
    pub slug: Option<String>,
    pub description: Option<Option<String>>,
    pub image: Option<Option<String>>,
    pub icon: Option<Option<String>>,
    pub color: Option<Option<String>>,
    pub parent_id: Option<Option<i64>>,
    pub sort_order: Option<i32>,
}
