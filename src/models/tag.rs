//! Tag model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

/// Which content table a tag link belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagTarget {
    Article,
    Blog,
}

impl TagTarget {
    /// Join table name
    pub fn table(&self) -> &'static str {
        match self {
            TagTarget::Article => "article_tags",
            TagTarget::Blog => "blog_tags",
        }
    }

    /// Foreign key column in the join table
    pub fn column(&self) -> &'static str {
        match self {
            TagTarget::Article => "article_id",
            TagTarget::Blog => "blog_id",
        }
    }
}
