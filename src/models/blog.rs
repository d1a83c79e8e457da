//! Blog post model

use chrono::{DateTime, Utc};

use super::content::{ContentStatus, Language, PublishState};

/// A blog post. Same lifecycle as an article, lighter editorial surface.
#[derive(Debug, Clone)]
pub struct Blog {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub content: String,
    pub short_description: Option<String>,
    pub image: Option<String>,
    pub views: i64,
    pub state: PublishState,
    pub language: Language,
    pub category_id: Option<i64>,
    pub author_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBlog {
    pub slug: String,
    pub title: String,
    pub content: String,
    pub short_description: Option<String>,
    pub image: Option<String>,
    pub state: PublishState,
    pub language: Language,
    pub category_id: Option<i64>,
    pub author_id: i64,
}

/// Partial update; `category_id: Some(None)` disconnects the category.
#[derive(Debug, Clone, Default)]
pub struct BlogChanges {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub short_description: Option<Option<String>>,
    pub image: Option<Option<String>>,
    pub state: Option<PublishState>,
    pub language: Option<Language>,
    pub category_id: Option<Option<i64>>,
}

impl Blog {
    pub fn apply(&mut self, changes: BlogChanges) {
        if let Some(v) = changes.title {
            self.title = v;
        }
        if let Some(v) = changes.slug {
            self.slug = v;
        }
        if let Some(v) = changes.content {
            self.content = v;
        }
        if let Some(v) = changes.short_description {
            self.short_description = v;
        }
        if let Some(v) = changes.image {
            self.image = v;
        }
        if let Some(v) = changes.state {
            self.state = v;
        }
        if let Some(v) = changes.language {
            self.language = v;
        }
        if let Some(v) = changes.category_id {
            self.category_id = v;
        }
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Default)]
pub struct BlogFilter {
    pub status: Option<ContentStatus>,
    pub author_id: Option<i64>,
    pub language: Option<Language>,
    pub search: Option<String>,
    pub limit: Option<i64>,
}
