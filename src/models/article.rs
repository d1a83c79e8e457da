//! Article model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::content::{ContentStatus, Language, PublishState};

/// Default editorial priority
pub const DEFAULT_PRIORITY: &str = "NORMAL";

/// A news article.
#[derive(Debug, Clone)]
pub struct Article {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub content: String,
    pub short_description: Option<String>,
    pub image: Option<String>,
    pub video_url: Option<String>,
    pub views: i64,
    pub state: PublishState,
    pub language: Language,
    pub is_featured: bool,
    pub is_trending: bool,
    pub is_breaking: bool,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
    pub metadata: serde_json::Value,
    pub priority: String,
    pub category_id: i64,
    pub author_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a new article row. The slug is filled in by the slug resolver.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub slug: String,
    pub title: String,
    pub content: String,
    pub short_description: Option<String>,
    pub image: Option<String>,
    pub video_url: Option<String>,
    pub state: PublishState,
    pub language: Language,
    pub is_featured: bool,
    pub is_trending: bool,
    pub is_breaking: bool,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
    pub metadata: serde_json::Value,
    pub priority: String,
    pub category_id: i64,
    pub author_id: i64,
}

/// Partial update. `None` leaves a field untouched; `Some(None)` clears a nullable one.
#[derive(Debug, Clone, Default)]
pub struct ArticleChanges {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub short_description: Option<Option<String>>,
    pub image: Option<Option<String>>,
    pub video_url: Option<Option<String>>,
    pub state: Option<PublishState>,
    pub language: Option<Language>,
    pub is_featured: Option<bool>,
    pub is_trending: Option<bool>,
    pub is_breaking: Option<bool>,
    pub meta_title: Option<Option<String>>,
    pub meta_description: Option<Option<String>>,
    pub meta_keywords: Option<Option<String>>,
    pub metadata: Option<serde_json::Value>,
    pub priority: Option<String>,
    pub category_id: Option<i64>,
}

impl Article {
    /// Apply a partial update in place.
    pub fn apply(&mut self, changes: ArticleChanges) {
        macro_rules! set {
            ($($field:ident),*) => {
                $(if let Some(v) = changes.$field { self.$field = v; })*
            };
        }
        set!(
            title,
            slug,
            content,
            short_description,
            image,
            video_url,
            state,
            language,
            is_featured,
            is_trending,
            is_breaking,
            meta_title,
            meta_description,
            meta_keywords,
            metadata,
            priority,
            category_id
        );
        self.updated_at = Utc::now();
    }
}

/// Filters for listing articles
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ArticleFilter {
    pub category_slug: Option<String>,
    pub tag_slug: Option<String>,
    pub status: Option<ContentStatus>,
    pub author_id: Option<i64>,
    pub language: Option<Language>,
    /// Case-insensitive substring match over title and content
    pub search: Option<String>,
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Article {
        let now = Utc::now();
        Article {
            id: 1,
            slug: "budget".into(),
            title: "Budget".into(),
            content: "<p>body</p>".into(),
            short_description: Some("short".into()),
            image: Some("https://cdn/x.jpg".into()),
            video_url: None,
            views: 3,
            state: PublishState::default(),
            language: Language::En,
            is_featured: false,
            is_trending: false,
            is_breaking: false,
            meta_title: None,
            meta_description: None,
            meta_keywords: None,
            metadata: serde_json::json!({}),
            priority: DEFAULT_PRIORITY.into(),
            category_id: 3,
            author_id: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_apply_only_touches_supplied_fields() {
        let mut article = sample();
        article.apply(ArticleChanges {
            title: Some("Budget 2025".into()),
            image: Some(None),
            is_breaking: Some(true),
            ..Default::default()
        });

        assert_eq!(article.title, "Budget 2025");
        assert_eq!(article.image, None);
        assert!(article.is_breaking);
        assert_eq!(article.short_description.as_deref(), Some("short"));
        assert_eq!(article.category_id, 3);
        assert_eq!(article.views, 3);
    }
}
