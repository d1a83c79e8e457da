//! Tag service
//!
//! Tags are created lazily the first time content references them
//! (connect-or-create). Articles match existing tags by slug, blogs by name.

use anyhow::Context;
use std::collections::HashSet;
use std::sync::Arc;

use crate::db::is_unique_violation;
use crate::db::repositories::TagRepository;
use crate::models::{Tag, TagTarget};
use crate::services::slug::{insert_with_unique_slug, slugify, SlugError, SlugKind};

#[derive(Debug, thiserror::Error)]
pub enum TagServiceError {
    #[error("{0}")]
    DuplicateSlug(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<SlugError> for TagServiceError {
    fn from(err: SlugError) -> Self {
        match err {
            SlugError::Duplicate { .. } => TagServiceError::DuplicateSlug(err.to_string()),
            SlugError::Insert(e) => TagServiceError::InternalError(e),
        }
    }
}

pub struct TagService {
    repo: Arc<dyn TagRepository>,
}

impl TagService {
    pub fn new(repo: Arc<dyn TagRepository>) -> Self {
        Self { repo }
    }

    fn slug_kind(target: TagTarget) -> SlugKind {
        match target {
            TagTarget::Article => SlugKind::ArticleTag,
            TagTarget::Blog => SlugKind::BlogTag,
        }
    }

    async fn find(&self, target: TagTarget, name: &str, slug: &str) -> anyhow::Result<Option<Tag>> {
        match target {
            TagTarget::Article => self.repo.get_by_slug(slug).await,
            TagTarget::Blog => self.repo.get_by_name(name).await,
        }
    }

    /// Return the tag for `name`, creating it when no match exists.
    pub async fn connect_or_create(&self, target: TagTarget, name: &str) -> Result<Tag, TagServiceError> {
        let kind = Self::slug_kind(target);
        let slug = slugify(name, kind);

        if let Some(tag) = self.find(target, name, &slug).await.context("Failed to look up tag")? {
            return Ok(tag);
        }

        match self.repo.create(name, &slug).await {
            Ok(tag) => Ok(tag),
            Err(e) if is_unique_violation(&e) => {
                // Created concurrently, or the other unique column is taken
                if let Some(tag) = self.find(target, name, &slug).await? {
                    return Ok(tag);
                }
                if let Some(tag) = self.repo.get_by_name(name).await? {
                    return Ok(tag);
                }
                let tag = insert_with_unique_slug(kind, &slug, |candidate| async move {
                    self.repo.create(name, &candidate).await
                })
                .await?;
                Ok(tag)
            }
            Err(e) => Err(e.context("Failed to create tag").into()),
        }
    }

    /// Resolve a list of tag names, skipping blanks and repeats.
    pub async fn resolve(&self, target: TagTarget, names: &[String]) -> Result<Vec<Tag>, TagServiceError> {
        let mut seen = HashSet::new();
        let mut tags = Vec::new();
        for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            if !seen.insert(name.to_lowercase()) {
                continue;
            }
            let tag = self.connect_or_create(target, name).await?;
            if !tags.iter().any(|t: &Tag| t.id == tag.id) {
                tags.push(tag);
            }
        }
        Ok(tags)
    }

    /// Replace all tags of a content item with `names`.
    pub async fn replace_for(
        &self,
        target: TagTarget,
        owner_id: i64,
        names: &[String],
    ) -> Result<Vec<Tag>, TagServiceError> {
        let tags = self.resolve(target, names).await?;
        let ids: Vec<i64> = tags.iter().map(|t| t.id).collect();
        self.repo
            .set_for(target, owner_id, &ids)
            .await
            .context("Failed to link tags")?;
        Ok(tags)
    }

    pub async fn get_for(&self, target: TagTarget, owner_id: i64) -> Result<Vec<Tag>, TagServiceError> {
        Ok(self
            .repo
            .get_for(target, owner_id)
            .await
            .context("Failed to load tags")?)
    }

    pub async fn get_for_many(
        &self,
        target: TagTarget,
        owner_ids: &[i64],
    ) -> Result<std::collections::HashMap<i64, Vec<Tag>>, TagServiceError> {
        Ok(self
            .repo
            .get_for_many(target, owner_ids)
            .await
            .context("Failed to load tags")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxTagRepository;
    use crate::db::{create_test_pool, migrations};

    async fn setup_service() -> TagService {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        TagService::new(SqlxTagRepository::boxed(pool))
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_article_tags_reuse_by_slug() {
        let service = setup_service().await;
        let first = service.connect_or_create(TagTarget::Article, "Union Budget").await.unwrap();
        assert_eq!(first.slug, "union-budget");

        let again = service.connect_or_create(TagTarget::Article, "union budget!").await.unwrap();
        assert_eq!(again.id, first.id);
    }

    #[tokio::test]
    async fn test_blog_tags_match_by_name_and_keep_devanagari() {
        let service = setup_service().await;
        let tag = service.connect_or_create(TagTarget::Blog, "छत्तीसगढ़").await.unwrap();
        assert_eq!(tag.slug, "छत्तीसगढ़");

        let again = service.connect_or_create(TagTarget::Blog, "छत्तीसगढ़").await.unwrap();
        assert_eq!(again.id, tag.id);
    }

    #[tokio::test]
    async fn test_blog_tag_slug_collision_gets_new_slug() {
        let service = setup_service().await;
        let article_tag = service.connect_or_create(TagTarget::Article, "AI").await.unwrap();
        // different name, same slug
        let blog_tag = service.connect_or_create(TagTarget::Blog, "ai").await.unwrap();

        assert_ne!(article_tag.id, blog_tag.id);
        assert!(blog_tag.slug.starts_with("ai-"));
    }

    #[tokio::test]
    async fn test_non_ascii_article_tag_falls_back() {
        let service = setup_service().await;
        let tag = service.connect_or_create(TagTarget::Article, "राजनीति").await.unwrap();
        assert!(tag.slug.starts_with("tag-"));
        assert_eq!(tag.name, "राजनीति");
    }

    #[tokio::test]
    async fn test_resolve_skips_blanks_and_repeats() {
        let service = setup_service().await;
        let tags = service
            .resolve(TagTarget::Article, &names(&["Rust", " ", "rust", "Axum"]))
            .await
            .unwrap();
        let slugs: Vec<_> = tags.iter().map(|t| t.slug.as_str()).collect();
        assert_eq!(slugs, vec!["rust", "axum"]);
    }
}
