//! Slug resolution
//!
//! Turns titles and names into URL-safe slugs and makes inserts survive
//! collisions on the unique `slug` columns.
//!
//! Uniqueness is never checked up front. The insert is attempted and, on a
//! unique violation, retried with a timestamped candidate. Two concurrent
//! requests for the same title therefore both succeed with distinct slugs.

use std::future::Future;

use chrono::Utc;

use crate::db::is_unique_violation;

/// Attempts made before giving up on a slug
pub const MAX_SLUG_ATTEMPTS: usize = 5;

const SUFFIX_LEN: usize = 5;

/// What a slug is being generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlugKind {
    Article,
    /// Blog slugs keep Devanagari letters
    Blog,
    ArticleTag,
    /// Blog tags keep Devanagari letters
    BlogTag,
    Category,
}

impl SlugKind {
    /// Prefix for the random fallback slug
    pub fn fallback_prefix(&self) -> &'static str {
        match self {
            SlugKind::Article => "article",
            SlugKind::Blog => "post",
            SlugKind::ArticleTag | SlugKind::BlogTag => "tag",
            SlugKind::Category => "category",
        }
    }

    fn allows_devanagari(&self) -> bool {
        matches!(self, SlugKind::Blog | SlugKind::BlogTag)
    }

    fn is_allowed(&self, c: char) -> bool {
        c.is_ascii_lowercase()
            || c.is_ascii_digit()
            || (self.allows_devanagari() && ('\u{0900}'..='\u{097F}').contains(&c))
    }

    /// Entity name used in the duplicate-slug message
    pub fn entity(&self) -> &'static str {
        match self {
            SlugKind::Article => "An article",
            SlugKind::Blog => "A blog post",
            SlugKind::ArticleTag | SlugKind::BlogTag => "A tag",
            SlugKind::Category => "A category",
        }
    }
}

/// Raised when every attempt hit an existing slug, or the insert failed for
/// another reason.
#[derive(Debug, thiserror::Error)]
pub enum SlugError {
    #[error("{entity} with slug already exists. Please change the title or URL slug.")]
    Duplicate { entity: &'static str, slug: String },

    #[error(transparent)]
    Insert(#[from] anyhow::Error),
}

/// Lower-case `title` and collapse every run of disallowed characters into
/// one hyphen, trimming hyphens at both ends.
///
/// Returns `<prefix>-<5 random chars>` when nothing usable is left.
pub fn slugify(title: &str, kind: SlugKind) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.to_lowercase().chars() {
        if kind.is_allowed(c) {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    if slug.is_empty() || slug == "-" {
        return format!("{}-{}", kind.fallback_prefix(), random_suffix());
    }
    slug
}

/// Pick the slug for a new record: the caller's own slug when it is
/// non-blank, otherwise one derived from `title`.
pub fn resolve_slug(requested: Option<&str>, title: &str, kind: SlugKind) -> String {
    match requested.map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => slug.to_string(),
        None => slugify(title, kind),
    }
}

/// Five lowercase base36 characters
pub fn random_suffix() -> String {
    let mut n = uuid::Uuid::new_v4().as_u128();
    let mut out = String::with_capacity(SUFFIX_LEN);
    for _ in 0..SUFFIX_LEN {
        let digit = (n % 36) as u32;
        n /= 36;
        out.push(std::char::from_digit(digit, 36).unwrap_or('0'));
    }
    out
}

/// Candidate used after `attempt` failed attempts.
///
/// The first retry appends the epoch milliseconds; later retries add a random
/// suffix too so retries within the same millisecond still differ.
fn retry_candidate(base: &str, attempt: usize) -> String {
    let millis = Utc::now().timestamp_millis();
    if attempt <= 1 {
        format!("{}-{}", base, millis)
    } else {
        format!("{}-{}-{}", base, millis, random_suffix())
    }
}

/// Run `insert` with `base` as the slug, retrying with fresh candidates while
/// it fails on a unique violation.
///
/// ```rust,ignore
/// let article = insert_with_unique_slug(SlugKind::Article, &slug, |slug| {
///     let mut input = input.clone();
///     input.slug = slug;
///     async move { repo.create(&input).await }
/// })
/// .await?;
/// ```
pub async fn insert_with_unique_slug<T, F, Fut>(
    kind: SlugKind,
    base: &str,
    mut insert: F,
) -> Result<T, SlugError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut candidate = base.to_string();
    for attempt in 1..=MAX_SLUG_ATTEMPTS {
        match insert(candidate.clone()).await {
            Ok(value) => return Ok(value),
            Err(e) if is_unique_violation(&e) => {
                tracing::debug!(slug = %candidate, attempt, "Slug already taken");
                candidate = retry_candidate(base, attempt);
            }
            Err(e) => return Err(SlugError::Insert(e)),
        }
    }

    tracing::warn!(slug = %base, "Giving up on slug after {} attempts", MAX_SLUG_ATTEMPTS);
    Err(SlugError::Duplicate {
        entity: kind.entity(),
        slug: base.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, DynDatabasePool};
    use anyhow::Context;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_slugify_ascii() {
        assert_eq!(slugify("Budget 2025 Highlights", SlugKind::Article), "budget-2025-highlights");
        assert_eq!(slugify("  --Hello,   World!--  ", SlugKind::Article), "hello-world");
        assert_eq!(slugify("C++ & Rust", SlugKind::ArticleTag), "c-rust");
    }

    #[test]
    fn test_slugify_devanagari_only_for_blogs() {
        assert_eq!(slugify("मितान समाचार", SlugKind::Blog), "मितान-समाचार");
        assert_eq!(slugify("Raipur मौसम", SlugKind::BlogTag), "raipur-मौसम");

        let article = slugify("मितान समाचार", SlugKind::Article);
        assert!(article.starts_with("article-"), "got {}", article);
    }

    #[test]
    fn test_slugify_fallback_shape() {
        let slug = slugify("!!!", SlugKind::Blog);
        assert!(slug.starts_with("post-"));
        assert_eq!(slug.len(), "post-".len() + 5);

        assert!(slugify("", SlugKind::Category).starts_with("category-"));
        assert!(slugify("???", SlugKind::ArticleTag).starts_with("tag-"));
    }

    #[test]
    fn test_resolve_slug_prefers_caller_value() {
        assert_eq!(resolve_slug(Some(" my-Slug "), "Title", SlugKind::Article), "my-Slug");
        assert_eq!(resolve_slug(Some("   "), "Some Title", SlugKind::Article), "some-title");
        assert_eq!(resolve_slug(None, "Some Title", SlugKind::Article), "some-title");
    }

    async fn slug_table() -> DynDatabasePool {
        let pool = create_test_pool().await.unwrap();
        sqlx::query("CREATE TABLE items (id INTEGER PRIMARY KEY, slug TEXT NOT NULL UNIQUE)")
            .execute(pool.sqlite().unwrap())
            .await
            .unwrap();
        pool
    }

    async fn insert_item(pool: &DynDatabasePool, slug: String) -> anyhow::Result<String> {
        sqlx::query("INSERT INTO items (slug) VALUES (?)")
            .bind(&slug)
            .execute(pool.sqlite()?)
            .await
            .context("Failed to insert item")?;
        Ok(slug)
    }

    #[tokio::test]
    async fn test_insert_retries_on_collision() {
        let pool = slug_table().await;

        let first = insert_with_unique_slug(SlugKind::Article, "budget", |s| insert_item(&pool, s))
            .await
            .unwrap();
        let second = insert_with_unique_slug(SlugKind::Article, "budget", |s| insert_item(&pool, s))
            .await
            .unwrap();

        assert_eq!(first, "budget");
        assert_ne!(first, second);
        let suffix = second.strip_prefix("budget-").unwrap();
        assert!(suffix.chars().all(|c| c.is_ascii_digit()), "got {}", second);
    }

    #[tokio::test]
    async fn test_insert_gives_up_after_max_attempts() {
        let pool = slug_table().await;
        insert_item(&pool, "taken".to_string()).await.unwrap();
        let calls = AtomicUsize::new(0);

        let result = insert_with_unique_slug(SlugKind::Article, "taken", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            // always collide
            insert_item(&pool, "taken".to_string())
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), MAX_SLUG_ATTEMPTS);
        let err = result.unwrap_err();
        assert!(matches!(err, SlugError::Duplicate { .. }));
        assert_eq!(
            err.to_string(),
            "An article with slug already exists. Please change the title or URL slug."
        );
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = insert_with_unique_slug(SlugKind::Blog, "x", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(anyhow::anyhow!("disk full")) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(SlugError::Insert(_))));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            #[test]
            fn article_slugs_use_ascii_charset(title in "\\PC{0,40}") {
                let slug = slugify(&title, SlugKind::Article);
                prop_assert!(!slug.is_empty());
                prop_assert!(!slug.starts_with('-') && !slug.ends_with('-'));
                prop_assert!(!slug.contains("--"));
                prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            }

            #[test]
            fn punctuation_only_titles_fall_back(title in "[ !?.,;:@#$%^&*()_+=-]{0,20}") {
                let slug = slugify(&title, SlugKind::Blog);
                let suffix = slug.strip_prefix("post-");
                prop_assert!(suffix.is_some());
                let suffix = suffix.unwrap_or_default();
                prop_assert_eq!(suffix.len(), 5);
                prop_assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
            }
        }
    }
}
