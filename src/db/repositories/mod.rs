//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the persistence of one entity.

pub mod article;
pub mod blog;
pub mod category;
pub mod media;
pub mod session;
pub mod settings;
pub mod tag;
pub mod user;

pub use article::{ArticleRepository, SqlxArticleRepository};
pub use blog::{BlogRepository, SqlxBlogRepository};
pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use media::{MediaRepository, SqlxMediaRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use settings::{Setting, SettingsRepository, SqlxSettingsRepository};
pub use tag::{SqlxTagRepository, TagRepository};
pub use user::{SqlxUserRepository, UserRepository};

/// `%term%` for a `LIKE ... ESCAPE '\'` clause, with the term's own `\`, `%`
/// and `_` matched literally.
pub(crate) fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("budget"), "%budget%");
        assert_eq!(contains_pattern("%%"), "%\\%\\%%");
        assert_eq!(contains_pattern("__"), "%\\_\\_%");
        assert_eq!(contains_pattern("a\\b"), "%a\\\\b%");
        assert_eq!(contains_pattern("मेरा"), "%मेरा%");
    }
}
