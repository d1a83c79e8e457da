//! Data models
//!
//! Database entities for the newsroom (articles, blogs, categories, tags,
//! media, users, sessions) and the value types shared between layers.

mod article;
mod blog;
mod category;
mod content;
mod media;
mod pagination;
mod session;
mod tag;
mod user;

pub use article::{Article, ArticleChanges, ArticleFilter, NewArticle, DEFAULT_PRIORITY};
pub use blog::{Blog, BlogChanges, BlogFilter, NewBlog};
pub use category::{Category, CategoryChanges, CategorySummary, CategoryWithParent, NewCategory};
pub use content::{ContentStatus, Language, PublishState, ReadContext, StatusChange};
pub use media::{
    Media, MediaChanges, MediaFilter, MediaType, NewMedia, GALLERY_CATEGORY, SYSTEM_CATEGORY,
};
pub use pagination::{ListParams, PagedResult, Pagination};
pub use session::{Session, SESSION_DAYS};
pub use tag::{Tag, TagTarget};
pub use user::{AuthorSummary, User, UserRole};
