//! Mitaan Express - a bilingual news and blogging CMS backend
//!
//! Articles, blog posts, categories and a media library served over a JSON
//! API, with uploads going to object storage or the local disk.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
