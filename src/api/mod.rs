//! API layer - HTTP handlers and routing
//!
//! Every endpoint lives under `/api`:
//! - articles and blogs
//! - categories
//! - media library
//! - global search
//! - site settings
//! - staff authentication
//!
//! Uploaded files are served from `/uploads`.

pub mod articles;
pub mod auth;
pub mod blogs;
pub mod categories;
pub mod common;
pub mod media;
pub mod middleware;
pub mod search;
pub mod settings;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::config::Config;

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Build the `/api` router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/articles", articles::router(state.clone()))
        .nest("/blogs", blogs::router(state.clone()))
        .nest("/categories", categories::router(state.clone()))
        .nest("/media", media::router(state.clone()))
        .nest("/search", search::router())
        .nest("/settings", settings::router(state.clone()))
        .nest("/auth", auth::router(state))
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, config: &Config) -> Router {
    let uploads = ServeDir::new(state.pipeline.local().dir());

    Router::new()
        .nest("/api", build_api_router(state.clone()))
        .nest_service("/uploads", uploads)
        .layer(DefaultBodyLimit::max(config.upload.max_body_size))
        .layer(cors_layer(&config.server.cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `*` allows any origin; anything else must be a single valid origin.
fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if origin.trim() == "*" {
        return layer.allow_origin(Any);
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => layer.allow_origin(value),
        Err(_) => {
            tracing::warn!(origin, "Invalid CORS origin, allowing any origin");
            layer.allow_origin(Any)
        }
    }
}
