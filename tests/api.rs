//! Router-level tests: requests go through the full axum stack against an
//! in-memory SQLite database, with uploads captured by a recording store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::util::ServiceExt;

use mitaan::api::{build_router, AppState};
use mitaan::config::Config;
use mitaan::db::{create_test_pool, migrations};
use mitaan::services::storage::ObjectStore;

const ADMIN_EMAIL: &str = "editor@mitaan.in";
const ADMIN_PASSWORD: &str = "chhattisgarh-2025";

#[derive(Default)]
struct RecordingStore {
    keys: Mutex<Vec<String>>,
}

impl RecordingStore {
    fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn put(&self, key: &str, _body: Vec<u8>, _content_type: &str) -> anyhow::Result<String> {
        self.keys.lock().unwrap().push(key.to_string());
        Ok(format!("https://cdn.test/{}", key))
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

struct TestApp {
    router: Router,
    store: Arc<RecordingStore>,
    token: String,
    _uploads: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let uploads = TempDir::new().unwrap();
        let mut config = Config::default();
        config.upload.path = uploads.path().to_path_buf();
        config.admin.email = Some(ADMIN_EMAIL.to_string());
        config.admin.password = Some(ADMIN_PASSWORD.to_string());

        let store = Arc::new(RecordingStore::default());
        let state = AppState::build(pool, &config, Some(store.clone() as Arc<dyn ObjectStore>))
            .await
            .expect("Failed to build state");
        state
            .user_service
            .bootstrap_admin(&config.admin)
            .await
            .expect("Failed to bootstrap admin");

        let mut app = Self {
            router: build_router(state, &config),
            store,
            token: String::new(),
            _uploads: uploads,
        };
        let (status, body) = app
            .request(
                Method::POST,
                "/api/auth/login",
                false,
                Some(json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        app.token = body["token"].as_str().unwrap().to_string();
        app
    }

    async fn request(
        &self,
        method: Method,
        uri: &str,
        auth: bool,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if auth {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", self.token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn create_category(&self, body: Value) -> i64 {
        let (status, category) = self
            .request(Method::POST, "/api/categories", true, Some(body))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", category);
        category["id"].as_i64().unwrap()
    }
}

#[tokio::test]
async fn test_publish_article_on_create() {
    let app = TestApp::new().await;
    let category_id = app.create_category(json!({ "name": "Business" })).await;

    let (status, article) = app
        .request(
            Method::POST,
            "/api/articles",
            true,
            Some(json!({
                "title": "Budget 2025 Highlights",
                "content": "<p>Key numbers</p>",
                "categoryId": category_id,
                "status": "PUBLISHED",
                "tags": ["Economy"]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", article);
    assert_eq!(article["slug"], "budget-2025-highlights");
    assert_eq!(article["published"], true);
    assert_eq!(article["status"], "PUBLISHED");
    assert!(article["publishedAt"].is_string());
    assert_eq!(article["category"]["slug"], "business");
    assert_eq!(article["tags"][0]["name"], "Economy");

    let (status, found) = app
        .request(Method::GET, "/api/articles/budget-2025-highlights", false, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["id"], article["id"]);

    let (status, by_id) = app
        .request(Method::GET, &format!("/api/articles/{}", article["id"]), false, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_id["slug"], "budget-2025-highlights");
}

#[tokio::test]
async fn test_duplicate_titles_get_distinct_slugs() {
    let app = TestApp::new().await;
    let category_id = app.create_category(json!({ "name": "Business" })).await;

    let mut slugs = Vec::new();
    for _ in 0..2 {
        let (status, article) = app
            .request(
                Method::POST,
                "/api/articles",
                true,
                Some(json!({ "title": "Budget 2025 Highlights", "categoryId": category_id })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", article);
        slugs.push(article["slug"].as_str().unwrap().to_string());
    }

    assert_ne!(slugs[0], slugs[1]);
    assert!(slugs[1].starts_with("budget-2025-highlights"));
}

#[tokio::test]
async fn test_article_requires_valid_category() {
    let app = TestApp::new().await;
    let (status, body) = app
        .request(
            Method::POST,
            "/api/articles",
            true,
            Some(json!({ "title": "Orphan", "categoryId": 999 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Please select a valid category.");
}

#[tokio::test]
async fn test_non_numeric_category_is_a_validation_error() {
    let app = TestApp::new().await;
    let (status, body) = app
        .request(
            Method::POST,
            "/api/articles",
            true,
            Some(json!({ "title": "Budget", "categoryId": "abc" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["message"], "Please select a valid category.");
}

#[tokio::test]
async fn test_article_update_toggle_and_delete_by_id() {
    let app = TestApp::new().await;
    let category_id = app.create_category(json!({ "name": "Politics" })).await;
    let (status, article) = app
        .request(
            Method::POST,
            "/api/articles",
            true,
            Some(json!({ "title": "Assembly session", "categoryId": category_id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", article);
    let uri = format!("/api/articles/{}", article["id"]);

    let (status, updated) = app
        .request(Method::PUT, &uri, true, Some(json!({ "isBreaking": true })))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", updated);
    assert_eq!(updated["isBreaking"], true);
    assert_eq!(updated["title"], "Assembly session");

    let (status, toggled) = app
        .request(Method::PATCH, &format!("{}/toggle", uri), true, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(toggled["published"], true);

    let (status, body) = app
        .request(Method::PUT, "/api/articles/assembly-session", true, Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = app.request(Method::DELETE, &uri, true, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Article deleted");

    let (status, _) = app.request(Method::GET, &uri, false, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_blog_keeps_devanagari_slug() {
    let app = TestApp::new().await;
    let (status, blog) = app
        .request(
            Method::POST,
            "/api/blogs",
            true,
            Some(json!({ "title": "मेरा गाँव", "language": "hi", "tags": ["यादें"] })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", blog);
    assert_eq!(blog["slug"], "मेरा-गाँव");
    assert_eq!(blog["language"], "hi");
    assert!(blog["category"].is_null());

    let (status, list) = app.request(Method::GET, "/api/blogs?lang=hi", false, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, body) = app
        .request(Method::DELETE, &format!("/api/blogs/{}", blog["id"]), true, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Blog deleted");
}

#[tokio::test]
async fn test_short_search_returns_empty_groups() {
    let app = TestApp::new().await;
    app.create_category(json!({ "name": "Business" })).await;

    let (status, body) = app.request(Method::GET, "/api/search?q=b", false, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "articles": [], "blogs": [], "categories": [] }));

    let (status, body) = app
        .request(Method::GET, "/api/search?q=busi&limit=500", false, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["categories"][0]["slug"], "business");
}

#[tokio::test]
async fn test_wildcard_search_terms_match_literally() {
    let app = TestApp::new().await;
    let category_id = app.create_category(json!({ "name": "Business" })).await;
    let (status, _) = app
        .request(
            Method::POST,
            "/api/articles",
            true,
            Some(json!({ "title": "Budget 2025", "categoryId": category_id, "status": "PUBLISHED" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.request(Method::GET, "/api/search?q=%25%25", false, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "articles": [], "blogs": [], "categories": [] }));

    let (_, body) = app.request(Method::GET, "/api/search?q=__", false, None).await;
    assert_eq!(body, json!({ "articles": [], "blogs": [], "categories": [] }));

    let (status, list) = app.request(Method::GET, "/api/articles?search=%25", false, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list, json!([]));

    let (_, list) = app.request(Method::GET, "/api/articles?search=budget", false, None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_category_delete_is_guarded() {
    let app = TestApp::new().await;
    let parent = app.create_category(json!({ "name": "Sports" })).await;
    let child = app
        .create_category(json!({ "name": "Cricket", "parentId": parent }))
        .await;

    let (status, body) = app
        .request(Method::DELETE, &format!("/api/categories/{}", parent), true, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"]["message"],
        "Cannot delete category with sub-categories. Delete children first."
    );

    let (status, _) = app
        .request(
            Method::POST,
            "/api/articles",
            true,
            Some(json!({ "title": "Final over thriller", "categoryId": child })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .request(Method::DELETE, &format!("/api/categories/{}", child), true, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"]["message"],
        "Cannot delete category that has articles. Move articles first."
    );

    let (status, list) = app.request(Method::GET, "/api/categories", false, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_media_toggle_only_flips_publish_flag() {
    let app = TestApp::new().await;
    let (status, media) = app
        .request(
            Method::POST,
            "/api/media",
            true,
            Some(json!({ "type": "IMAGE", "title": "Holi in Raipur", "url": "https://cdn.test/holi.jpg" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", media);
    assert_eq!(media["isPublished"], true);
    assert_eq!(media["category"], "GALLERY");

    let (status, body) = app
        .request(Method::PATCH, &format!("/api/media/{}/toggle", media["id"]), true, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "isPublished": false }));

    let (_, public) = app.request(Method::GET, "/api/media", false, None).await;
    assert_eq!(public["media"].as_array().unwrap().len(), 0);
    assert_eq!(public["pagination"]["total"], 0);

    let (status, admin) = app.request(Method::GET, "/api/media/admin", true, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(admin["media"][0]["title"], "Holi in Raipur");
    assert_eq!(admin["media"][0]["url"], "https://cdn.test/holi.jpg");
    assert_eq!(admin["pagination"]["limit"], 20);
}

#[tokio::test]
async fn test_media_requires_type_title_and_payload() {
    let app = TestApp::new().await;
    let (status, body) = app
        .request(Method::POST, "/api/media", true, Some(json!({ "title": "No type" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Type, title, and URL/File are required");
}

#[tokio::test]
async fn test_oversized_base64_upload_is_rejected() {
    let app = TestApp::new().await;
    let (status, _) = app
        .request(
            Method::PUT,
            "/api/settings",
            true,
            Some(json!({ "max_image_upload_size": "0.001" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let payload = "A".repeat(4000);
    let (status, body) = app
        .request(
            Method::POST,
            "/api/media",
            true,
            Some(json!({
                "type": "IMAGE",
                "title": "Too big",
                "url": format!("data:image/png;base64,{}", payload)
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE_LIMIT");
    assert!(app.store.keys().is_empty());
}

#[tokio::test]
async fn test_multipart_upload_goes_to_object_store() {
    let app = TestApp::new().await;
    let boundary = "mitaan-boundary";
    let mut body = Vec::new();
    for (name, value) in [("type", "IMAGE"), ("title", "Bastar Dussehra")] {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                boundary, name, value
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"dussehra.png\"\r\nContent-Type: image/png\r\n\r\n",
            boundary
        )
        .as_bytes(),
    );
    body.extend_from_slice(&[0x89, b'P', b'N', b'G', 0, 1, 2, 3]);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/media")
        .header(header::AUTHORIZATION, format!("Bearer {}", app.token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap();
    let (status, media) = app.send(request).await;
    assert_eq!(status, StatusCode::CREATED, "{}", media);

    let keys = app.store.keys();
    assert_eq!(keys.len(), 1);
    assert!(keys[0].starts_with("media-"));
    assert!(keys[0].ends_with(".png"));
    assert_eq!(media["url"], format!("https://cdn.test/{}", keys[0]));
    assert_eq!(media["size"], "0 KB");
}

#[tokio::test]
async fn test_write_routes_require_token() {
    let app = TestApp::new().await;
    let (status, body) = app
        .request(Method::POST, "/api/articles", false, Some(json!({ "title": "x" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/api/categories/1")
        .header(header::AUTHORIZATION, "Bearer not-a-session")
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_me_logout() {
    let app = TestApp::new().await;
    let (status, me) = app.request(Method::GET, "/api/auth/me", true, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], ADMIN_EMAIL);
    assert!(me.get("passwordHash").is_none());

    let (status, _) = app.request(Method::POST, "/api/auth/logout", true, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.request(Method::GET, "/api/auth/me", true, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .request(
            Method::POST,
            "/api/auth/login",
            false,
            Some(json!({ "email": ADMIN_EMAIL, "password": "wrong password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Invalid email or password");
}

#[tokio::test]
async fn test_settings_are_public_to_read() {
    let app = TestApp::new().await;
    let (status, _) = app
        .request(Method::PUT, "/api/settings", true, Some(json!({ "site_name": "Mitaan Express" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, settings) = app.request(Method::GET, "/api/settings", false, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settings["site_name"], "Mitaan Express");

    let (status, _) = app
        .request(Method::PUT, "/api/settings", false, Some(json!({ "site_name": "x" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
