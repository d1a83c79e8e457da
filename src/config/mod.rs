//! Configuration management
//!
//! Configuration is loaded from `config.yml` and then overridden by environment
//! variables. Missing optional values are filled with sensible defaults, so an
//! absent or empty file yields a runnable development setup (SQLite, local uploads).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    /// Durable object storage (Cloudflare R2)
    #[serde(default)]
    pub storage: StorageConfig,
    /// Bootstrap administrator created on first start
    #[serde(default)]
    pub admin: AdminConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin for the admin dashboard
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_cors_origin() -> String {
    "http://localhost:5173".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub driver: DatabaseDriver,
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/mitaan.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default, single-file deployments and tests)
    #[default]
    Sqlite,
    /// PostgreSQL
    Postgres,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Maximum number of cached entries
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_ttl() -> u64 {
    600
}

fn default_max_entries() -> u64 {
    10_000
}

/// Local upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Directory multipart uploads are written to and served from under `/uploads`
    #[serde(default = "default_upload_path")]
    pub path: PathBuf,
    /// Public base of this API, used to build fallback `/uploads/<file>` URLs
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// Hard cap on request bodies, in bytes. Per-class limits live in settings.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            path: default_upload_path(),
            api_base_url: None,
            max_body_size: default_max_body_size(),
        }
    }
}

fn default_upload_path() -> PathBuf {
    PathBuf::from("public/uploads")
}

fn default_max_body_size() -> usize {
    512 * 1024 * 1024
}

const DEFAULT_API_BASE: &str = "http://localhost:3000";

impl UploadConfig {
    /// Base URL used when a file is served from local disk
    pub fn api_base(&self) -> &str {
        self.api_base_url
            .as_deref()
            .map(|s| s.trim_end_matches('/'))
            .unwrap_or(DEFAULT_API_BASE)
    }

    /// Public URL of a file stored in the local uploads directory
    pub fn local_url(&self, file_name: &str) -> String {
        format!("{}/uploads/{}", self.api_base(), file_name)
    }
}

/// Cloudflare R2 object storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub bucket_name: Option<String>,
    /// Custom public base URL (e.g. a custom domain bound to the bucket)
    #[serde(default)]
    pub public_url: Option<String>,
}

impl StorageConfig {
    /// Durable storage is used only when all four credentials are present.
    pub fn is_configured(&self) -> bool {
        [
            &self.account_id,
            &self.access_key_id,
            &self.secret_access_key,
            &self.bucket_name,
        ]
        .iter()
        .all(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }

    /// Base URL objects are publicly served from
    pub fn public_base(&self) -> Option<String> {
        if let Some(url) = self.public_url.as_deref().filter(|s| !s.is_empty()) {
            return Some(url.trim_end_matches('/').to_string());
        }
        self.bucket_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|bucket| format!("https://pub-{}.r2.dev", bucket))
    }

    /// S3-compatible endpoint for the account
    pub fn endpoint(&self) -> Option<String> {
        self.account_id
            .as_deref()
            .map(|id| format!("https://{}.r2.cloudflarestorage.com", id))
    }
}

/// Bootstrap administrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_name")]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            name: default_admin_name(),
            email: None,
            password: None,
        }
    }
}

fn default_admin_name() -> String {
    "Administrator".to_string()
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file.
    ///
    /// A missing or empty file yields the default configuration. Invalid YAML is
    /// reported with its location.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file, then apply environment overrides.
    ///
    /// Recognised variables:
    /// - `MITAAN_SERVER_HOST`, `MITAAN_SERVER_PORT` (or `PORT`), `MITAAN_SERVER_CORS_ORIGIN`
    /// - `MITAAN_DATABASE_DRIVER`, `MITAAN_DATABASE_URL` (or `DATABASE_URL`)
    /// - `MITAAN_CACHE_TTL_SECONDS`
    /// - `MITAAN_UPLOAD_PATH`, `API_URL`
    /// - `R2_ACCOUNT_ID`, `R2_ACCESS_KEY_ID`, `R2_SECRET_ACCESS_KEY`, `R2_BUCKET_NAME`, `R2_ACCOUNT_URL`
    /// - `MITAAN_ADMIN_NAME`, `MITAAN_ADMIN_EMAIL`, `MITAAN_ADMIN_PASSWORD`
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port must be greater than 0".to_string(),
            ));
        }
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database.url must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("MITAAN_SERVER_HOST") {
            self.server.host = host;
        }
        let port = std::env::var("MITAAN_SERVER_PORT").or_else(|_| std::env::var("PORT"));
        if let Ok(port) = port {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(origin) = std::env::var("MITAAN_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = origin;
        }

        if let Ok(driver) = std::env::var("MITAAN_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "postgres" | "postgresql" => self.database.driver = DatabaseDriver::Postgres,
                _ => {}
            }
        }
        let url = std::env::var("MITAAN_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL"));
        if let Ok(url) = url {
            if url.starts_with("postgres://") || url.starts_with("postgresql://") {
                self.database.driver = DatabaseDriver::Postgres;
            }
            self.database.url = url;
        }

        if let Ok(ttl) = std::env::var("MITAAN_CACHE_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse::<u64>() {
                self.cache.ttl_seconds = ttl;
            }
        }

        if let Ok(path) = std::env::var("MITAAN_UPLOAD_PATH") {
            self.upload.path = PathBuf::from(path);
        }
        if let Ok(api_url) = std::env::var("API_URL") {
            self.upload.api_base_url = Some(api_url);
        }

        let env_opt = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        if let Some(v) = env_opt("R2_ACCOUNT_ID") {
            self.storage.account_id = Some(v);
        }
        if let Some(v) = env_opt("R2_ACCESS_KEY_ID") {
            self.storage.access_key_id = Some(v);
        }
        if let Some(v) = env_opt("R2_SECRET_ACCESS_KEY") {
            self.storage.secret_access_key = Some(v);
        }
        if let Some(v) = env_opt("R2_BUCKET_NAME") {
            self.storage.bucket_name = Some(v);
        }
        if let Some(v) = env_opt("R2_ACCOUNT_URL") {
            self.storage.public_url = Some(v);
        }

        if let Some(v) = env_opt("MITAAN_ADMIN_NAME") {
            self.admin.name = v;
        }
        if let Some(v) = env_opt("MITAAN_ADMIN_EMAIL") {
            self.admin.email = Some(v);
        }
        if let Some(v) = env_opt("MITAAN_ADMIN_PASSWORD") {
            self.admin.password = Some(v);
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test that touches process environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
