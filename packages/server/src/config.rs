use std::path::PathBuf;
use std::time::Duration;

use common::retry::RetryPolicy;
#[cfg(feature = "object-storage")]
use common::storage::s3::S3Config;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub max_age: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors: CorsConfig,
    /// Prefix under which stored objects are served, e.g. `/files` or
    /// `https://cdn.example.org/files`. Asset URLs embedded in content
    /// bodies must start with it.
    pub public_base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Filesystem,
    #[cfg(feature = "object-storage")]
    S3,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root directory of the filesystem backend.
    pub root: PathBuf,
    #[cfg(feature = "object-storage")]
    #[serde(default)]
    pub s3: Option<S3Config>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    /// Maximum size of a single file in bytes. Default: 10 MiB.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Accepted MIME types. Entries ending in `/*` match a whole family.
    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,
    /// Maximum number of files in one upload request. Default: 10.
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}
fn default_allowed_mime_types() -> Vec<String> {
    vec![
        "image/*".into(),
        "application/pdf".into(),
        "application/zip".into(),
        "text/plain".into(),
    ]
}
fn default_max_files() -> usize {
    10
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            allowed_mime_types: default_allowed_mime_types(),
            max_files: default_max_files(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LifecycleConfig {
    /// Assets processed concurrently within one transition. Default: 4.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Retries for transient store failures. Default: 2.
    #[serde(default = "default_store_retries")]
    pub store_retries: u8,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
}

fn default_max_concurrency() -> usize {
    4
}
fn default_store_retries() -> u8 {
    2
}
fn default_retry_base_ms() -> u64 {
    100
}
fn default_retry_max_ms() -> u64 {
    2_000
}

impl LifecycleConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.store_retries,
            base_ms: self.retry_base_ms,
            max_ms: self.retry_max_ms,
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            store_retries: default_store_retries(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SweeperConfig {
    /// Whether the periodic sweep runs. Default: true.
    #[serde(default = "default_sweeper_enabled")]
    pub enabled: bool,
    /// Seconds between sweeps. Default: 3600.
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,
    /// Staged assets untouched for longer than this are deleted. Default: 86400.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

fn default_sweeper_enabled() -> bool {
    true
}
fn default_sweep_interval_secs() -> u64 {
    3600
}
fn default_retention_secs() -> u64 {
    86_400
}

impl SweeperConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: default_sweeper_enabled(),
            interval_secs: default_sweep_interval_secs(),
            retention_secs: default_retention_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("ASSETS_CONFIG").unwrap_or_else(|_| "config/config".to_string());

        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.cors.allow_origins", Vec::<String>::new())?
            .set_default("server.cors.max_age", 3600)?
            .set_default("server.public_base_url", "/files")?
            .set_default("storage.backend", "filesystem")?
            .set_default("storage.root", "./data/objects")?
            // Load from config/config.toml
            .add_source(File::with_name(&config_path).required(false))
            // Override from environment (e.g., ASSETS__AUTH__JWT_SECRET)
            .add_source(
                Environment::with_prefix("ASSETS")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.cors.allow_origins")
                    .with_list_parse_key("upload.allowed_mime_types")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }
}
