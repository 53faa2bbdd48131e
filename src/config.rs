//! Configuration loading and types for ricebox.
//!
//! Configuration is read from an optional YAML file and deserialized into
//! the [`Config`] struct, then overlaid with the recognized environment
//! variables (see [`ENV_NAMES`]).  Each subsection governs a different part
//! of the system: networking, object storage and its credential sources, the
//! image proxy, logging, and observability.

use serde::Deserialize;
use std::path::Path;

/// Environment variable carrying the storage project id (credential source 1).
pub const ENV_PROJECT_ID: &str = "FIREBASE_PROJECT_ID";
/// Environment variable carrying the service-account client email (source 1).
pub const ENV_CLIENT_EMAIL: &str = "FIREBASE_CLIENT_EMAIL";
/// Environment variable carrying the PEM private key (source 1).
pub const ENV_PRIVATE_KEY: &str = "FIREBASE_PRIVATE_KEY";
/// Environment variable carrying a base64-encoded service-account JSON (source 2).
pub const ENV_SERVICE_ACCOUNT_BASE64: &str = "FIREBASE_SERVICE_ACCOUNT_BASE64";
/// Environment variable carrying a raw service-account JSON string (source 3).
pub const ENV_SERVICE_ACCOUNT_JSON: &str = "FIREBASE_SERVICE_ACCOUNT_JSON";
/// Environment variable naming a service-account key file (source 4).
pub const ENV_CREDENTIALS_FILE: &str = "FIREBASE_CREDENTIALS_FILE";
/// Environment variable overriding the derived bucket name.
pub const ENV_STORAGE_BUCKET: &str = "FIREBASE_STORAGE_BUCKET";
/// Environment variable capping the image proxy output width.
pub const ENV_IMG_MAX_WIDTH: &str = "IMG_MAX_WIDTH";
/// Environment variable setting the image proxy default quality.
pub const ENV_IMG_DEFAULT_QUALITY: &str = "IMG_DEFAULT_QUALITY";
/// Environment variable overriding the listen port.
pub const ENV_PORT: &str = "PORT";
/// Environment variable setting the absolute base URL used in upload responses.
pub const ENV_PUBLIC_BASE_URL: &str = "PUBLIC_BASE_URL";

/// Every environment variable the loader recognizes.
pub const ENV_NAMES: &[&str] = &[
    ENV_PROJECT_ID,
    ENV_CLIENT_EMAIL,
    ENV_PRIVATE_KEY,
    ENV_SERVICE_ACCOUNT_BASE64,
    ENV_SERVICE_ACCOUNT_JSON,
    ENV_CREDENTIALS_FILE,
    ENV_STORAGE_BUCKET,
    ENV_IMG_MAX_WIDTH,
    ENV_IMG_DEFAULT_QUALITY,
    ENV_PORT,
    ENV_PUBLIC_BASE_URL,
];

/// Lowest quality the image proxy will encode with.
pub const MIN_IMAGE_QUALITY: u8 = 30;
/// Highest quality the image proxy will encode with.
pub const MAX_IMAGE_QUALITY: u8 = 95;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Object storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Image transform proxy settings.
    #[serde(default)]
    pub images: ImageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Absolute base URL prepended to `/uploads/...` paths in upload responses.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Maximum accepted upload body in bytes (default 20 MiB).
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_base_url: default_public_base_url(),
            max_upload_bytes: default_max_upload_bytes(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Object storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend type: `gcs` or `memory`.
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Explicit bucket name. Empty means "derive from the project id".
    #[serde(default)]
    pub bucket: String,

    /// Credential sources, tried in a fixed order.
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Google Cloud Storage endpoints.
    #[serde(default)]
    pub gcs: GcsConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            bucket: String::new(),
            credentials: CredentialsConfig::default(),
            gcs: GcsConfig::default(),
        }
    }
}

/// Every place credentials may come from. Empty strings mean "not set".
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    /// Project id (source 1).
    #[serde(default)]
    pub project_id: String,

    /// Service-account email (source 1).
    #[serde(default)]
    pub client_email: String,

    /// PEM private key, possibly quoted and with escaped newlines (source 1).
    #[serde(default)]
    pub private_key: String,

    /// Base64-encoded service-account JSON (source 2).
    #[serde(default)]
    pub service_account_base64: String,

    /// Raw service-account JSON (source 3).
    #[serde(default)]
    pub service_account_json: String,

    /// Path to a service-account key file (source 4).
    #[serde(default = "default_credentials_file")]
    pub credentials_file: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            client_email: String::new(),
            private_key: String::new(),
            service_account_base64: String::new(),
            service_account_json: String::new(),
            credentials_file: default_credentials_file(),
        }
    }
}

/// Google Cloud Storage endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GcsConfig {
    /// JSON API base URL.
    #[serde(default = "default_gcs_api_base")]
    pub api_base: String,

    /// Media upload base URL.
    #[serde(default = "default_gcs_upload_base")]
    pub upload_base: String,
}

impl Default for GcsConfig {
    fn default() -> Self {
        Self {
            api_base: default_gcs_api_base(),
            upload_base: default_gcs_upload_base(),
        }
    }
}

/// Image transform proxy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageConfig {
    /// Ceiling for the `w` query parameter.
    #[serde(default = "default_max_width")]
    pub max_width: u32,

    /// Quality used when `q` is absent or unparseable.
    #[serde(default = "default_quality")]
    pub default_quality: u8,

    /// Largest source object the proxy will decode.
    #[serde(default = "default_max_source_bytes")]
    pub max_source_bytes: usize,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_width: default_max_width(),
            default_quality: default_quality(),
            max_source_bytes: default_max_source_bytes(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_public_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_storage_backend() -> String {
    "gcs".to_string()
}

fn default_credentials_file() -> String {
    "./serviceAccountKey.json".to_string()
}

fn default_gcs_api_base() -> String {
    "https://storage.googleapis.com".to_string()
}

fn default_gcs_upload_base() -> String {
    "https://storage.googleapis.com/upload".to_string()
}

fn default_max_width() -> u32 {
    2560
}

fn default_quality() -> u8 {
    70
}

fn default_max_source_bytes() -> usize {
    25 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

impl Config {
    /// Overlay recognized environment variables onto this config.
    ///
    /// `lookup` is usually `|name| std::env::var(name).ok()`; tests pass a
    /// map instead so they never touch the process environment.  Empty
    /// values are treated as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let creds = &mut self.storage.credentials;
        if let Some(v) = get(ENV_PROJECT_ID) {
            creds.project_id = v;
        }
        if let Some(v) = get(ENV_CLIENT_EMAIL) {
            creds.client_email = v;
        }
        if let Some(v) = get(ENV_PRIVATE_KEY) {
            creds.private_key = v;
        }
        if let Some(v) = get(ENV_SERVICE_ACCOUNT_BASE64) {
            creds.service_account_base64 = v;
        }
        if let Some(v) = get(ENV_SERVICE_ACCOUNT_JSON) {
            creds.service_account_json = v;
        }
        if let Some(v) = get(ENV_CREDENTIALS_FILE) {
            creds.credentials_file = v;
        }
        if let Some(v) = get(ENV_STORAGE_BUCKET) {
            self.storage.bucket = v;
        }
        if let Some(v) = get(ENV_IMG_MAX_WIDTH) {
            self.images.max_width = v
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("{ENV_IMG_MAX_WIDTH}={v:?} is not a width: {e}"))?;
        }
        if let Some(v) = get(ENV_IMG_DEFAULT_QUALITY) {
            self.images.default_quality = v.trim().parse().map_err(|e| {
                anyhow::anyhow!("{ENV_IMG_DEFAULT_QUALITY}={v:?} is not a quality: {e}")
            })?;
        }
        if let Some(v) = get(ENV_PORT) {
            self.server.port = v
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("{ENV_PORT}={v:?} is not a port: {e}"))?;
        }
        if let Some(v) = get(ENV_PUBLIC_BASE_URL) {
            self.server.public_base_url = v;
        }
        Ok(())
    }

    /// Reject configurations the server cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("server.port must be non-zero");
        }
        if self.images.max_width == 0 {
            anyhow::bail!("images.max_width must be at least 1");
        }
        let q = self.images.default_quality;
        if !(MIN_IMAGE_QUALITY..=MAX_IMAGE_QUALITY).contains(&q) {
            anyhow::bail!(
                "images.default_quality must be within {MIN_IMAGE_QUALITY}..={MAX_IMAGE_QUALITY}, got {q}"
            );
        }
        match self.storage.backend.as_str() {
            "gcs" | "memory" => Ok(()),
            other => anyhow::bail!("storage.backend must be 'gcs' or 'memory', got '{other}'"),
        }
    }

    /// The public base URL without trailing slashes.
    pub fn public_base(&self) -> &str {
        let trimmed = self.server.public_base_url.trim_end_matches('/');
        if trimmed.is_empty() {
            "http://localhost:5000"
        } else {
            trimmed
        }
    }
}

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

/// Load the optional YAML file, overlay the process environment and validate.
pub fn load(path: Option<&str>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(p) => load_config(p)?,
        None => Config::default(),
    };
    config.apply_env(|name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}
