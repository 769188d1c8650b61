use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the liveview service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Blob storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Ingestion configuration
    #[serde(default)]
    pub ingest: IngestConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (json, pretty)
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Install the Prometheus exporter
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Frame storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding uploaded frames
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
    /// Seed the latest frame from the newest stored file on startup
    #[serde(default)]
    pub restore_latest: bool,
}

/// Upload ingestion configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Extension appended to generated frame filenames
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Reject payloads that do not start with a JPEG SOI marker
    #[serde(default)]
    pub require_jpeg_signature: bool,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Maximum accepted request body for uploads
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Cache-Control max-age for image responses
    #[serde(default = "default_image_cache_max_age_secs")]
    pub image_cache_max_age_secs: u64,
}

// Default value functions
fn default_service_name() -> String {
    "liveview".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_root_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_extension() -> String {
    "jpg".to_string()
}

fn default_true() -> bool {
    true
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    5002
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024 // 10MB
}

fn default_image_cache_max_age_secs() -> u64 {
    365 * 24 * 60 * 60 // frames never change once written
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Add config file if present
            .add_source(config::File::with_name("config/liveview").required(false))
            .add_source(config::File::with_name("/etc/liveview/liveview").required(false))
            // Override with environment variables
            // LIVEVIEW__API__PORT -> api.port
            .add_source(
                config::Environment::with_prefix("LIVEVIEW")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.storage.root_dir.as_os_str().is_empty() {
            return Err(ConfigValidationError::MissingField(
                "storage.root_dir".to_string(),
            ));
        }

        if self.ingest.extension.is_empty() {
            return Err(ConfigValidationError::MissingField(
                "ingest.extension".to_string(),
            ));
        }

        if !self
            .ingest
            .extension
            .chars()
            .all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ConfigValidationError::InvalidValue {
                field: "ingest.extension".to_string(),
                message: "must be ASCII alphanumeric".to_string(),
            });
        }

        if self.api.port == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "api.port".to_string(),
                message: "must be non-zero".to_string(),
            });
        }

        if self.api.max_upload_bytes == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "api.max_upload_bytes".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if !matches!(self.service.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigValidationError::InvalidValue {
                field: "service.log_format".to_string(),
                message: format!("unknown format '{}'", self.service.log_format),
            });
        }

        Ok(())
    }

    /// Get the image Cache-Control max-age as Duration
    pub fn image_cache_max_age(&self) -> Duration {
        Duration::from_secs(self.api.image_cache_max_age_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            metrics_enabled: default_true(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            restore_latest: false,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            extension: default_extension(),
            require_jpeg_signature: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
            image_cache_max_age_secs: default_image_cache_max_age_secs(),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
