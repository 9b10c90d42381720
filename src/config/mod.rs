use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub trigger: TriggerConfig,
    pub processing: ProcessingConfig,
    pub platform: PlatformConfig,
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
}

/// Authentication and cadence for the pipeline trigger endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Bearer secret expected on /triggers/* calls
    pub secret: String,
    /// Optional internal ticker interval (seconds). When unset, pipelines
    /// only run when an external trigger calls the HTTP endpoints.
    pub internal_interval_secs: Option<u64>,
    /// Minimum seconds between two runs of the same pipeline
    pub min_run_spacing_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Maximum queue jobs claimed per dispatcher run
    pub batch_size: usize,
    /// Scheduler look-ahead window (hours) for pending publish jobs
    pub window_hours: i64,
    /// Per-request timeout for all outbound network calls (seconds)
    pub request_timeout_secs: u64,
    /// Smallest acceptable downloaded media payload (bytes)
    pub min_download_bytes: usize,
}

/// Endpoints and publishing rules for the storage and hosting platforms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Cloud storage API base (file metadata and content)
    pub storage_api_base: String,
    /// Video hosting platform API base (uploads)
    pub hosting_api_base: String,
    /// OAuth token endpoint used for refresh grants
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
    /// Public prefix for canonical watch URLs of published videos
    pub watch_url_base: String,
    /// Tag the platform requires in every published title
    pub required_title_tag: String,
    /// Hard limit the platform enforces on title length
    pub max_title_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    pub tikwm_api_base: String,
    pub ssstik_api_base: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://./vidqueue.db".to_string(),
                max_connections: Some(10),
            },
            web: WebConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                base_url: "http://localhost:8080".to_string(),
            },
            trigger: TriggerConfig {
                secret: "change-me".to_string(),
                internal_interval_secs: None,
                min_run_spacing_secs: 30,
            },
            processing: ProcessingConfig {
                batch_size: 8,
                window_hours: 24,
                request_timeout_secs: 30,
                min_download_bytes: 10_240,
            },
            platform: PlatformConfig {
                storage_api_base: "https://www.googleapis.com/drive/v3".to_string(),
                hosting_api_base: "https://www.googleapis.com/upload/youtube/v3".to_string(),
                token_endpoint: "https://oauth2.googleapis.com/token".to_string(),
                client_id: String::new(),
                client_secret: String::new(),
                watch_url_base: "https://www.youtube.com/watch?v=".to_string(),
                required_title_tag: "#Shorts".to_string(),
                max_title_length: 100,
            },
            providers: ProvidersConfig {
                tikwm_api_base: "https://www.tikwm.com/api".to_string(),
                ssstik_api_base: "https://ssstik.io/abc".to_string(),
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());

        if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(&config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(&config_file, contents)?;
            Ok(default_config)
        }
    }
}
