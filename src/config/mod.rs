//! Configuration management.
//!
//! Settings are read once at startup from an optional TOML file and from
//! `ARXIV_*` environment variables (environment wins), then checked by
//! [`Settings::validate`]. Only a validated [`CollectorConfig`] reaches the
//! pipeline, so every invalid combination is reported before the first
//! network request.
//!
//! # Configuration File Format
//!
//! ```toml
//! output_mode = "api"
//! api_service_url = "https://ingest.example.org/papers"
//! enable_auth = true
//! api_key = "secret"
//! enable_signing = true
//! private_key_path = "/etc/arxiv-collector/private_key.pem"
//! output_dir = "./output"
//! fetch_hours = 24
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::sources::ARXIV_API_URL;
use crate::utils::{KeyError, RequestSigner};

/// Prefix of every recognised environment variable
pub const ENV_PREFIX: &str = "ARXIV";

/// File name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "arxiv-collector.toml";

/// Where collected papers go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// JSONL files in a local directory
    Local,
    /// HTTP POST to a remote ingestion service
    Api,
}

impl std::str::FromStr for OutputMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(OutputMode::Local),
            "api" => Ok(OutputMode::Api),
            _ => Err(ConfigError::InvalidOutputMode(s.to_string())),
        }
    }
}

/// Raw settings as loaded, before validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// `local` or `api`
    #[serde(default = "default_output_mode")]
    pub output_mode: String,

    /// Ingestion endpoint, required in `api` mode
    #[serde(default)]
    pub api_service_url: Option<String>,

    /// Send `X-API-Key` with every delivery
    #[serde(default)]
    pub enable_auth: bool,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Send `X-Signature` with every delivery
    #[serde(default)]
    pub enable_signing: bool,

    /// PEM-encoded RSA private key
    #[serde(default)]
    pub private_key: Option<String>,

    /// Path to a PEM-encoded RSA private key
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,

    /// Directory for JSONL files in `local` mode
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Size of the collection window in hours
    #[serde(default = "default_fetch_hours")]
    pub fetch_hours: u32,

    /// Pause between successive page requests
    #[serde(default = "default_request_delay_secs")]
    pub request_delay_secs: u64,

    /// Timeout for every HTTP request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Search API endpoint
    #[serde(default = "default_search_url")]
    pub search_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_mode: default_output_mode(),
            api_service_url: None,
            enable_auth: false,
            api_key: None,
            enable_signing: false,
            private_key: None,
            private_key_path: None,
            output_dir: default_output_dir(),
            fetch_hours: default_fetch_hours(),
            request_delay_secs: default_request_delay_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            search_url: default_search_url(),
        }
    }
}

fn default_output_mode() -> String {
    "local".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}

fn default_fetch_hours() -> u32 {
    96
}

fn default_request_delay_secs() -> u64 {
    3
}

fn default_request_timeout_secs() -> u64 {
    90
}

fn default_search_url() -> String {
    ARXIV_API_URL.to_string()
}

/// Source of the signing key
#[derive(Clone)]
pub enum KeySource {
    Pem(String),
    File(PathBuf),
}

impl KeySource {
    /// Load the key into a signer
    pub fn load(&self) -> Result<RequestSigner, KeyError> {
        match self {
            KeySource::Pem(pem) => RequestSigner::from_pem(pem),
            KeySource::File(path) => RequestSigner::from_pem_file(path),
        }
    }
}

impl std::fmt::Debug for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Pem(_) => f.write_str("Pem(<redacted>)"),
            KeySource::File(path) => f.debug_tuple("File").field(path).finish(),
        }
    }
}

/// Remote ingestion endpoint and its credentials
#[derive(Clone)]
pub struct RemoteTarget {
    pub url: Url,
    pub api_key: Option<String>,
    pub signing_key: Option<KeySource>,
}

impl std::fmt::Debug for RemoteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTarget")
            .field("url", &self.url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("signing_key", &self.signing_key)
            .finish()
    }
}

/// Validated delivery target
#[derive(Debug, Clone)]
pub enum OutputTarget {
    Local { output_dir: PathBuf },
    Remote(RemoteTarget),
}

impl OutputTarget {
    pub fn mode(&self) -> OutputMode {
        match self {
            OutputTarget::Local { .. } => OutputMode::Local,
            OutputTarget::Remote(_) => OutputMode::Api,
        }
    }
}

/// Fully validated configuration for one collection run
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub output: OutputTarget,
    pub fetch_hours: u32,
    pub request_delay: Duration,
    pub request_timeout: Duration,
    pub search_url: String,
}

impl Settings {
    /// Check every required combination and produce the run configuration
    pub fn validate(self) -> Result<CollectorConfig, ConfigError> {
        let mode: OutputMode = self.output_mode.parse()?;

        if self.fetch_hours == 0 {
            return Err(ConfigError::InvalidFetchHours);
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        let search_url = parse_http_url(&self.search_url)
            .map_err(ConfigError::InvalidSearchUrl)?
            .to_string();

        let output = match mode {
            OutputMode::Local => OutputTarget::Local {
                output_dir: self.output_dir,
            },
            OutputMode::Api => {
                let raw_url = non_empty(self.api_service_url).ok_or(ConfigError::MissingApiUrl)?;
                let url = parse_http_url(&raw_url).map_err(ConfigError::InvalidApiUrl)?;

                let api_key = if self.enable_auth {
                    Some(non_empty(self.api_key).ok_or(ConfigError::MissingApiKey)?)
                } else {
                    None
                };

                let signing_key = if self.enable_signing {
                    match (non_empty(self.private_key), self.private_key_path) {
                        (Some(pem), None) => Some(KeySource::Pem(pem)),
                        (None, Some(path)) => Some(KeySource::File(path)),
                        (Some(_), Some(_)) => return Err(ConfigError::AmbiguousSigningKey),
                        (None, None) => return Err(ConfigError::MissingSigningKey),
                    }
                } else {
                    None
                };

                OutputTarget::Remote(RemoteTarget {
                    url,
                    api_key,
                    signing_key,
                })
            }
        };

        Ok(CollectorConfig {
            output,
            fetch_hours: self.fetch_hours,
            request_delay: Duration::from_secs(self.request_delay_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            search_url,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_http_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw.trim()).map_err(|e| format!("{raw}: {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(format!("{raw}: unsupported scheme {scheme}")),
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("ARXIV_OUTPUT_MODE must be either 'api' or 'local', got {0:?}")]
    InvalidOutputMode(String),

    #[error("ARXIV_API_SERVICE_URL is required when output mode is 'api'")]
    MissingApiUrl,

    #[error("Invalid ARXIV_API_SERVICE_URL: {0}")]
    InvalidApiUrl(String),

    #[error("ARXIV_API_KEY is required when authentication is enabled")]
    MissingApiKey,

    #[error("ARXIV_PRIVATE_KEY or ARXIV_PRIVATE_KEY_PATH is required when signing is enabled")]
    MissingSigningKey,

    #[error("Set only one of ARXIV_PRIVATE_KEY and ARXIV_PRIVATE_KEY_PATH")]
    AmbiguousSigningKey,

    #[error("ARXIV_FETCH_HOURS must be greater than zero")]
    InvalidFetchHours,

    #[error("ARXIV_REQUEST_TIMEOUT_SECS must be greater than zero")]
    InvalidTimeout,

    #[error("Invalid ARXIV_SEARCH_URL: {0}")]
    InvalidSearchUrl(String),
}

/// Load settings from an optional file plus the process environment
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    load_settings_with_env(path, None)
}

/// Load settings from an optional file plus the given environment map
///
/// `None` reads the real process environment.
pub fn load_settings_with_env(
    path: Option<&Path>,
    env: Option<config::Map<String, String>>,
) -> Result<Settings, ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path));
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX).source(env),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Find a configuration file in the working directory or the user config dir
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join(env!("CARGO_PKG_NAME")).join("config.toml"))
        .filter(|path| path.is_file())
}
