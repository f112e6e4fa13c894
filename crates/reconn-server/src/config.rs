//! Server configuration loading from file and environment variables.

use reconn_voice::{LlmConfig, VoiceServiceConfig};
use serde::Deserialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Object store backend, container names, and local cache directories.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Chat completion and transcription provider.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Voice cloning / TTS service.
    #[serde(default)]
    pub voice: VoiceServiceConfig,

    /// GPU worker queue behavior.
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Which halves of the system this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessRole {
    /// The HTTP API only.
    Http,
    /// The queue consumer only.
    GpuWorker,
    /// Both, in one process.
    #[default]
    All,
}

impl ProcessRole {
    pub fn runs_http(self) -> bool {
        matches!(self, Self::Http | Self::All)
    }

    pub fn runs_worker(self) -> bool {
        matches!(self, Self::GpuWorker | Self::All)
    }
}

impl FromStr for ProcessRole {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "gpu-worker" | "gpu_worker" | "worker" => Ok(Self::GpuWorker),
            "all" => Ok(Self::All),
            other => Err(ConfigError::InvalidValue {
                key: "server.role",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Http => "http",
            Self::GpuWorker => "gpu-worker",
            Self::All => "all",
        })
    }
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub role: ProcessRole,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "reconn_pipeline=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Directory tree under `storage.fs_root`.
    #[default]
    Fs,
    /// Blob service at `storage.http_endpoint`.
    Http,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub fs_root: PathBuf,
    pub http_endpoint: String,
    pub sas_token: String,
    pub sample_container: String,
    pub model_container: String,
    pub output_container: String,
    pub sample_dir: PathBuf,
    pub model_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Fs,
            fs_root: PathBuf::from("data/blobs"),
            http_endpoint: String::new(),
            sas_token: String::new(),
            sample_container: "voice-samples".to_string(),
            model_container: "voice-models".to_string(),
            output_container: "voice-outputs".to_string(),
            sample_dir: PathBuf::from("data/voice-samples"),
            model_dir: PathBuf::from("data/voice-models"),
            output_dir: PathBuf::from("data/voice-outputs"),
        }
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("backend", &self.backend)
            .field("fs_root", &self.fs_root)
            .field("http_endpoint", &self.http_endpoint)
            .field("sas_token", &"[REDACTED]")
            .field("sample_container", &self.sample_container)
            .field("model_container", &self.model_container)
            .field("output_container", &self.output_container)
            .field("sample_dir", &self.sample_dir)
            .field("model_dir", &self.model_dir)
            .field("output_dir", &self.output_dir)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// How often an idle worker polls the queue.
    pub poll_interval_ms: u64,
    /// How long a received message stays hidden before it is redelivered.
    pub lease_secs: u64,
    /// Deliveries per row before the worker marks it `failed`.
    pub max_attempts: u32,
    /// Delay before an abandoned message is redelivered, multiplied by its
    /// delivery count.
    pub retry_backoff_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            lease_secs: 600,
            max_attempts: 3,
            retry_backoff_ms: 5000,
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8080
}

fn default_db_path() -> String {
    "reconn.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            role: ProcessRole::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `RECONN_HOST` overrides `server.host`
/// - `RECONN_PORT` overrides `server.port`
/// - `RECONN_ROLE` overrides `server.role` (`http`, `gpu-worker`, `all`)
/// - `RECONN_DB_PATH` overrides `database.path`
/// - `RECONN_LOG_LEVEL` overrides `logging.level`
/// - `RECONN_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `RECONN_LLM_API_KEY` overrides `llm.api_key`
/// - `RECONN_VOICE_URL` overrides `voice.base_url`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed,
/// or if `RECONN_ROLE` names no known role.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Applies `RECONN_*` overrides read through `var`.
pub fn apply_env_overrides(
    config: &mut Config,
    var: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(host) = var("RECONN_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("RECONN_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(role) = var("RECONN_ROLE") {
        config.server.role = role.parse()?;
    }
    if let Some(db_path) = var("RECONN_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = var("RECONN_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("RECONN_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(key) = var("RECONN_LLM_API_KEY") {
        config.llm.api_key = key;
    }
    if let Some(url) = var("RECONN_VOICE_URL") {
        config.voice.base_url = url;
    }
    Ok(())
}
