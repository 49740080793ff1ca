//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/riffwatch/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/riffwatch/` (~/.config/riffwatch/)
//! - Data: `$XDG_DATA_HOME/riffwatch/` (~/.local/share/riffwatch/)
//! - State/Logs: `$XDG_STATE_HOME/riffwatch/` (~/.local/state/riffwatch/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Telemetry source connection
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Polling cadence and payload interpretation
    #[serde(default)]
    pub polling: PollingConfig,

    /// Tip store and regeneration policy
    #[serde(default)]
    pub tips: TipsConfig,

    /// LLM configuration for tip generation (optional)
    #[serde(default)]
    pub llm: Option<LlmConfig>,

    /// Query API listener
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which transport strategy talks to the telemetry source
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Fresh HTTP GET per fetch
    #[default]
    Http,
    /// Persistent TCP stream of newline-delimited JSON frames
    Socket,
}

impl std::str::FromStr for TransportMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(TransportMode::Http),
            "socket" | "tcp" => Ok(TransportMode::Socket),
            other => Err(Error::Config(format!("unknown transport mode: {other}"))),
        }
    }
}

/// Telemetry source configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Transport strategy
    pub mode: TransportMode,
    /// Host of the telemetry source
    pub host: String,
    /// Port of the telemetry source
    pub port: u16,
    /// Bound on a single connect attempt
    pub connect_timeout_ms: u64,
    /// Bound on a single read/request
    pub read_timeout_ms: u64,
    /// Max connect attempts before giving up on a fetch
    pub max_retries: u32,
    /// Backoff before the second attempt; doubles per attempt
    pub backoff_base_ms: u64,
    /// Upper bound on a single backoff delay
    pub backoff_max_ms: u64,
    /// Largest accepted socket frame
    pub max_frame_bytes: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::Http,
            host: "127.0.0.1".to_string(),
            port: 9938,
            connect_timeout_ms: 1000,
            read_timeout_ms: 2000,
            max_retries: 5,
            backoff_base_ms: 250,
            backoff_max_ms: 4000,
            max_frame_bytes: 1024 * 1024,
        }
    }
}

impl TelemetryConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// `host:port` of the telemetry source
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Polling loop configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollingConfig {
    /// Tick cadence in milliseconds
    pub interval_ms: u64,
    /// Wait before the first tick, giving the telemetry process time to start
    pub startup_delay_ms: u64,
    /// Game-stage value that means "a song is being played"
    pub playing_stage: String,
    /// Prefixes stripped from raw song ids
    pub song_id_prefixes: Vec<String>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            startup_delay_ms: 0,
            playing_stage: "las_game".to_string(),
            song_id_prefixes: vec!["CST1_".to_string()],
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }
}

/// What to do when live tips are switched on for a song that already has tips
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegenerationPolicy {
    /// Keep the stored entry and skip the generator
    #[default]
    Reuse,
    /// Call the generator on every off→on toggle
    Regenerate,
}

/// Tip store configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TipsConfig {
    /// Override for the tip store file
    pub path: Option<PathBuf>,
    /// Regeneration policy for already-known songs
    pub policy: RegenerationPolicy,
    /// Number of theory tips and trivia facts requested per song
    pub tips_per_kind: usize,
}

impl Default for TipsConfig {
    fn default() -> Self {
        Self {
            path: None,
            policy: RegenerationPolicy::Reuse,
            tips_per_kind: 3,
        }
    }
}

impl TipsConfig {
    /// Resolved tip store path
    pub fn store_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| Config::data_dir().join("song_tips.json"))
    }
}

/// LLM provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Provider type
    pub provider: LlmProvider,
    /// Model to use
    pub model: String,
    /// API endpoint (optional, uses default for provider)
    pub endpoint: Option<String>,
    /// API key (can also use env var)
    pub api_key: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_timeout() -> u64 {
    30
}

/// Supported LLM providers
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Ollama,
    Claude,
    OpenAI,
}

impl LlmProvider {
    /// Returns the default endpoint for this provider
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            LlmProvider::Ollama => "http://localhost:11434",
            LlmProvider::Claude => "https://api.anthropic.com",
            LlmProvider::OpenAI => "https://api.openai.com",
        }
    }
}

/// Query API listener configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file location; the daily rotation suffix is appended to its name
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// The configured log file, or [`Config::log_path`].
    pub fn file_path(&self) -> PathBuf {
        self.file.clone().unwrap_or_else(Config::log_path)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.polling.interval_ms == 0 {
            return Err(Error::Config(
                "polling.interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.telemetry.max_retries == 0 {
            return Err(Error::Config(
                "telemetry.max_retries must be at least 1".to_string(),
            ));
        }
        if self.telemetry.backoff_base_ms > self.telemetry.backoff_max_ms {
            return Err(Error::Config(
                "telemetry.backoff_base_ms must not exceed telemetry.backoff_max_ms".to_string(),
            ));
        }
        if self.telemetry.read_timeout_ms == 0 || self.telemetry.connect_timeout_ms == 0 {
            return Err(Error::Config(
                "telemetry timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/riffwatch/config.toml` (~/.config/riffwatch/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("riffwatch").join("config.toml")
    }

    /// Returns the data directory path (for the tip store)
    ///
    /// `$XDG_DATA_HOME/riffwatch/` (~/.local/share/riffwatch/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("riffwatch")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/riffwatch/` (~/.local/state/riffwatch/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("riffwatch")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/riffwatch/riffwatch.log` (~/.local/state/riffwatch/riffwatch.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("riffwatch.log")
    }
}
