//! Agent configuration – reads/writes `~/.wayfarer/config.toml`.
//!
//! Precedence, lowest to highest: built-in defaults, the config file,
//! environment variables, command-line flags (applied in `main`).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use wayfarer_middleware::Framing;
use wayfarer_runtime::{DEFAULT_CONTEXT_WINDOW, LogSettings};
use wayfarer_types::AgentError;
use zeroize::Zeroize;

/// Wire framing as written in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FramingMode {
    #[default]
    Raw,
    Ndjson,
}

impl From<FramingMode> for Framing {
    fn from(mode: FramingMode) -> Self {
        match mode {
            FramingMode::Raw => Framing::Raw,
            FramingMode::Ndjson => Framing::NewlineDelimited,
        }
    }
}

impl std::str::FromStr for FramingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(FramingMode::Raw),
            "ndjson" => Ok(FramingMode::Ndjson),
            other => Err(format!("unknown framing '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Persisted agent configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub server_host: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    /// OpenAI-compatible API base, without the `/chat/completions` suffix.
    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,

    #[serde(default = "default_model")]
    pub llm_model: String,

    /// Bearer token for the LLM endpoint.  Usually supplied through
    /// `OPENAI_API_KEY` rather than stored here.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub llm_api_key: String,

    /// Conversation pairs replayed on each LLM call.
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    #[serde(default)]
    pub random_only: bool,

    /// Directory for per-run memory databases.  Defaults to
    /// `~/.wayfarer/memories`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_dir: Option<PathBuf>,

    /// Newline-delimited persona traits.  Defaults to `~/.wayfarer/traits.txt`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traits_path: Option<PathBuf>,

    #[serde(default)]
    pub framing: FramingMode,

    /// Give up on a silent server after this many seconds.  Unset waits forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout_secs: Option<u64>,

    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default)]
    pub verbose: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otlp_endpoint: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("server_host", &self.server_host)
            .field("server_port", &self.server_port)
            .field("llm_base_url", &self.llm_base_url)
            .field("llm_model", &self.llm_model)
            .field(
                "llm_api_key",
                if self.llm_api_key.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("context_window", &self.context_window)
            .field("random_only", &self.random_only)
            .field("memory_dir", &self.memory_dir)
            .field("traits_path", &self.traits_path)
            .field("framing", &self.framing)
            .field("read_timeout_secs", &self.read_timeout_secs)
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .field("log_format", &self.log_format)
            .field("verbose", &self.verbose)
            .field("otlp_endpoint", &self.otlp_endpoint)
            .finish()
    }
}

impl Drop for Config {
    fn drop(&mut self) {
        self.llm_api_key.zeroize();
    }
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    8765
}
fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_context_window() -> usize {
    DEFAULT_CONTEXT_WINDOW
}
fn default_llm_timeout_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: default_host(),
            server_port: default_port(),
            llm_base_url: default_llm_base_url(),
            llm_model: default_model(),
            llm_api_key: String::new(),
            context_window: default_context_window(),
            random_only: false,
            memory_dir: None,
            traits_path: None,
            framing: FramingMode::default(),
            read_timeout_secs: None,
            llm_timeout_secs: default_llm_timeout_secs(),
            log_format: LogFormat::default(),
            verbose: false,
            otlp_endpoint: None,
        }
    }
}

impl Config {
    pub fn memory_dir(&self) -> PathBuf {
        self.memory_dir
            .clone()
            .unwrap_or_else(|| wayfarer_home().join("memories"))
    }

    pub fn traits_path(&self) -> PathBuf {
        self.traits_path
            .clone()
            .unwrap_or_else(|| wayfarer_home().join("traits.txt"))
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_secs.filter(|s| *s > 0).map(Duration::from_secs)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs.max(1))
    }

    pub fn log_settings(&self) -> LogSettings {
        LogSettings {
            verbose: self.verbose,
            json: self.log_format == LogFormat::Json,
            otlp_endpoint: self.otlp_endpoint.clone(),
        }
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

fn wayfarer_home() -> PathBuf {
    PathBuf::from(home_dir()).join(".wayfarer")
}

/// Return the path to `~/.wayfarer/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".wayfarer").join("config.toml")
}

/// Load `path` (defaults when it does not exist) and apply environment
/// overrides.
pub fn load_from(path: &Path) -> Result<Config, AgentError> {
    let mut cfg = read_file(path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

fn read_file(path: &Path) -> Result<Option<Config>, AgentError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        AgentError::Config(format!("failed to read config at {}: {}", path.display(), e))
    })?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| AgentError::Config(format!("failed to parse {}: {}", path.display(), e)))?;
    Ok(Some(cfg))
}

/// Apply `OPENAI_API_KEY` and `WAYFARER_*` environment overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `OPENAI_API_KEY` | `llm_api_key` |
/// | `WAYFARER_HOST` | `server_host` |
/// | `WAYFARER_PORT` | `server_port` |
/// | `WAYFARER_MODEL` | `llm_model` |
/// | `WAYFARER_LLM_URL` | `llm_base_url` |
/// | `WAYFARER_CONTEXT_WINDOW` | `context_window` |
/// | `WAYFARER_RANDOM_ONLY` | `random_only` (`1`/`true`/`yes`) |
/// | `WAYFARER_FRAMING` | `framing` (`raw`/`ndjson`) |
///
/// Values that fail to parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides(cfg: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("OPENAI_API_KEY").filter(|v| !v.trim().is_empty()) {
        cfg.llm_api_key = v.trim().to_string();
    }
    if let Some(v) = var("WAYFARER_HOST") {
        cfg.server_host = v;
    }
    if let Some(v) = var("WAYFARER_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.server_port = port;
    }
    if let Some(v) = var("WAYFARER_MODEL") {
        cfg.llm_model = v;
    }
    if let Some(v) = var("WAYFARER_LLM_URL") {
        cfg.llm_base_url = v;
    }
    if let Some(v) = var("WAYFARER_CONTEXT_WINDOW")
        && let Ok(n) = v.parse::<usize>()
    {
        cfg.context_window = n;
    }
    if let Some(v) = var("WAYFARER_RANDOM_ONLY") {
        cfg.random_only = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
    }
    if let Some(v) = var("WAYFARER_FRAMING")
        && let Ok(mode) = v.parse::<FramingMode>()
    {
        cfg.framing = mode;
    }
}

/// Save the config to a specific path, creating its directory if needed.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), AgentError> {
    let err = |what: &str, e: &dyn std::fmt::Display| {
        AgentError::Config(format!("{what} {}: {e}", path.display()))
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| err("failed to create directory for", &e))?;
        // Owner-only directory (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| err("failed to restrict directory for", &e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| err("failed to serialize", &e))?;
    // Owner-only file (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| err("failed to write", &e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| err("failed to write", &e))?;
    Ok(())
}
