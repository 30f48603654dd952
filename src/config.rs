//! Configuration management for skill_agent.
//!
//! Configuration is layered: built-in defaults, then an optional YAML or JSON
//! file, then environment variables:
//! - `OPENROUTER_API_KEY` - API key for the model provider. Required when `use_real_llm` is set.
//! - `LLM_BASE_URL` - Optional. OpenAI-compatible base URL. Defaults to `https://openrouter.ai/api/v1`.
//! - `LLM_DEFAULT_MODEL` - Optional. Model used when a skill names none. Defaults to `openai/gpt-4o-mini`.
//! - `AGENT_MAX_STEPS` - Optional. Maximum model queries per run. Defaults to `6`.
//! - `AGENT_MAX_CHARS` - Optional. Character budget per run, `0` disables it. Defaults to `24000`.
//! - `AGENT_TEMPERATURE` - Optional. Sampling temperature. Defaults to `0.2`.
//! - `USE_REAL_LLM` - Optional. Use the HTTP client instead of the scripted mock. Defaults to `false`.
//!
//! Without an explicit path, `skill-agent.yaml`, `skill-agent.yml` or
//! `skill-agent.json` is looked up in the current directory and then in `config/`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::Limits;
use crate::llm::OpenRouterConfig;

const CONFIG_NAMES: [&str; 3] = ["skill-agent.yaml", "skill-agent.yml", "skill-agent.json"];
const CONFIG_DIRS: [&str; 2] = [".", "config"];
const MAX_RETRIES: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    MissingValue(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {0}: {1}")]
    Parse(PathBuf, String),

    #[error("Unsupported config format: {0} (use .yaml, .yml or .json)")]
    UnsupportedFormat(String),
}

/// Model provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    /// Model used when a skill does not name one
    pub default_model: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    /// Client-side pacing, zero disables it
    pub requests_per_min: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            default_model: "openai/gpt-4o-mini".to_string(),
            timeout_seconds: 60,
            max_retries: 3,
            requests_per_min: 60,
        }
    }
}

impl LlmConfig {
    pub fn client_config(&self) -> OpenRouterConfig {
        OpenRouterConfig {
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(self.timeout_seconds),
            max_retries: self.max_retries,
            requests_per_min: self.requests_per_min,
        }
    }
}

/// Agent loop limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_steps: usize,
    pub max_chars: usize,
    pub temperature: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            max_steps: limits.max_steps,
            max_chars: limits.max_chars,
            temperature: limits.temperature,
        }
    }
}

/// Built-in tool switches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Register `execute_code`. Runs snippets on the host, so off by default.
    pub allow_code_execution: bool,
}

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub tools: ToolsConfig,

    /// Directory holding `skills/` and `tools/` definition files
    pub defs_dir: Option<PathBuf>,

    /// Directory for conversation threads
    pub threads_dir: Option<PathBuf>,

    /// Directory holding project definition files
    pub projects_dir: Option<PathBuf>,

    /// Use the HTTP model client instead of the scripted mock
    pub use_real_llm: bool,
}

impl Config {
    /// Load configuration: defaults, then `path` (or a discovered file), then the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or an environment
    /// override does not parse.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => find_config_file(Path::new(".")),
        };

        let mut config = match path {
            Some(p) => {
                tracing::debug!("Loading config from {}", p.display());
                Self::from_file(&p)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a YAML or JSON config file. Missing sections keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let format = Format::of(path)?;
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed = match format {
            Format::Yaml => serde_yaml::from_str(&data).map_err(|e| e.to_string()),
            Format::Json => serde_json::from_str(&data).map_err(|e| e.to_string()),
        };
        parsed.map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    /// Apply environment overrides through `lookup`. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("OPENROUTER_API_KEY") {
            self.llm.api_key = v;
        }
        if let Some(v) = get("LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = get("LLM_DEFAULT_MODEL") {
            self.llm.default_model = v;
        }
        if let Some(v) = get("AGENT_MAX_STEPS") {
            self.agent.max_steps = parse_env("AGENT_MAX_STEPS", &v)?;
        }
        if let Some(v) = get("AGENT_MAX_CHARS") {
            self.agent.max_chars = parse_env("AGENT_MAX_CHARS", &v)?;
        }
        if let Some(v) = get("AGENT_TEMPERATURE") {
            self.agent.temperature = parse_env("AGENT_TEMPERATURE", &v)?;
        }
        if let Some(v) = get("USE_REAL_LLM") {
            self.use_real_llm =
                parse_bool(&v).map_err(|e| ConfigError::InvalidValue("USE_REAL_LLM".to_string(), e))?;
        }
        Ok(())
    }

    /// Check the settings needed before any model is queried.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.use_real_llm && self.llm.api_key.trim().is_empty() {
            return Err(ConfigError::MissingValue(
                "llm.api_key (set OPENROUTER_API_KEY or api_key in the config file)".to_string(),
            ));
        }
        let base = url::Url::parse(&self.llm.base_url)
            .map_err(|e| ConfigError::InvalidValue("llm.base_url".to_string(), e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue(
                "llm.base_url".to_string(),
                format!("unsupported scheme: {}", base.scheme()),
            ));
        }
        if self.llm.default_model.trim().is_empty() {
            return Err(ConfigError::MissingValue("llm.default_model".to_string()));
        }
        if self.llm.timeout_seconds < 1 {
            return Err(ConfigError::InvalidValue(
                "llm.timeout_seconds".to_string(),
                "must be at least 1 second".to_string(),
            ));
        }
        if self.llm.max_retries > MAX_RETRIES {
            return Err(ConfigError::InvalidValue(
                "llm.max_retries".to_string(),
                format!("must be at most {}", MAX_RETRIES),
            ));
        }
        Limits::from(&self.agent)
            .validate()
            .map_err(|e| ConfigError::InvalidValue("agent".to_string(), e.to_string()))?;
        Ok(())
    }

    /// Write an example config file. The format follows the extension.
    pub fn save_example(path: &Path) -> Result<(), ConfigError> {
        let mut example = Self::default();
        example.llm.api_key = "your-api-key-here".to_string();
        example.defs_dir = Some(PathBuf::from("defs"));
        example.threads_dir = Some(PathBuf::from("threads"));
        example.projects_dir = Some(PathBuf::from("projects"));

        let data = match Format::of(path)? {
            Format::Yaml => serde_yaml::to_string(&example).map_err(|e| e.to_string()),
            Format::Json => serde_json::to_string_pretty(&example).map_err(|e| e.to_string()),
        }
        .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;

        std::fs::write(path, data).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Default run limits from the agent section.
    pub fn limits(&self) -> Limits {
        Limits::from(&self.agent)
    }
}

enum Format {
    Yaml,
    Json,
}

impl Format {
    fn of(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            Some("json") => Ok(Self::Json),
            other => Err(ConfigError::UnsupportedFormat(other.unwrap_or("").to_string())),
        }
    }
}

/// First existing config file under `root`, in priority order.
fn find_config_file(root: &Path) -> Option<PathBuf> {
    CONFIG_DIRS
        .iter()
        .flat_map(|dir| CONFIG_NAMES.iter().map(move |name| root.join(dir).join(name)))
        .find(|p| p.is_file())
}

fn parse_env<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue(key.to_string(), format!("{}", e)))
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        other => Err(format!("expected boolean-like value, got: {}", other)),
    }
}
