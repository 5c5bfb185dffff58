use crate::error::ConfigError;
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Workspace directory - computed from home, not serialized
    #[serde(skip)]
    pub workspace_dir: PathBuf,
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub agent: AgentConfig,
}

// ── LLM ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// Overridden by the STEWARD_API_KEY environment variable.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    /// Smaller/cheaper model used for guardrail classification.
    #[serde(default = "default_guardrail_model")]
    pub guardrail_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl LlmConfig {
    /// Environment variable wins over the config file.
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var("STEWARD_API_KEY")
            .ok()
            .map(|key| key.trim().to_owned())
            .filter(|key| !key.is_empty())
            .or_else(|| self.api_key.clone())
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: None,
            model: default_model(),
            guardrail_model: default_guardrail_model(),
            temperature: default_temperature(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_guardrail_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f64 {
    0.4
}

// ── Embedding ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_embedding_model")]
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: None,
            model: default_embedding_model(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

// ── Store ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    /// SQLite database path relative to the workspace dir; absolute paths
    /// are used as-is.
    #[serde(default)]
    pub db_path: Option<String>,
}

impl StoreConfig {
    pub fn resolve_db_path(&self, workspace_dir: &Path) -> PathBuf {
        match &self.db_path {
            Some(path) if Path::new(path).is_absolute() => PathBuf::from(path),
            Some(path) => workspace_dir.join(path),
            None => workspace_dir.join("steward.db"),
        }
    }
}

// ── Gateway ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7340
}

// ── Agent ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard bound on tool rounds within one conversation turn.
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: u32,
    /// Streaming chunk size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Keepalive interval in seconds for idle stream periods.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    /// Owner identity for cross-project (global) conversations.
    #[serde(default = "default_user")]
    pub default_user: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_calls: default_max_tool_calls(),
            chunk_size: default_chunk_size(),
            keepalive_secs: default_keepalive_secs(),
            default_user: default_user(),
        }
    }
}

fn default_max_tool_calls() -> u32 {
    6
}

fn default_chunk_size() -> usize {
    120
}

fn default_keepalive_secs() -> u64 {
    15
}

fn default_user() -> String {
    "default".to_string()
}

// ── Loading ──────────────────────────────────────────────────────

impl Config {
    /// Load from `~/.steward/config.toml`; a missing file yields defaults
    /// (disabled LLM, local SQLite store).
    pub fn load() -> Result<Self, ConfigError> {
        let workspace_dir = Self::workspace_dir()?;
        Self::load_from(&workspace_dir)
    }

    pub fn load_from(workspace_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = workspace_dir.join("config.toml");

        let mut config = if config_path.exists() {
            let raw = fs::read_to_string(&config_path).map_err(|error| {
                ConfigError::Load(format!("reading {}: {error}", config_path.display()))
            })?;
            toml::from_str::<Config>(&raw).map_err(|error| {
                ConfigError::Load(format!("parsing {}: {error}", config_path.display()))
            })?
        } else {
            Config::default()
        };

        config.workspace_dir = workspace_dir.to_path_buf();
        config.config_path = config_path;
        config.validate()?;
        Ok(config)
    }

    fn workspace_dir() -> Result<PathBuf, ConfigError> {
        let user_dirs = UserDirs::new()
            .ok_or_else(|| ConfigError::Load("could not determine home directory".into()))?;
        Ok(user_dirs.home_dir().join(".steward"))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.chunk_size == 0 {
            return Err(ConfigError::Validation(
                "agent.chunk_size must be greater than zero".into(),
            ));
        }
        if self.agent.keepalive_secs == 0 {
            return Err(ConfigError::Validation(
                "agent.keepalive_secs must be greater than zero".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Validation(
                "llm.temperature must be in 0.0..=2.0".into(),
            ));
        }
        Ok(())
    }
}
