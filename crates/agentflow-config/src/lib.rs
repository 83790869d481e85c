//! Configuration loading for agentflow.
//! Reads agentflow.toml from the current directory or the path in AGENTFLOW_CONFIG.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Backend families the server knows how to build.
pub const LLM_MODES: [&str; 4] = ["cli", "anthropic", "openai_compatible", "ollama"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_bind()             -> String { "127.0.0.1:3001".to_string() }
fn default_max_upload_bytes() -> usize  { 50 * 1024 * 1024 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind(), max_upload_bytes: default_max_upload_bytes() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding agents.json. A leading `~/` is expanded by the store.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String { "~/.agentflow".to_string() }

impl Default for StorageConfig {
    fn default() -> Self {
        Self { data_dir: default_data_dir() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Default record cap per run; 0 means no cap.
    #[serde(default)]
    pub max_records: i64,
    #[serde(default = "default_abstract_chars")]
    pub abstract_chars: usize,
}

fn default_concurrency()    -> usize { 3 }
fn default_abstract_chars() -> usize { 2000 }

impl Default for BatchConfig {
    fn default() -> Self {
        Self { concurrency: default_concurrency(), max_records: 0, abstract_chars: default_abstract_chars() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Jobs kept in memory; 0 keeps all of them.
    #[serde(default)]
    pub max_retained: usize,
    /// Uploaded record sets kept for later runs; the oldest is dropped
    /// first. 0 keeps all of them.
    #[serde(default = "default_max_record_sets")]
    pub max_record_sets: usize,
}

fn default_max_record_sets() -> usize { 32 }

impl Default for JobsConfig {
    fn default() -> Self {
        Self { max_retained: 0, max_record_sets: default_max_record_sets() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_mode")]
    pub mode: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default)]
    pub cli: CliBackendConfig,
    #[serde(default)]
    pub anthropic: AnthropicConfig,
    #[serde(default)]
    pub openai_compatible: OpenAiCompatibleConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
}

fn default_llm_mode() -> String { "cli".to_string() }
fn default_model()    -> String { "sonnet".to_string() }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            mode: default_llm_mode(),
            default_model: default_model(),
            cli: CliBackendConfig::default(),
            anthropic: AnthropicConfig::default(),
            openai_compatible: OpenAiCompatibleConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliBackendConfig {
    #[serde(default = "default_cli_binary")]
    pub binary: String,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_cli_binary() -> String { "claude".to_string() }

impl Default for CliBackendConfig {
    fn default() -> Self {
        Self { binary: default_cli_binary(), extra_args: Vec::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_anthropic_url")]
    pub base_url: String,
}

fn default_anthropic_url() -> String { "https://api.anthropic.com".to_string() }

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self { api_key: String::new(), base_url: default_anthropic_url() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiCompatibleConfig {
    #[serde(default = "default_openai_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
}

fn default_openai_url() -> String { "http://localhost:8000/v1".to_string() }

impl Default for OpenAiCompatibleConfig {
    fn default() -> Self {
        Self { base_url: default_openai_url(), api_key: String::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
}

fn default_ollama_url() -> String { "http://localhost:11434".to_string() }

impl Default for OllamaConfig {
    fn default() -> Self {
        Self { base_url: default_ollama_url() }
    }
}

mod tests;

impl Config {
    /// Load configuration from agentflow.toml.
    /// Checks AGENTFLOW_CONFIG first, then the current directory. A missing
    /// file yields the defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("AGENTFLOW_CONFIG")
            .unwrap_or_else(|_| "agentflow.toml".to_string());

        let mut config = if Path::new(&path).exists() {
            Self::from_path(&path)?
        } else {
            tracing::info!(path = %path, "config file not found, using defaults");
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
        Self::from_toml(&content).map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `AGENTFLOW_*` overrides using `lookup` to read variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(bind) = set("AGENTFLOW_BIND") {
            self.server.bind = bind;
        }
        if let Some(key) = set("AGENTFLOW_ANTHROPIC_API_KEY") {
            self.llm.anthropic.api_key = key;
        }
        if let Some(mode) = set("AGENTFLOW_LLM_MODE") {
            self.llm.mode = mode;
        }
        if let Some(dir) = set("AGENTFLOW_DATA_DIR") {
            self.storage.data_dir = dir;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch.concurrency == 0 {
            anyhow::bail!("batch.concurrency must be at least 1");
        }
        if !LLM_MODES.contains(&self.llm.mode.as_str()) {
            anyhow::bail!(
                "unknown llm.mode '{}', expected one of: {}",
                self.llm.mode,
                LLM_MODES.join(", ")
            );
        }
        if self.llm.mode == "anthropic" && self.llm.anthropic.api_key.trim().is_empty() {
            anyhow::bail!("llm.mode = \"anthropic\" needs llm.anthropic.api_key or AGENTFLOW_ANTHROPIC_API_KEY");
        }
        if self.server.max_upload_bytes == 0 {
            anyhow::bail!("server.max_upload_bytes must be positive");
        }
        Ok(())
    }
}
