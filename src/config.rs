//! TOML configuration parsing and validation.
//!
//! Every section except `[index]` is optional and falls back to the defaults
//! below. See `config/cyd.example.toml` for a full example.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub index: IndexConfig,
    #[serde(default)]
    pub openai: OpenAIConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Path to the serialized document index (JSON).
    pub path: PathBuf,
}

/// Settings shared by the embeddings and chat-completions clients.
#[derive(Debug, Deserialize, Clone)]
pub struct OpenAIConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            temperature: 0.0,
            max_retries: 0,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_chat_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    /// Subject matter the QA prompt tells the model it is tuned for.
    #[serde(default = "default_topic")]
    pub topic: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
        }
    }
}

fn default_topic() -> String {
    "the Institute for the Study of War (ISW) updates on the war in Ukraine".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DispatchConfig {
    /// Number of chat turns allowed in flight across the whole process.
    /// `1` serializes every turn behind a single lock.
    #[serde(default = "default_max_concurrent_turns")]
    pub max_concurrent_turns: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_turns: default_max_concurrent_turns(),
        }
    }
}

fn default_max_concurrent_turns() -> usize {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
    #[serde(default = "default_examples")]
    pub examples: Vec<String>,
    /// Sessions idle for longer than this are dropped.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            title: default_title(),
            placeholder: default_placeholder(),
            examples: default_examples(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7860".to_string()
}
fn default_title() -> String {
    "Chat-Your-Data (ISW Updates)".to_string()
}
fn default_placeholder() -> String {
    "Ask questions about the war in Ukraine".to_string()
}
fn default_session_ttl_secs() -> u64 {
    3600
}
fn default_examples() -> Vec<String> {
    vec![
        "What is the focus of the Russian offensive?".to_string(),
        "Where are the frontlines?".to_string(),
        "How are they consolidating power?".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `"info"` or
    /// `"chat_your_data=debug,tower_http=warn"`.
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;

    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.dispatch.max_concurrent_turns == 0 {
        anyhow::bail!("dispatch.max_concurrent_turns must be >= 1");
    }

    if !(0.0..=2.0).contains(&config.openai.temperature) {
        anyhow::bail!("openai.temperature must be in [0.0, 2.0]");
    }

    if config.server.session_ttl_secs == 0 {
        anyhow::bail!("server.session_ttl_secs must be > 0");
    }

    if config.openai.timeout_secs == 0 {
        anyhow::bail!("openai.timeout_secs must be > 0");
    }

    if !config.openai.base_url.starts_with("http://")
        && !config.openai.base_url.starts_with("https://")
    {
        anyhow::bail!(
            "openai.base_url must be an http(s) URL, got '{}'",
            config.openai.base_url
        );
    }

    Ok(())
}
