use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RagConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Character budget for text fed into summary/highlight prompts.
    /// Longer documents are middle-truncated with an explicit marker.
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            max_prompt_chars: default_max_prompt_chars(),
        }
    }
}

fn default_chunk_size() -> usize {
    512
}
fn default_chunk_overlap() -> usize {
    64
}
fn default_top_k() -> usize {
    5
}
fn default_max_prompt_chars() -> usize {
    24_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"disabled"` or `"ollama"`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            base_url: default_embedding_base_url(),
            model: default_embedding_model(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_embedding_timeout() -> u64 {
    30
}

/// Generation defaults applied when a call does not override them.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct GenerationDefaults {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
        }
    }
}

fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_top_p() -> f32 {
    0.9
}

/// Static description of one generation backend.
///
/// Consumed, never produced, by the core. String fields of the form
/// `${VAR}` are resolved from the process environment at load time;
/// unresolved variables become empty strings.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ProviderConfig {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: String,
    pub default_model: String,
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
    /// OpenAI-only extra; silently ignored by other providers.
    pub organization: String,
}

fn default_provider_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub default_provider: String,
    #[serde(default)]
    pub generation: GenerationDefaults,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: default_llm_provider(),
            generation: GenerationDefaults::default(),
            providers: BTreeMap::new(),
        }
    }
}

fn default_llm_provider() -> String {
    "ollama".to_string()
}

/// Built-in provider definitions; config file entries overlay these so
/// omitted keys still work.
fn default_providers() -> BTreeMap<String, ProviderConfig> {
    let mut map = BTreeMap::new();
    map.insert(
        "ollama".to_string(),
        ProviderConfig {
            enabled: true,
            base_url: "http://localhost:11434".to_string(),
            default_model: "llama3.2:latest".to_string(),
            timeout_secs: 120,
            ..Default::default()
        },
    );
    map.insert(
        "lm_studio".to_string(),
        ProviderConfig {
            base_url: "http://localhost:1234/v1".to_string(),
            default_model: "local-model".to_string(),
            timeout_secs: 120,
            ..Default::default()
        },
    );
    map.insert(
        "localai".to_string(),
        ProviderConfig {
            base_url: "http://localhost:8080/v1".to_string(),
            default_model: "gpt-3.5-turbo".to_string(),
            timeout_secs: 120,
            ..Default::default()
        },
    );
    map.insert(
        "text_generation_webui".to_string(),
        ProviderConfig {
            base_url: "http://localhost:5000".to_string(),
            default_model: "default".to_string(),
            timeout_secs: 120,
            ..Default::default()
        },
    );
    map.insert(
        "openai".to_string(),
        ProviderConfig {
            base_url: "https://api.openai.com/v1".to_string(),
            default_model: "gpt-4o".to_string(),
            timeout_secs: 60,
            ..Default::default()
        },
    );
    map.insert(
        "anthropic".to_string(),
        ProviderConfig {
            base_url: "https://api.anthropic.com".to_string(),
            default_model: "claude-3-5-sonnet-20241022".to_string(),
            timeout_secs: 60,
            ..Default::default()
        },
    );
    map
}

/// Expand a `${VAR}` string from the process environment.
///
/// Non-matching strings pass through unchanged; an unset variable expands
/// to the empty string rather than an error.
fn expand_env(value: &str) -> String {
    let trimmed = value.trim();
    if let Some(inner) = trimmed
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
    {
        return std::env::var(inner).unwrap_or_default();
    }
    value.to_string()
}

fn expand_provider_env(cfg: &mut ProviderConfig) {
    cfg.base_url = expand_env(&cfg.base_url);
    cfg.api_key = expand_env(&cfg.api_key);
    cfg.default_model = expand_env(&cfg.default_model);
    cfg.organization = expand_env(&cfg.organization);
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("failed to parse config file: {}", e)))?;

    finalize(config)
}

/// Merge provider defaults, expand env vars, and validate.
pub fn finalize(mut config: Config) -> Result<Config> {
    let mut providers = default_providers();
    for (name, cfg) in std::mem::take(&mut config.llm.providers) {
        providers.insert(name, cfg);
    }
    for cfg in providers.values_mut() {
        expand_provider_env(cfg);
    }
    config.llm.providers = providers;

    if config.rag.chunk_size == 0 {
        return Err(Error::Config("rag.chunk_size must be > 0".to_string()));
    }
    if config.rag.chunk_overlap >= config.rag.chunk_size {
        return Err(Error::Config(
            "rag.chunk_overlap must be smaller than rag.chunk_size".to_string(),
        ));
    }
    if config.rag.top_k == 0 {
        return Err(Error::Config("rag.top_k must be >= 1".to_string()));
    }

    match config.embedding.provider.as_str() {
        "disabled" | "ollama" => {}
        other => {
            return Err(Error::Config(format!(
                "unknown embedding provider '{}', must be disabled or ollama",
                other
            )))
        }
    }

    if !config
        .llm
        .providers
        .contains_key(&config.llm.default_provider)
    {
        return Err(Error::Config(format!(
            "llm.default_provider '{}' is not a configured provider",
            config.llm.default_provider
        )));
    }

    Ok(config)
}
