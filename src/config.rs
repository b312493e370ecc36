use crate::error::{ChatError, Result};
use crate::llm::LLMConfig;
use crate::resolver::{ContextJoin, PromptStyle, PromptTemplate, ResolverConfig};
use crate::suggestions::SuggestionCatalog;
use crate::utils::read_optional;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const API_KEY_ENV: &str = "TOGETHER_API_KEY";
pub const CONFIG_PATH_ENV: &str = "RAVIGPT_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    pub style: PromptStyle,
    /// Overrides the style's built-in persona prompt.
    pub system_prompt: Option<String>,
    pub top_k: usize,
    pub context_join: ContextJoin,
    /// Prior turns forwarded per request; absent means the whole history.
    pub history_window: Option<usize>,
    /// Upper bound on one answer including retries.
    pub timeout_secs: Option<u64>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            style: PromptStyle::default(),
            system_prompt: None,
            top_k: 3,
            context_join: ContextJoin::default(),
            history_window: None,
            timeout_secs: None,
        }
    }
}

impl ResolverSettings {
    pub fn to_resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            system_prompt: self
                .system_prompt
                .clone()
                .unwrap_or_else(|| self.style.default_system_prompt().to_string()),
            top_k: self.top_k,
            template: PromptTemplate::for_style(self.style, self.context_join),
            history_window: self.history_window.into(),
            generation_timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub knowledge_base: PathBuf,
    pub log_level: String,
    pub generation: LLMConfig,
    pub resolver: ResolverSettings,
    pub suggestions: SuggestionCatalog,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            knowledge_base: PathBuf::from("knowledge_base.jsonl"),
            log_level: "warn".to_string(),
            generation: LLMConfig::default(),
            resolver: ResolverSettings::default(),
            suggestions: SuggestionCatalog::default(),
        }
    }
}

impl AppConfig {
    /// Reads a TOML config file; a missing file means all defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = match read_optional(path)? {
            Some(text) => Self::from_toml(&text)?,
            None => {
                debug!(path = %path.display(), "No config file; using defaults");
                Self::default()
            }
        };
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// A non-empty credential from the environment replaces the configured one.
    pub fn apply_api_key(&mut self, env_key: Option<String>) {
        if let Some(key) = env_key.filter(|k| !k.trim().is_empty()) {
            self.generation.api_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.resolver.top_k == 0 {
            return Err(ChatError::Config("resolver.top_k must be at least 1".to_string()));
        }
        if self.generation.model.trim().is_empty() {
            return Err(ChatError::Config("generation.model must not be empty".to_string()));
        }
        Ok(())
    }
}

/// `$XDG_CONFIG_HOME/ravigpt/config.toml` or the platform equivalent.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("ravigpt").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("ravigpt.toml"))
}
