//! Configuration loading and validation for Loregate.
//!
//! Loads `loregate.toml` from the working directory (or an explicit path)
//! and applies environment-variable overrides: `OPENAI_BASE_URL`,
//! `OPENAI_API_KEY`, `OPENAI_MODEL`, `LOREGATE_HOST`, `LOREGATE_PORT`,
//! `LOREGATE_CHARACTERS_DIR`. Every field has a default, so a missing file
//! is not an error — only `serve` requires the upstream section to be
//! complete.

use loregate_core::CardSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The root configuration structure. Maps directly to `loregate.toml`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Upstream completion endpoint.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// HTTP listener settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Prompt-assembly defaults applied to every request.
    #[serde(default)]
    pub chat: ChatConfig,
}

/// OpenAI-compatible upstream endpoint settings.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`.
    #[serde(default)]
    pub base_url: String,

    /// Bearer token for the endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model identifier passed through verbatim.
    #[serde(default)]
    pub model: String,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding `<id>.json` character cards.
    #[serde(default = "default_characters_dir")]
    pub characters_dir: PathBuf,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_characters_dir() -> PathBuf {
    "characters".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            characters_dir: default_characters_dir(),
        }
    }
}

/// Prompt-assembly defaults; mirrors [`CardSettings`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_persona: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_main_chat: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_example_chat: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_sensitive: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_whole_words: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_depth: Option<u32>,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

impl AppConfig {
    /// Load configuration: explicit path, or `loregate.toml` if present, or
    /// pure defaults — then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new("loregate.toml");
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&raw)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("OPENAI_BASE_URL") {
            self.upstream.base_url = v;
        }
        if let Ok(v) = std::env::var("OPENAI_API_KEY") {
            self.upstream.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("OPENAI_MODEL") {
            self.upstream.model = v;
        }
        if let Ok(v) = std::env::var("LOREGATE_HOST") {
            self.gateway.host = v;
        }
        if let Ok(v) = std::env::var("LOREGATE_PORT") {
            if let Ok(port) = v.parse() {
                self.gateway.port = port;
            }
        }
        if let Ok(v) = std::env::var("LOREGATE_CHARACTERS_DIR") {
            self.gateway.characters_dir = v.into();
        }
    }

    /// Check that the upstream section is complete enough to serve.
    pub fn validate_for_serving(&self) -> Result<(), ConfigError> {
        if self.upstream.base_url.is_empty() {
            return Err(ConfigError::Missing("upstream.base_url (OPENAI_BASE_URL)"));
        }
        if self.upstream.api_key.as_deref().unwrap_or("").is_empty() {
            return Err(ConfigError::Missing("upstream.api_key (OPENAI_API_KEY)"));
        }
        if self.upstream.model.is_empty() {
            return Err(ConfigError::Missing("upstream.model (OPENAI_MODEL)"));
        }
        Ok(())
    }

    /// Build the per-request settings record from the chat section.
    pub fn card_settings(&self) -> CardSettings {
        let defaults = CardSettings::default();
        let chat = &self.chat;
        CardSettings {
            user_name: chat.user_name.clone().unwrap_or(defaults.user_name),
            user_persona: chat.user_persona.clone().unwrap_or(defaults.user_persona),
            new_main_chat: chat.new_main_chat.clone().unwrap_or(defaults.new_main_chat),
            new_example_chat: chat
                .new_example_chat
                .clone()
                .unwrap_or(defaults.new_example_chat),
            case_sensitive: chat.case_sensitive.unwrap_or(defaults.case_sensitive),
            match_whole_words: chat.match_whole_words.unwrap_or(defaults.match_whole_words),
            scan_depth: chat.scan_depth.or(defaults.scan_depth),
        }
    }
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("upstream", &self.upstream)
            .field("gateway", &self.gateway)
            .field("chat", &self.chat)
            .finish()
    }
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .finish()
    }
}
