//! Configuration system for BrainBox.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from the user config directory (`config.toml`) and/or
//! `.brainbox/config.toml` in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::ConfigError;

/// Top-level configuration for the BrainBox client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub backend: BackendConfig,
    pub stream: StreamConfig,
    pub session: SessionConfig,
}

/// Where the backend lives and how to reach it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend, without a trailing slash.
    pub base_url: String,
    /// Path of the streaming chat endpoint.
    pub chat_path: String,
    /// Timeout for establishing a connection, in seconds.
    pub connect_timeout_secs: u64,
    /// Bearer token for authenticated endpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            chat_path: "/chat".to_string(),
            connect_timeout_secs: 10,
            token: None,
        }
    }
}

impl BackendConfig {
    /// Full URL of the chat endpoint.
    pub fn chat_url(&self) -> String {
        join_url(&self.base_url, &self.chat_path)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// How streamed responses are paced and parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Delay between emitted characters, in milliseconds. 0 disables pacing.
    pub char_delay_ms: u64,
    /// Language tag of the fenced block extracted as the code example.
    pub code_language: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            char_delay_ms: 20,
            code_language: "python".to_string(),
        }
    }
}

impl StreamConfig {
    pub fn char_delay(&self) -> Duration {
        Duration::from_millis(self.char_delay_ms)
    }
}

/// Identity used when none comes from a login flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl ClientConfig {
    /// Reject values that would make every request fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = url::Url::parse(&self.backend.base_url).map_err(|e| ConfigError::Invalid {
            message: format!("backend.base_url '{}': {}", self.backend.base_url, e),
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                message: format!("backend.base_url must be http(s), got '{}'", base.scheme()),
            });
        }
        if !self.backend.chat_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                message: "backend.chat_path must start with '/'".to_string(),
            });
        }
        if self.stream.code_language.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "stream.code_language must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Render as TOML for display.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Load configuration by merging all sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `BRAINBOX_`)
/// 3. Workspace-local config (`.brainbox/config.toml`)
/// 4. User config (`<config dir>/brainbox/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&ClientConfig>,
) -> Result<ClientConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(ClientConfig::default()));

    // User-level config
    if let Some(user_config) = user_config_path().filter(|path| path.exists()) {
        figment = figment.merge(Toml::file(&user_config));
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".brainbox").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    extract(figment, overrides)
}

/// Load configuration from one explicit file, still honouring the environment.
pub fn load_config_file(
    path: &Path,
    overrides: Option<&ClientConfig>,
) -> Result<ClientConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let figment =
        Figment::from(Serialized::defaults(ClientConfig::default())).merge(Toml::file(path));
    extract(figment, overrides)
}

/// The user-level config file, when the platform has a config directory.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "brainbox", "brainbox")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Record a login in the config file at `path`.
///
/// Sets `backend.token` and `session.user_id`; every other key already in the
/// file is kept. The file and its directory are created when missing.
pub fn store_login(path: &Path, username: &str, token: &str) -> Result<(), ConfigError> {
    let io_error = |e: std::io::Error| ConfigError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let mut doc = if path.exists() {
        let text = std::fs::read_to_string(path).map_err(io_error)?;
        text.parse::<toml::Table>()
            .map_err(|e| ConfigError::ParseError {
                message: format!("{}: {}", path.display(), e),
            })?
    } else {
        toml::Table::new()
    };
    set_string(&mut doc, "backend", "token", token)?;
    set_string(&mut doc, "session", "user_id", username)?;

    let text = toml::to_string_pretty(&doc).map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    std::fs::write(path, text).map_err(io_error)?;
    debug!(path = %path.display(), "Stored login in config");
    Ok(())
}

fn set_string(
    doc: &mut toml::Table,
    section: &str,
    key: &str,
    value: &str,
) -> Result<(), ConfigError> {
    let entry = doc
        .entry(section)
        .or_insert_with(|| toml::Value::Table(toml::Table::new()));
    let Some(table) = entry.as_table_mut() else {
        return Err(ConfigError::Invalid {
            message: format!("'{section}' must be a table"),
        });
    };
    table.insert(key.to_string(), toml::Value::String(value.to_string()));
    Ok(())
}

fn extract(
    mut figment: Figment,
    overrides: Option<&ClientConfig>,
) -> Result<ClientConfig, ConfigError> {
    // Environment variables (BRAINBOX_BACKEND__BASE_URL, BRAINBOX_STREAM__CHAR_DELAY_MS, etc.)
    figment = figment.merge(Env::prefixed("BRAINBOX_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: ClientConfig = figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}
