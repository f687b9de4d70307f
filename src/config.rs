use crate::terminate::{DEFAULT_ATTEMPTS, DEFAULT_INTERVAL_MS};
use crate::toolchain::ToolchainVersion;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_LAUNCHER: &str = "xcrun";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TerminateSettings {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_attempts() -> u32 {
    DEFAULT_ATTEMPTS
}

fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_MS
}

impl Default for TerminateSettings {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            interval_ms: DEFAULT_INTERVAL_MS,
        }
    }
}

impl TerminateSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Settings {
    pub toolchain_version: Option<String>,
    pub launcher: Option<String>,
    pub terminate: TerminateSettings,
}

impl Settings {
    pub fn launcher(&self) -> &str {
        self.launcher.as_deref().unwrap_or(DEFAULT_LAUNCHER)
    }

    pub fn toolchain_version(&self) -> Result<Option<ToolchainVersion>, ConfigError> {
        self.toolchain_version
            .as_deref()
            .map(|v| {
                v.parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        field: "toolchain_version".to_string(),
                        value: v.to_string(),
                    })
            })
            .transpose()
    }
}

#[derive(Debug, Deserialize)]
struct RawSettings {
    toolchain_version: Option<String>,
    launcher: Option<String>,
    terminate: Option<TerminateSettings>,
    #[serde(flatten)]
    extra: HashMap<String, toml::Value>,
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("TOML parse error: {0}")]
    TomlParse(String),
    #[error("unknown setting `{field}`")]
    UnknownField { field: String },
    #[error("invalid value for `{field}`: {value}")]
    InvalidValue { field: String, value: String },
    #[error("{0}")]
    IoError(String),
}

/// Reads settings from `path`; a missing file yields the defaults.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Settings::default()),
        Err(e) => return Err(ConfigError::IoError(format!("{}: {}", path.display(), e))),
    };
    parse_settings(&content)
}

pub fn parse_settings(content: &str) -> Result<Settings, ConfigError> {
    let raw: RawSettings =
        toml::from_str(content).map_err(|e| ConfigError::TomlParse(e.to_string()))?;

    if let Some(field) = raw.extra.keys().min() {
        return Err(ConfigError::UnknownField {
            field: field.clone(),
        });
    }

    let settings = Settings {
        toolchain_version: raw.toolchain_version,
        launcher: raw.launcher,
        terminate: raw.terminate.unwrap_or_default(),
    };
    settings.toolchain_version()?;
    if settings.terminate.attempts == 0 {
        return Err(ConfigError::InvalidValue {
            field: "terminate.attempts".to_string(),
            value: "0".to_string(),
        });
    }
    Ok(settings)
}
