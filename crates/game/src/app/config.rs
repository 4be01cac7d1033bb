//! Startup configuration.
//!
//! Values come from an optional JSON file, then `RAILRUSH_*` environment
//! variables override field by field. A missing file is fine; a present but
//! malformed file is a startup error with the JSON path that failed.

use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use session::NetRate;
use thiserror::Error;
use tracing::info;

pub(crate) const DEFAULT_CONFIG_FILE: &str = "railrush.json";
const ENV_PREFIX: &str = "RAILRUSH_";

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("read config '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("parse config json: {0}")]
    Parse(String),
    #[error("parse config json at {path}: {source}")]
    ParseAt {
        path: String,
        source: serde_json::Error,
    },
    #[error("invalid value for {var}: '{value}'")]
    EnvValue { var: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct GameConfig {
    pub(crate) player_name: String,
    pub(crate) listen_port: u16,
    pub(crate) directory_url: Option<String>,
    /// Host approves join requests without prompting.
    pub(crate) auto_join: bool,
    pub(crate) net_rate: NetRate,
    pub(crate) max_players: usize,
    pub(crate) seed: Option<String>,
    /// Peer address to join instead of hosting.
    pub(crate) join: Option<String>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            player_name: "courier".to_string(),
            listen_port: 4600,
            directory_url: None,
            auto_join: true,
            net_rate: NetRate::default(),
            max_players: 4,
            seed: None,
            join: None,
        }
    }
}

impl GameConfig {
    /// Loads the file (if any), then applies env overrides.
    pub(crate) fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = match fs::read_to_string(path) {
            Ok(raw) => Self::parse_json(&raw)?,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "config_file_absent_using_defaults");
                Self::default()
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        config.apply_env_overrides(|var| env::var(var).ok())?;
        Ok(config)
    }

    fn parse_json(raw: &str) -> Result<Self, ConfigError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        match serde_path_to_error::deserialize::<_, GameConfig>(&mut deserializer) {
            Ok(config) => Ok(config),
            Err(error) => {
                let path = error.path().to_string();
                let source = error.into_inner();
                if path.is_empty() || path == "." {
                    Err(ConfigError::Parse(source.to_string()))
                } else {
                    Err(ConfigError::ParseAt { path, source })
                }
            }
        }
    }

    fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| format!("{ENV_PREFIX}{suffix}");

        if let Some(value) = lookup(&var("PLAYER_NAME")) {
            self.player_name = value;
        }
        if let Some(value) = lookup(&var("LISTEN_PORT")) {
            self.listen_port = value.parse().map_err(|_| ConfigError::EnvValue {
                var: var("LISTEN_PORT"),
                value,
            })?;
        }
        if let Some(value) = lookup(&var("DIRECTORY_URL")) {
            self.directory_url = if value.is_empty() { None } else { Some(value) };
        }
        if let Some(value) = lookup(&var("AUTO_JOIN")) {
            self.auto_join = parse_bool(&value).ok_or_else(|| ConfigError::EnvValue {
                var: var("AUTO_JOIN"),
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(&var("NET_RATE")) {
            self.net_rate = parse_net_rate(&value).ok_or_else(|| ConfigError::EnvValue {
                var: var("NET_RATE"),
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(&var("MAX_PLAYERS")) {
            self.max_players = value.parse().map_err(|_| ConfigError::EnvValue {
                var: var("MAX_PLAYERS"),
                value,
            })?;
        }
        if let Some(value) = lookup(&var("SEED")) {
            self.seed = if value.is_empty() { None } else { Some(value) };
        }
        if let Some(value) = lookup(&var("JOIN")) {
            self.join = if value.is_empty() { None } else { Some(value) };
        }
        Ok(())
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_net_rate(raw: &str) -> Option<NetRate> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "low" => Some(NetRate::Low),
        "medium" => Some(NetRate::Medium),
        "high" => Some(NetRate::High),
        _ => None,
    }
}
