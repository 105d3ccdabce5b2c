use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use adventure_engine::{LoopConfig, SessionConfig};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

pub(crate) const CONFIG_FILE_NAME: &str = "config.json";

/// Optional `config.json` at the project root. Missing fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub(crate) struct GameConfig {
    pub(crate) session: SessionConfig,
    pub(crate) target_tps: u32,
    pub(crate) max_ticks: Option<u64>,
    pub(crate) realtime: bool,
    /// Fixed seed for key placement; `None` picks a fresh one each run.
    pub(crate) key_seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        let loop_defaults = LoopConfig::default();
        Self {
            session: SessionConfig::default(),
            target_tps: loop_defaults.target_tps,
            max_ticks: loop_defaults.max_ticks,
            realtime: loop_defaults.realtime,
            key_seed: None,
        }
    }
}

impl GameConfig {
    pub(crate) fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            target_tps: self.target_tps,
            max_ticks: self.max_ticks,
            realtime: self.realtime,
            ..LoopConfig::default()
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config '{path}' at {field_path}: {source}")]
    Parse {
        path: PathBuf,
        field_path: String,
        #[source]
        source: serde_json::Error,
    },
}

pub(crate) fn load_game_config(root: &Path) -> Result<GameConfig, ConfigError> {
    let path = root.join(CONFIG_FILE_NAME);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config_missing_using_defaults");
            return Ok(GameConfig::default());
        }
        Err(source) => return Err(ConfigError::Read { path, source }),
    };
    let config = parse_game_config(&path, &raw)?;
    info!(path = %path.display(), "config_loaded");
    Ok(config)
}

fn parse_game_config(path: &Path, raw: &str) -> Result<GameConfig, ConfigError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, GameConfig>(&mut deserializer).map_err(|error| {
        let field_path = error.path().to_string();
        ConfigError::Parse {
            path: path.to_path_buf(),
            field_path,
            source: error.into_inner(),
        }
    })
}
