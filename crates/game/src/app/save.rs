use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use adventure_engine::SessionSnapshot;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

const SAVE_VERSION: u32 = 1;
const SAVE_EXTENSION: &str = "save.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SaveFile {
    save_version: u32,
    snapshot: SessionSnapshot,
}

#[derive(Debug, Error)]
pub(crate) enum SaveError {
    #[error("save name '{0}' must be non-empty and use only letters, digits, '_' or '-'")]
    InvalidName(String),
    #[error("failed to access save '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode save: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("invalid save '{path}' at {field_path}: {source}")]
    Decode {
        path: PathBuf,
        field_path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("save '{path}' has version {actual}, expected {expected}")]
    Version {
        path: PathBuf,
        expected: u32,
        actual: u32,
    },
}

pub(crate) fn save_path(save_dir: &Path, name: &str) -> Result<PathBuf, SaveError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
    if !valid {
        return Err(SaveError::InvalidName(name.to_string()));
    }
    Ok(save_dir.join(format!("{name}.{SAVE_EXTENSION}")))
}

pub(crate) fn write_snapshot(
    save_dir: &Path,
    name: &str,
    snapshot: &SessionSnapshot,
) -> Result<PathBuf, SaveError> {
    let path = save_path(save_dir, name)?;
    fs::create_dir_all(save_dir).map_err(|source| SaveError::Io {
        path: save_dir.to_path_buf(),
        source,
    })?;
    let save = SaveFile {
        save_version: SAVE_VERSION,
        snapshot: snapshot.clone(),
    };
    let json = serde_json::to_string_pretty(&save).map_err(SaveError::Encode)?;
    fs::write(&path, json).map_err(|source| SaveError::Io {
        path: path.clone(),
        source,
    })?;
    info!(path = %path.display(), room = ?snapshot.active_room, "snapshot_saved");
    Ok(path)
}

pub(crate) fn read_snapshot(save_dir: &Path, name: &str) -> Result<SessionSnapshot, SaveError> {
    let path = save_path(save_dir, name)?;
    let raw = fs::read_to_string(&path).map_err(|source| SaveError::Io {
        path: path.clone(),
        source,
    })?;
    let save = parse_save_file(&path, &raw)?;
    if save.save_version != SAVE_VERSION {
        return Err(SaveError::Version {
            path,
            expected: SAVE_VERSION,
            actual: save.save_version,
        });
    }
    info!(path = %path.display(), "snapshot_loaded");
    Ok(save.snapshot)
}

fn parse_save_file(path: &Path, raw: &str) -> Result<SaveFile, SaveError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, SaveFile>(&mut deserializer).map_err(|error| {
        let field_path = error.path().to_string();
        SaveError::Decode {
            path: path.to_path_buf(),
            field_path,
            source: error.into_inner(),
        }
    })
}
