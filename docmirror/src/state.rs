use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::sync::paths::partial_path;

/// Document id -> `modifiedTime` recorded at its last successful conversion.
pub type SyncState = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read state file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("state file {path} is corrupt: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write state file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<SyncState, StateError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(SyncState::new()),
            Err(source) => {
                return Err(StateError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_str(&text).map_err(|source| StateError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Rewrites the whole state file. The new content goes to a sibling
    /// `.partial` file first and is renamed over the old one.
    pub async fn save(&self, state: &SyncState) -> Result<(), StateError> {
        let json = serde_json::to_string_pretty(state)?;
        let write_err = |source| StateError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let partial = partial_path(&self.path);
        tokio::fs::write(&partial, json).await.map_err(write_err)?;
        tokio::fs::rename(&partial, &self.path)
            .await
            .map_err(write_err)
    }
}
