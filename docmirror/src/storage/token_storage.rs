use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::OAuthState;
use crate::sync::paths::partial_path;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to access token file {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("token file {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to serialize token: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// OAuth token persisted as JSON next to the other working files.
#[derive(Debug, Clone)]
pub struct TokenStorage {
    path: PathBuf,
}

impl TokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `None` when no token has been saved yet.
    pub fn get_token(&self) -> Result<Option<OAuthState>, StorageError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(self.io_error(source)),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| StorageError::Malformed {
                path: self.path.clone(),
                source,
            })
    }

    pub fn save_token(&self, state: &OAuthState) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(state)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }
        let partial = partial_path(&self.path);
        std::fs::write(&partial, json).map_err(|source| self.io_error(source))?;
        std::fs::rename(&partial, &self.path).map_err(|source| self.io_error(source))
    }

    pub fn delete_token(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.io_error(source)),
        }
    }

    pub fn has_token(&self) -> bool {
        self.path.is_file()
    }

    fn io_error(&self, source: io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
