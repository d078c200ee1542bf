use std::io;
use std::path::{Path, PathBuf};

use docmirror_core::{OAuthClient, OAuthError};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error(
        "OAuth client credentials not found at {0}; download them from the Google Cloud console"
    )]
    NotFound(PathBuf),
    #[error("failed to read credentials file {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("credentials file {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("credentials file has neither an \"installed\" nor a \"web\" section")]
    MissingClient,
    #[error("oauth client setup failed: {0}")]
    OAuth(#[from] OAuthError),
}

/// OAuth client registration, as downloaded from the Google Cloud console.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn load(path: &Path) -> Result<Self, CredentialsError> {
        Self::load_optional(path)?.ok_or_else(|| CredentialsError::NotFound(path.to_path_buf()))
    }

    pub fn load_optional(path: &Path) -> Result<Option<Self>, CredentialsError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CredentialsError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_json(&text).map(Some).map_err(|err| match err {
            CredentialsError::Malformed { source, .. } => CredentialsError::Malformed {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, CredentialsError> {
        let file: CredentialsFile =
            serde_json::from_str(text).map_err(|source| CredentialsError::Malformed {
                path: PathBuf::new(),
                source,
            })?;
        file.installed
            .or(file.web)
            .ok_or(CredentialsError::MissingClient)
    }

    pub fn oauth_client(&self) -> Result<OAuthClient, CredentialsError> {
        Ok(OAuthClient::with_endpoints(
            &self.auth_uri,
            &self.token_uri,
            &self.client_id,
            &self.client_secret,
        )?)
    }
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}
