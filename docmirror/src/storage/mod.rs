mod credentials;
mod token_storage;

use docmirror_core::OAuthToken;
use serde::{Deserialize, Serialize};

pub use credentials::{ClientSecrets, CredentialsError};
pub use token_storage::{StorageError, TokenStorage};

/// Token material kept between runs. `expires_at` is a unix timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthState {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl OAuthState {
    pub fn from_oauth_token(token: &OAuthToken) -> Self {
        Self {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: token
                .expires_in
                .map(|secs| now_unix().saturating_add(secs as i64)),
            scope: token.scope.clone(),
            token_type: Some(token.token_type.clone()),
        }
    }
}

pub(crate) fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
