use std::path::PathBuf;
use std::time::Duration;

use docmirror_core::{OAuthClient, OAuthError};
use thiserror::Error;

use crate::oauth_flow::{OAuthFlow, OAuthFlowError};
use crate::storage::{
    ClientSecrets, CredentialsError, OAuthState, StorageError, TokenStorage, now_unix,
};

/// Tokens this close to expiry are refreshed before use.
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum TokenProviderError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    #[error("saved token expired and {0} is missing; it is needed to refresh the token")]
    RefreshNeedsCredentials(PathBuf),
    #[error("failed to refresh access token: {0}")]
    Refresh(#[source] OAuthError),
    #[error("authorization failed: {0}")]
    Authorization(#[from] OAuthFlowError),
}

/// What a saved token still allows without user interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SavedToken {
    Usable(String),
    Refreshable(String),
    Unusable,
}

impl SavedToken {
    fn classify(state: &OAuthState, now: i64) -> Self {
        let expiring = state
            .expires_at
            .is_some_and(|expires_at| expires_at <= now.saturating_add(REFRESH_MARGIN_SECS));
        match (expiring, &state.refresh_token) {
            (false, _) => Self::Usable(state.access_token.clone()),
            (true, Some(refresh_token)) => Self::Refreshable(refresh_token.clone()),
            (true, None) => Self::Unusable,
        }
    }
}

/// Owns the token file and everything that can replace its contents:
/// refreshing an expiring token and the browser consent flow. Client
/// secrets are read only when one of those needs them.
pub struct TokenProvider {
    storage: TokenStorage,
    credentials_path: PathBuf,
    oauth_timeout: Duration,
}

impl TokenProvider {
    pub fn new(
        storage: TokenStorage,
        credentials_path: impl Into<PathBuf>,
        oauth_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            credentials_path: credentials_path.into(),
            oauth_timeout,
        }
    }

    /// Returns a token that is valid for at least another minute. Any new
    /// token is written to the token file before it is returned.
    pub async fn access_token(&self) -> Result<String, TokenProviderError> {
        let Some(saved) = self.storage.get_token()? else {
            tracing::info!("no saved token, starting authorization");
            return self.authorize().await;
        };
        match SavedToken::classify(&saved, now_unix()) {
            SavedToken::Usable(token) => Ok(token),
            SavedToken::Refreshable(refresh_token) => self.refresh(&saved, refresh_token).await,
            SavedToken::Unusable => {
                tracing::warn!("saved token expired and cannot be refreshed, re-authorizing");
                self.authorize().await
            }
        }
    }

    async fn refresh(
        &self,
        saved: &OAuthState,
        refresh_token: String,
    ) -> Result<String, TokenProviderError> {
        let client = match ClientSecrets::load(&self.credentials_path) {
            Ok(secrets) => secrets.oauth_client()?,
            Err(CredentialsError::NotFound(path)) => {
                return Err(TokenProviderError::RefreshNeedsCredentials(path));
            }
            Err(err) => return Err(err.into()),
        };
        tracing::debug!("access token expires soon, refreshing");
        let token = client
            .refresh_token(&refresh_token, saved.scope.as_deref())
            .await
            .map_err(TokenProviderError::Refresh)?;

        let mut refreshed = OAuthState::from_oauth_token(&token);
        refreshed.refresh_token.get_or_insert(refresh_token);
        if refreshed.scope.is_none() {
            refreshed.scope.clone_from(&saved.scope);
        }
        self.storage.save_token(&refreshed)?;
        Ok(refreshed.access_token)
    }

    async fn authorize(&self) -> Result<String, TokenProviderError> {
        let client = self.oauth_client()?;
        let token = OAuthFlow::new(client, self.oauth_timeout)
            .authenticate()
            .await?;
        let state = OAuthState::from_oauth_token(&token);
        self.storage.save_token(&state)?;
        tracing::info!(
            "authorization complete, token saved to {}",
            self.storage.path().display()
        );
        Ok(state.access_token)
    }

    fn oauth_client(&self) -> Result<OAuthClient, CredentialsError> {
        ClientSecrets::load(&self.credentials_path)?.oauth_client()
    }
}
