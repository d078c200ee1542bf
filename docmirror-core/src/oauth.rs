use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("token request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
    #[error("token endpoint returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

/// Google OAuth endpoints for an installed-application client.
#[derive(Clone)]
pub struct OAuthClient {
    http: Client,
    auth_url: Url,
    token_url: Url,
    client_id: String,
    client_secret: String,
}

impl OAuthClient {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, OAuthError> {
        Self::with_endpoints(DEFAULT_AUTH_URL, DEFAULT_TOKEN_URL, client_id, client_secret)
    }

    /// Endpoints come from the `auth_uri` and `token_uri` of a downloaded
    /// client secrets file, or from a mock server in tests.
    pub fn with_endpoints(
        auth_url: &str,
        token_url: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, OAuthError> {
        Ok(Self {
            http: Client::new(),
            auth_url: Url::parse(auth_url)?,
            token_url: Url::parse(token_url)?,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        })
    }

    /// Consent URL. Offline access is requested so the token response
    /// carries a refresh token.
    pub fn authorize_url(&self, redirect_uri: &str, scope: &str, state: Option<&str>) -> Url {
        let mut url = self.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", scope)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .extend_pairs(state.map(|state| ("state", state)));
        url
    }

    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthToken, OAuthError> {
        let fields = [("code", code), ("redirect_uri", redirect_uri)];
        self.request_token("authorization_code", &fields).await
    }

    /// Google keeps the refresh token valid, so the response usually
    /// carries only a new access token.
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
        scope: Option<&str>,
    ) -> Result<OAuthToken, OAuthError> {
        let mut fields = vec![("refresh_token", refresh_token)];
        fields.extend(scope.map(|scope| ("scope", scope)));
        self.request_token("refresh_token", &fields).await
    }

    async fn request_token(
        &self,
        grant_type: &str,
        fields: &[(&str, &str)],
    ) -> Result<OAuthToken, OAuthError> {
        let mut form = vec![("grant_type", grant_type)];
        form.extend_from_slice(fields);
        form.push(("client_id", self.client_id.as_str()));
        form.push(("client_secret", self.client_secret.as_str()));

        let response = self
            .http
            .post(self.token_url.clone())
            .form(&form)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::Api { status, body });
        }
        Ok(response.json::<OAuthToken>().await?)
    }
}

/// Token endpoint response. Refresh responses usually omit `refresh_token`.
#[derive(Debug, Deserialize, Serialize)]
pub struct OAuthToken {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}
