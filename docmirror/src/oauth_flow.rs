use std::time::Duration;

use docmirror_core::{DRIVE_READONLY_SCOPE, OAuthClient, OAuthError, OAuthToken};
use rand::Rng;
use rand::distributions::Alphanumeric;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

const STATE_LEN: usize = 24;
const READ_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum OAuthFlowError {
    #[error("oauth error: {0}")]
    OAuth(#[from] OAuthError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("authorization code missing in redirect")]
    MissingCode,
    #[error("authorization was denied: {0}")]
    Denied(String),
    #[error("state parameter in redirect does not match")]
    StateMismatch,
    #[error("authorization timed out")]
    Timeout,
}

/// Parameters carried by the browser redirect to the loopback listener.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct RedirectParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Installed-application consent flow with a loopback redirect.
pub struct OAuthFlow {
    client: OAuthClient,
    timeout: Duration,
}

impl OAuthFlow {
    pub fn new(client: OAuthClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub async fn authenticate(&self) -> Result<OAuthToken, OAuthFlowError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let redirect_uri = format!("http://127.0.0.1:{}/", addr.port());
        let state = random_state();
        let url = self
            .client
            .authorize_url(&redirect_uri, DRIVE_READONLY_SCOPE, Some(&state));

        println!("Open this URL in your browser to authorize access to Google Drive:\n{url}");
        tracing::info!(
            "waiting up to {}s for the authorization redirect on {addr}",
            self.timeout.as_secs()
        );

        let (mut stream, _) = tokio::time::timeout(self.timeout, listener.accept())
            .await
            .map_err(|_| OAuthFlowError::Timeout)??;

        let mut request = vec![0u8; 8192];
        let read = tokio::time::timeout(READ_TIMEOUT, stream.read(&mut request))
            .await
            .map_err(|_| OAuthFlowError::Timeout)??;
        let request_text = String::from_utf8_lossy(&request[..read]);
        let params = parse_redirect_request(&request_text).unwrap_or_default();
        let outcome = check_redirect(params, &state);

        let page: &[u8] = if outcome.is_ok() {
            b"HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nConnection: close\r\n\r\n\
            <html><body><h2>Google Drive connected</h2><p>You can close this tab.</p></body></html>"
        } else {
            b"HTTP/1.1 400 Bad Request\r\nContent-Type: text/html; charset=utf-8\r\nConnection: close\r\n\r\n\
            <html><body><h2>Authorization failed</h2><p>Return to the terminal for details.</p></body></html>"
        };
        let _ = stream.write_all(page).await;
        let _ = stream.shutdown().await;

        let code = outcome?;
        Ok(self.client.exchange_code(&code, &redirect_uri).await?)
    }
}

fn random_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_LEN)
        .map(char::from)
        .collect()
}

fn check_redirect(params: RedirectParams, expected_state: &str) -> Result<String, OAuthFlowError> {
    if let Some(error) = params.error {
        return Err(OAuthFlowError::Denied(error));
    }
    if params.state.as_deref() != Some(expected_state) {
        return Err(OAuthFlowError::StateMismatch);
    }
    params.code.ok_or(OAuthFlowError::MissingCode)
}

fn parse_redirect_request(request: &str) -> Option<RedirectParams> {
    let request_line = request.lines().next()?;
    let target = request_line.split_whitespace().nth(1)?;
    let request_url = if target.starts_with("http://") || target.starts_with("https://") {
        Url::parse(target).ok()?
    } else {
        Url::parse(&format!("http://127.0.0.1{target}")).ok()?
    };
    let mut params = RedirectParams::default();
    for (key, value) in request_url.query_pairs() {
        if value.is_empty() {
            continue;
        }
        match key.as_ref() {
            "code" => params.code = Some(value.into_owned()),
            "state" => params.state = Some(value.into_owned()),
            "error" => params.error = Some(value.into_owned()),
            _ => {}
        }
    }
    Some(params)
}
