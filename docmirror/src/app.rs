use std::io::Write;
use std::time::Duration;

use anyhow::Context;
use docmirror_core::DriveClient;

use crate::config::{AppPaths, Config, read_u64_env};
use crate::report::{ConversionRecord, Reporter};
use crate::state::{StateStore, SyncState};
use crate::storage::TokenStorage;
use crate::sync::remote::DEFAULT_MAX_ATTEMPTS;
use crate::sync::{DriveRemote, SyncEngine};
use crate::token_provider::TokenProvider;

const DEFAULT_OAUTH_TIMEOUT_SECS: u64 = 180;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub dry_run: bool,
    pub max_attempts: u32,
    pub oauth_timeout: Duration,
}

impl RunOptions {
    pub fn from_env(dry_run: bool) -> Self {
        let max_attempts = read_u64_env("DOCMIRROR_MAX_ATTEMPTS", u64::from(DEFAULT_MAX_ATTEMPTS));
        Self {
            dry_run,
            max_attempts: u32::try_from(max_attempts).unwrap_or(u32::MAX),
            oauth_timeout: Duration::from_secs(read_u64_env(
                "DOCMIRROR_OAUTH_TIMEOUT_SECS",
                DEFAULT_OAUTH_TIMEOUT_SECS,
            )),
        }
    }
}

/// Full run: configuration, credentials, every root, then the report.
pub async fn run<W: Write>(
    paths: &AppPaths,
    options: RunOptions,
    out: W,
) -> anyhow::Result<Vec<ConversionRecord>> {
    let cwd = std::env::current_dir().context("current directory is unavailable")?;
    let config = Config::load(&paths.config, &cwd).context("failed to load configuration")?;
    if config.roots.is_empty() {
        tracing::warn!("no usable directories in {}", paths.config.display());
    }

    let store = StateStore::new(&paths.state);
    let state = store.load().await.context("failed to load sync state")?;
    tracing::info!(
        "loaded {} state entries from {}",
        state.len(),
        store.path().display()
    );

    let token = resolve_access_token(paths, options.oauth_timeout).await?;
    let client = DriveClient::new(token).context("failed to build Drive client")?;
    let remote = DriveRemote::new(client).with_max_attempts(options.max_attempts);

    sync_all(remote, &config, store, state, options.dry_run, out).await
}

/// Syncs every root in order. A root that cannot be resolved is skipped.
pub async fn sync_all<W: Write>(
    remote: DriveRemote,
    config: &Config,
    store: StateStore,
    state: SyncState,
    dry_run: bool,
    out: W,
) -> anyhow::Result<Vec<ConversionRecord>> {
    if dry_run {
        tracing::info!("dry run: nothing will be exported or written");
    }
    let mut engine = SyncEngine::new(remote, store, state, dry_run);
    let mut converted = Vec::new();
    for root in &config.roots {
        if let Err(err) = engine.sync_root(root, &mut converted).await {
            tracing::error!("skipping `{}`: {err}", root.display_name);
        }
    }

    let stats = engine.stats();
    tracing::info!(
        "visited {} folder(s): {} converted, {} unchanged, {} failed, {} folder error(s)",
        stats.folders_visited,
        stats.converted,
        stats.unchanged,
        stats.failed,
        stats.folder_errors
    );

    Reporter::new(out)
        .report(&converted, dry_run)
        .context("failed to write report")?;
    Ok(converted)
}

/// Returns a usable access token, refreshing it or running the consent
/// flow as needed.
pub async fn resolve_access_token(
    paths: &AppPaths,
    oauth_timeout: Duration,
) -> anyhow::Result<String> {
    let provider = TokenProvider::new(
        TokenStorage::new(&paths.token),
        &paths.credentials,
        oauth_timeout,
    );
    Ok(provider.access_token().await?)
}

pub fn logout(paths: &AppPaths) -> anyhow::Result<()> {
    let storage = TokenStorage::new(&paths.token);
    let had_token = storage.has_token();
    storage.delete_token()?;
    if had_token {
        tracing::info!("saved token removed");
    } else {
        tracing::info!("no saved token at {}", storage.path().display());
    }
    Ok(())
}
