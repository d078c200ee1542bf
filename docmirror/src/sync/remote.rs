use std::time::Duration;

use docmirror_core::{DriveClient, DriveError, DriveFile, FileQuery};

use super::backoff::Backoff;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Drive calls the sync engine needs, each retried on transient failures.
#[derive(Clone)]
pub struct DriveRemote {
    client: DriveClient,
    backoff: Backoff,
    max_attempts: u32,
}

impl DriveRemote {
    pub fn new(client: DriveClient) -> Self {
        Self {
            client,
            backoff: Backoff::new(Duration::from_millis(500), Duration::from_secs(10), true),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub async fn list_documents(&self, folder_id: &str) -> Result<Vec<DriveFile>, DriveError> {
        self.list(FileQuery::children_of(folder_id).documents())
            .await
    }

    pub async fn list_folders(&self, folder_id: &str) -> Result<Vec<DriveFile>, DriveError> {
        self.list(FileQuery::children_of(folder_id).folders()).await
    }

    /// Folders named exactly `name` directly under `parent_id`.
    pub async fn find_folders(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<Vec<DriveFile>, DriveError> {
        self.list(FileQuery::children_of(parent_id).folders().named(name))
            .await
    }

    pub async fn export(&self, file_id: &str, mime_type: &str) -> Result<Vec<u8>, DriveError> {
        self.backoff
            .retry(self.max_attempts, "export", || self.client.export(file_id, mime_type))
            .await
    }

    async fn list(&self, query: FileQuery) -> Result<Vec<DriveFile>, DriveError> {
        tracing::debug!("files.list q={}", query.to_filter());
        let list = self
            .backoff
            .retry(self.max_attempts, "listing", || self.client.list_files(&query))
            .await?;
        if list.next_page_token.is_some() {
            tracing::warn!(
                "listing for `{}` was truncated after {} entries",
                query.to_filter(),
                list.files.len()
            );
        }
        Ok(list.files)
    }
}
