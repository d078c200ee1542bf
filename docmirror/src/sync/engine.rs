use std::io;
use std::path::PathBuf;

use docmirror_core::{DriveError, DriveFile};
use thiserror::Error;

use super::convert::Converter;
use super::paths::{child_label, sanitize_name};
use super::remote::DriveRemote;
use super::resolver::{ResolveError, resolve_folder_path};
use crate::config::{ExportFormat, RootTarget, SyncRoot};
use crate::report::ConversionRecord;
use crate::state::{StateStore, SyncState};

#[derive(Debug, Error)]
enum ScanError {
    #[error("listing failed: {0}")]
    Listing(#[from] DriveError),
    #[error("failed to create {path}: {source}")]
    LocalDir { path: PathBuf, source: io::Error },
}

/// One folder still to be visited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub folder_id: String,
    pub local_dir: PathBuf,
    pub label: String,
    pub formats: Vec<ExportFormat>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub folders_visited: usize,
    pub converted: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub folder_errors: usize,
    pub state_saves: usize,
}

pub struct SyncEngine {
    remote: DriveRemote,
    converter: Converter,
    store: StateStore,
    state: SyncState,
    dry_run: bool,
    stats: SyncStats,
}

impl SyncEngine {
    pub fn new(remote: DriveRemote, store: StateStore, state: SyncState, dry_run: bool) -> Self {
        Self {
            converter: Converter::new(remote.clone()),
            remote,
            store,
            state,
            dry_run,
            stats: SyncStats::default(),
        }
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Mirrors one configured root. Roots given by path are resolved first;
    /// a resolution failure is returned so the caller can skip the root.
    pub async fn sync_root(
        &mut self,
        root: &SyncRoot,
        converted: &mut Vec<ConversionRecord>,
    ) -> Result<(), ResolveError> {
        let folder_id = match &root.target {
            RootTarget::Id(id) => id.clone(),
            RootTarget::Path(path) => resolve_folder_path(&self.remote, path).await?,
        };
        tracing::info!(
            "syncing `{}` ({folder_id}) into {}",
            root.display_name,
            root.local_dir.display()
        );
        self.scan(
            ScanRequest {
                folder_id,
                local_dir: root.local_dir.clone(),
                label: root.display_name.clone(),
                formats: root.formats.clone(),
            },
            converted,
        )
        .await;
        Ok(())
    }

    /// Depth-first, pre-order walk: a folder's documents are handled before
    /// any of its subfolders is entered.
    pub async fn scan(&mut self, request: ScanRequest, converted: &mut Vec<ConversionRecord>) {
        let mut stack = vec![request];
        while let Some(request) = stack.pop() {
            match self.visit_folder(&request, converted).await {
                Ok(children) => stack.extend(children.into_iter().rev()),
                Err(err) => {
                    self.stats.folder_errors += 1;
                    tracing::error!(
                        "skipping folder `{}` ({}): {err}",
                        request.label,
                        request.folder_id
                    );
                }
            }
        }
    }

    async fn visit_folder(
        &mut self,
        request: &ScanRequest,
        converted: &mut Vec<ConversionRecord>,
    ) -> Result<Vec<ScanRequest>, ScanError> {
        self.stats.folders_visited += 1;
        self.ensure_local_dir(request).await?;

        let documents = self.remote.list_documents(&request.folder_id).await?;
        tracing::debug!(
            "`{}`: {} document(s) listed",
            request.label,
            documents.len()
        );
        for document in &documents {
            self.process_document(document, request, converted).await;
        }

        let folders = self.remote.list_folders(&request.folder_id).await?;
        Ok(folders
            .into_iter()
            .map(|folder| ScanRequest {
                local_dir: request.local_dir.join(sanitize_name(&folder.name)),
                label: child_label(&request.label, &folder.name),
                folder_id: folder.id,
                formats: request.formats.clone(),
            })
            .collect())
    }

    async fn ensure_local_dir(&self, request: &ScanRequest) -> Result<(), ScanError> {
        if self.dry_run {
            if !request.local_dir.exists() {
                tracing::info!(
                    "would create directory {} (dry run)",
                    request.local_dir.display()
                );
            }
            return Ok(());
        }
        tokio::fs::create_dir_all(&request.local_dir)
            .await
            .map_err(|source| ScanError::LocalDir {
                path: request.local_dir.clone(),
                source,
            })
    }

    async fn process_document(
        &mut self,
        document: &DriveFile,
        request: &ScanRequest,
        converted: &mut Vec<ConversionRecord>,
    ) {
        let modified = document.modified_time.as_deref();
        if modified.is_some() && self.state.get(&document.id).map(String::as_str) == modified {
            self.stats.unchanged += 1;
            tracing::info!("`{}` unchanged, skipping", document.name);
            return;
        }

        let ok = self
            .converter
            .convert(
                &document.id,
                &document.name,
                &request.local_dir,
                &request.formats,
                self.dry_run,
            )
            .await;
        if !ok {
            self.stats.failed += 1;
            return;
        }

        self.stats.converted += 1;
        converted.extend(
            Converter::output_file_names(&document.name, &request.formats)
                .into_iter()
                .map(|file_name| ConversionRecord::from((request.label.as_str(), file_name))),
        );

        if self.dry_run {
            return;
        }
        let Some(modified) = modified else {
            return;
        };
        self.state.insert(document.id.clone(), modified.to_string());
        match self.store.save(&self.state).await {
            Ok(()) => self.stats.state_saves += 1,
            Err(err) => tracing::error!("failed to save sync state: {err}"),
        }
    }
}
