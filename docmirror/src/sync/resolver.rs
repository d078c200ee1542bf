use docmirror_core::DriveError;
use thiserror::Error;

use super::remote::DriveRemote;

/// Alias Drive accepts for the id of "My Drive".
pub const ROOT_FOLDER_ID: &str = "root";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("folder `{segment}` of path `{path}` not found")]
    FolderNotFound { path: String, segment: String },
    #[error("listing failed while resolving folder path: {0}")]
    Api(#[from] DriveError),
}

/// Walks `path` segment by segment from the drive root and returns the id of
/// the last folder. One listing call per non-empty segment.
pub async fn resolve_folder_path(remote: &DriveRemote, path: &str) -> Result<String, ResolveError> {
    let mut current = ROOT_FOLDER_ID.to_string();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let matches = remote.find_folders(&current, segment).await?;
        let Some(first) = matches.first() else {
            return Err(ResolveError::FolderNotFound {
                path: path.to_string(),
                segment: segment.to_string(),
            });
        };
        if matches.len() > 1 {
            tracing::warn!(
                "{} folders named `{segment}` in `{path}`, using {}",
                matches.len(),
                first.id
            );
        }
        current = first.id.clone();
    }
    Ok(current)
}
