use std::io;
use std::path::{Path, PathBuf};

use docmirror_core::DriveError;
use htmd::HtmlToMarkdown;
use htmd::options::{HeadingStyle, Options};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use super::paths::{backup_path, output_file_name, output_path, partial_path};
use super::remote::DriveRemote;
use crate::config::ExportFormat;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("export failed: {0}")]
    Export(#[from] DriveError),
    #[error("markdown conversion failed: {0}")]
    Markdown(#[source] io::Error),
    #[error("exported document is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("failed to write {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

/// Exports documents and writes them under their sanitized names.
pub struct Converter {
    remote: DriveRemote,
    markdown: HtmlToMarkdown,
}

impl Converter {
    pub fn new(remote: DriveRemote) -> Self {
        let markdown = HtmlToMarkdown::builder()
            .skip_tags(vec!["script", "style"])
            .options(Options {
                heading_style: HeadingStyle::Atx,
                ..Default::default()
            })
            .build();
        Self { remote, markdown }
    }

    /// Converts one document into every requested format. Failures are
    /// logged; the return value tells whether all formats were written.
    pub async fn convert(
        &self,
        item_id: &str,
        item_name: &str,
        output_dir: &Path,
        formats: &[ExportFormat],
        dry_run: bool,
    ) -> bool {
        if dry_run {
            for &format in formats {
                let target = output_path(output_dir, item_name, format);
                tracing::info!(
                    "would convert `{item_name}` to {} (dry run)",
                    target.display()
                );
                if target.exists() {
                    tracing::info!(
                        "would back up {} to {} (dry run)",
                        target.display(),
                        backup_path(&target).display()
                    );
                }
            }
            return true;
        }

        let mut all_written = true;
        for &format in formats {
            let target = output_path(output_dir, item_name, format);
            match self.convert_one(item_id, output_dir, &target, format).await {
                Ok(()) => tracing::info!("converted `{item_name}` to {}", target.display()),
                Err(err) => {
                    tracing::error!("failed to convert `{item_name}` to {format}: {err}");
                    all_written = false;
                }
            }
        }
        all_written
    }

    pub fn output_file_names(item_name: &str, formats: &[ExportFormat]) -> Vec<String> {
        formats
            .iter()
            .map(|&format| output_file_name(item_name, format))
            .collect()
    }

    async fn convert_one(
        &self,
        item_id: &str,
        output_dir: &Path,
        target: &Path,
        format: ExportFormat,
    ) -> Result<(), ConvertError> {
        let exported = self
            .remote
            .export(item_id, format.export_mime_type())
            .await?;
        let content = if format.is_markdown() {
            let html = String::from_utf8(exported)?;
            self.html_to_markdown(&html)?.into_bytes()
        } else {
            exported
        };

        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| ConvertError::Io {
                path: output_dir.to_path_buf(),
                source,
            })?;
        backup_existing(target).await;
        write_via_partial(target, &content)
            .await
            .map_err(|source| ConvertError::Io {
                path: target.to_path_buf(),
                source,
            })
    }

    fn html_to_markdown(&self, html: &str) -> Result<String, ConvertError> {
        self.markdown.convert(html).map_err(ConvertError::Markdown)
    }
}

async fn backup_existing(target: &Path) {
    if !tokio::fs::try_exists(target).await.unwrap_or(false) {
        return;
    }
    let backup = backup_path(target);
    match tokio::fs::copy(target, &backup).await {
        Ok(_) => tracing::debug!("backed up {} to {}", target.display(), backup.display()),
        Err(err) => tracing::warn!("failed to back up {}: {err}", target.display()),
    }
}

async fn write_via_partial(target: &Path, content: &[u8]) -> io::Result<()> {
    let partial = partial_path(target);
    let mut file = tokio::fs::File::create(&partial).await?;
    file.write_all(content).await?;
    file.flush().await?;
    file.sync_all().await?;
    tokio::fs::rename(partial, target).await
}
