use std::path::{Path, PathBuf};

use crate::config::ExportFormat;

/// Keeps alphanumerics, spaces, hyphens and underscores, then trims.
///
/// Applied to document names and folder names alike, so dry-run and real
/// runs compute the same local paths.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim()
        .to_string()
}

pub fn output_file_name(document_name: &str, format: ExportFormat) -> String {
    format!("{}.{}", sanitize_name(document_name), format.extension())
}

pub fn output_path(output_dir: &Path, document_name: &str, format: ExportFormat) -> PathBuf {
    output_dir.join(output_file_name(document_name, format))
}

/// Report label of a subfolder: `<parent label>/<sanitized name>`.
pub fn child_label(parent: &str, folder_name: &str) -> String {
    let name = sanitize_name(folder_name);
    if parent.is_empty() {
        name
    } else {
        format!("{parent}/{name}")
    }
}

pub fn backup_path(target: &Path) -> PathBuf {
    with_suffix(target, "bak")
}

pub fn partial_path(target: &Path) -> PathBuf {
    with_suffix(target, "partial")
}

fn with_suffix(target: &Path, suffix: &str) -> PathBuf {
    target.with_extension(format!(
        "{}{suffix}",
        target
            .extension()
            .map(|ext| format!("{}.", ext.to_string_lossy()))
            .unwrap_or_default()
    ))
}
