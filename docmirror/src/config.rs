//! Configuration: file locations from the environment and the YAML
//! directory mapping.
//!
//! The `directories:` list accepts three entry shapes:
//!
//! ```yaml
//! formats: [markdown]              # optional default for every root
//! directories:
//!   - Work/Notes                   # remote path, mirrored to ./downloads/Notes
//!   - id: 1AbCdEf                  # explicit folder id (legacy shape)
//!     name: Team
//!   - Work/Specs: ~/specs          # remote path -> explicit local directory
//!   - Work/Drafts:
//!       output: /srv/drafts
//!       formats: [markdown, pdf]
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

const DEFAULT_CONFIG_FILE: &str = "config.yaml";
const DEFAULT_STATE_FILE: &str = "state.json";
const DEFAULT_TOKEN_FILE: &str = "token.json";
const DEFAULT_CREDENTIALS_FILE: &str = "credentials.json";
const DEFAULT_DOWNLOADS_DIR: &str = "downloads";
const UNKNOWN_FOLDER_NAME: &str = "Unknown";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {0} not found")]
    NotFound(PathBuf),
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("config file is empty")]
    Empty,
    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("directory entry {0} is invalid")]
    InvalidEntry(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[serde(alias = "md")]
    Markdown,
    Html,
    Pdf,
    Docx,
    Odt,
    #[serde(alias = "text")]
    Txt,
}

impl ExportFormat {
    pub fn export_mime_type(self) -> &'static str {
        match self {
            ExportFormat::Markdown | ExportFormat::Html => "text/html",
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            ExportFormat::Odt => "application/vnd.oasis.opendocument.text",
            ExportFormat::Txt => "text/plain",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Html => "html",
            ExportFormat::Pdf => "pdf",
            ExportFormat::Docx => "docx",
            ExportFormat::Odt => "odt",
            ExportFormat::Txt => "txt",
        }
    }

    pub fn is_markdown(self) -> bool {
        self == ExportFormat::Markdown
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ExportFormat::Markdown => "markdown",
            ExportFormat::Html => "html",
            ExportFormat::Pdf => "pdf",
            ExportFormat::Docx => "docx",
            ExportFormat::Odt => "odt",
            ExportFormat::Txt => "txt",
        })
    }
}

/// One entry of the `directories:` list, as written by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryEntry {
    PathOnly(String),
    LegacyExplicit {
        id: Option<String>,
        path: Option<String>,
        name: Option<String>,
        formats: Option<Vec<ExportFormat>>,
    },
    PathToOutputDir {
        remote_path: String,
        local_dir: String,
        formats: Option<Vec<ExportFormat>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootTarget {
    Id(String),
    Path(String),
}

/// A directory entry resolved against the working directory and defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRoot {
    pub target: RootTarget,
    pub local_dir: PathBuf,
    pub display_name: String,
    pub formats: Vec<ExportFormat>,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub roots: Vec<SyncRoot>,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    directories: Vec<Value>,
    #[serde(default)]
    formats: Option<Vec<ExportFormat>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OutputSpec {
    output: String,
    #[serde(default)]
    formats: Option<Vec<ExportFormat>>,
}

impl Config {
    pub fn load(path: &Path, cwd: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_yaml(&text, cwd)
    }

    /// Parses the config document. Invalid directory entries are logged and
    /// skipped; only a malformed document is an error.
    pub fn from_yaml(text: &str, cwd: &Path) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Err(ConfigError::Empty);
        }
        let file: ConfigFile = serde_yaml::from_str(text)?;
        let default_formats = normalize_formats(file.formats);
        let home = dirs::home_dir();

        let mut roots = Vec::with_capacity(file.directories.len());
        for value in &file.directories {
            let root = DirectoryEntry::from_value(value)
                .and_then(|entry| entry.into_sync_root(cwd, home.as_deref(), &default_formats));
            match root {
                Ok(root) => roots.push(root),
                Err(err) => tracing::error!("{err}, skipping"),
            }
        }
        Ok(Self { roots })
    }
}

impl DirectoryEntry {
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        match value {
            Value::String(path) => Ok(DirectoryEntry::PathOnly(path.clone())),
            Value::Mapping(map) if has_key(map, "id") || has_key(map, "path") => {
                Ok(DirectoryEntry::LegacyExplicit {
                    id: optional_string(map, "id", value)?,
                    path: optional_string(map, "path", value)?,
                    name: optional_string(map, "name", value)?,
                    formats: match map.get("formats") {
                        Some(formats) => Some(parse_formats(formats, value)?),
                        None => None,
                    },
                })
            }
            Value::Mapping(map) if map.len() == 1 => {
                let Some((Value::String(remote_path), target)) = map.iter().next() else {
                    return Err(invalid(value));
                };
                match target {
                    Value::String(local_dir) => Ok(DirectoryEntry::PathToOutputDir {
                        remote_path: remote_path.clone(),
                        local_dir: local_dir.clone(),
                        formats: None,
                    }),
                    Value::Mapping(_) => {
                        let spec: OutputSpec =
                            serde_yaml::from_value(target.clone()).map_err(|_| invalid(value))?;
                        Ok(DirectoryEntry::PathToOutputDir {
                            remote_path: remote_path.clone(),
                            local_dir: spec.output,
                            formats: spec.formats,
                        })
                    }
                    _ => Err(invalid(value)),
                }
            }
            _ => Err(invalid(value)),
        }
    }

    pub fn into_sync_root(
        self,
        cwd: &Path,
        home: Option<&Path>,
        default_formats: &[ExportFormat],
    ) -> Result<SyncRoot, ConfigError> {
        let downloads = cwd.join(DEFAULT_DOWNLOADS_DIR);
        let (target, display_name, local_dir, formats) = match self {
            DirectoryEntry::PathOnly(path) => {
                if path.trim().is_empty() {
                    return Err(ConfigError::InvalidEntry(format!("{path:?}")));
                }
                let name = display_name_for(None, Some(path.as_str()));
                let local_dir = downloads.join(&name);
                (RootTarget::Path(path), name, local_dir, None)
            }
            DirectoryEntry::LegacyExplicit {
                id,
                path,
                name,
                formats,
            } => {
                let name = display_name_for(name.as_deref(), path.as_deref());
                let target = match (id, path) {
                    (Some(id), _) => RootTarget::Id(id),
                    (None, Some(path)) => RootTarget::Path(path),
                    (None, None) => {
                        return Err(ConfigError::InvalidEntry(format!(
                            "{{ name: {name:?} }} (no id or path)"
                        )));
                    }
                };
                let local_dir = downloads.join(&name);
                (target, name, local_dir, formats)
            }
            DirectoryEntry::PathToOutputDir {
                remote_path,
                local_dir,
                formats,
            } => {
                let name = display_name_for(None, Some(remote_path.as_str()));
                let local_dir = match home {
                    Some(home) => expand_with_home(&local_dir, home),
                    None => PathBuf::from(local_dir),
                };
                (RootTarget::Path(remote_path), name, local_dir, formats)
            }
        };

        let formats = match formats {
            Some(formats) => normalize_formats(Some(formats)),
            None => default_formats.to_vec(),
        };
        Ok(SyncRoot {
            target,
            local_dir,
            display_name,
            formats,
        })
    }
}

/// Last non-empty segment of a slash-separated remote path.
pub fn remote_basename(path: &str) -> Option<&str> {
    path.split('/').rfind(|segment| !segment.is_empty())
}

fn display_name_for(name: Option<&str>, path: Option<&str>) -> String {
    name.filter(|name| !name.is_empty())
        .or_else(|| path.and_then(remote_basename))
        .unwrap_or(UNKNOWN_FOLDER_NAME)
        .to_string()
}

fn normalize_formats(formats: Option<Vec<ExportFormat>>) -> Vec<ExportFormat> {
    let mut out: Vec<ExportFormat> = Vec::new();
    for format in formats.unwrap_or_default() {
        if !out.contains(&format) {
            out.push(format);
        }
    }
    if out.is_empty() {
        out.push(ExportFormat::Markdown);
    }
    out
}

fn has_key(map: &Mapping, key: &str) -> bool {
    map.contains_key(key)
}

fn optional_string(map: &Mapping, key: &str, entry: &Value) -> Result<Option<String>, ConfigError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) if value.is_empty() => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(invalid(entry)),
    }
}

fn parse_formats(value: &Value, entry: &Value) -> Result<Vec<ExportFormat>, ConfigError> {
    serde_yaml::from_value(value.clone()).map_err(|_| invalid(entry))
}

fn invalid(value: &Value) -> ConfigError {
    let rendered = serde_yaml::to_string(value)
        .map(|text| text.trim().replace('\n', ", "))
        .unwrap_or_else(|_| format!("{value:?}"));
    ConfigError::InvalidEntry(rendered)
}

/// Locations of the files the tool reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config: PathBuf,
    pub state: PathBuf,
    pub token: PathBuf,
    pub credentials: PathBuf,
}

impl AppPaths {
    pub fn from_env() -> anyhow::Result<Self> {
        let cwd = std::env::current_dir().context("current directory is unavailable")?;
        let home = dirs::home_dir();
        let resolve = |name: &str, default: &str| -> PathBuf {
            let value = std::env::var(name).unwrap_or_else(|_| default.to_string());
            let path = match home.as_deref() {
                Some(home) => expand_with_home(&value, home),
                None => PathBuf::from(value),
            };
            cwd.join(path)
        };
        Ok(Self {
            config: resolve("DOCMIRROR_CONFIG", DEFAULT_CONFIG_FILE),
            state: resolve("DOCMIRROR_STATE", DEFAULT_STATE_FILE),
            token: resolve("DOCMIRROR_TOKEN", DEFAULT_TOKEN_FILE),
            credentials: resolve("DOCMIRROR_CREDENTIALS", DEFAULT_CREDENTIALS_FILE),
        })
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self {
            config: dir.join(DEFAULT_CONFIG_FILE),
            state: dir.join(DEFAULT_STATE_FILE),
            token: dir.join(DEFAULT_TOKEN_FILE),
            credentials: dir.join(DEFAULT_CREDENTIALS_FILE),
        }
    }
}

pub fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

pub fn read_u64_env(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}
