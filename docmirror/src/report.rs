use std::fmt::Write as _;
use std::io::{self, Write};

const RULE_WIDTH: usize = 50;

/// One output file produced (or, in a dry run, planned) during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionRecord {
    InFolder { folder: String, file_name: String },
    Bare(String),
}

impl ConversionRecord {
    pub fn file_name(&self) -> &str {
        match self {
            ConversionRecord::InFolder { file_name, .. } | ConversionRecord::Bare(file_name) => {
                file_name
            }
        }
    }

    pub fn folder(&self) -> Option<&str> {
        match self {
            ConversionRecord::InFolder { folder, .. } => Some(folder),
            ConversionRecord::Bare(_) => None,
        }
    }
}

impl From<&str> for ConversionRecord {
    fn from(file_name: &str) -> Self {
        ConversionRecord::Bare(file_name.to_string())
    }
}

impl From<String> for ConversionRecord {
    fn from(file_name: String) -> Self {
        ConversionRecord::Bare(file_name)
    }
}

impl<F: Into<String>, N: Into<String>> From<(F, N)> for ConversionRecord {
    fn from((folder, file_name): (F, N)) -> Self {
        ConversionRecord::InFolder {
            folder: folder.into(),
            file_name: file_name.into(),
        }
    }
}

pub fn format_report(records: &[ConversionRecord], dry_run: bool) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();
    let _ = writeln!(out, "{rule}");
    if dry_run {
        let _ = writeln!(out, "Conversion summary (dry run)");
    } else {
        let _ = writeln!(out, "Conversion summary");
    }
    let _ = writeln!(out, "{rule}");

    if records.is_empty() {
        let line = if dry_run {
            "No documents would be converted."
        } else {
            "No documents were converted."
        };
        let _ = writeln!(out, "{line}");
        return out;
    }

    let (noun, verb) = match (records.len(), dry_run) {
        (1, true) => ("document", "would be converted"),
        (1, false) => ("document", "was converted"),
        (_, true) => ("documents", "would be converted"),
        (_, false) => ("documents", "were converted"),
    };
    let _ = writeln!(out, "{} {noun} {verb}:", records.len());
    for (index, record) in records.iter().enumerate() {
        let _ = writeln!(out, "  {}. {}", index + 1, record.file_name());
        if let Some(folder) = record.folder() {
            let _ = writeln!(out, "     folder: {folder}");
        }
    }
    out
}

/// Prints the end-of-run summary to an arbitrary sink.
pub struct Reporter<W: Write> {
    out: W,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn report(&mut self, records: &[ConversionRecord], dry_run: bool) -> io::Result<()> {
        self.out
            .write_all(format_report(records, dry_run).as_bytes())?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
