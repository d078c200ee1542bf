use crate::client::{DOCUMENT_MIME_TYPE, FOLDER_MIME_TYPE};

/// Builder for the `q` filter expression of `files.list`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileQuery {
    name: Option<String>,
    parent: Option<String>,
    mime_type: Option<String>,
}

impl FileQuery {
    pub fn children_of(parent_id: impl Into<String>) -> Self {
        Self {
            parent: Some(parent_id.into()),
            ..Self::default()
        }
    }

    pub fn folders(self) -> Self {
        self.mime_type(FOLDER_MIME_TYPE)
    }

    pub fn documents(self) -> Self {
        self.mime_type(DOCUMENT_MIME_TYPE)
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn to_filter(&self) -> String {
        let mut clauses = Vec::new();
        if let Some(name) = &self.name {
            clauses.push(format!("name = '{}'", escape_literal(name)));
        }
        if let Some(parent) = &self.parent {
            clauses.push(format!("'{}' in parents", escape_literal(parent)));
        }
        if let Some(mime_type) = &self.mime_type {
            clauses.push(format!("mimeType = '{}'", escape_literal(mime_type)));
        }
        clauses.push("trashed = false".to_string());
        clauses.join(" and ")
    }
}

// String literals in Drive queries are single-quoted; quotes and backslashes
// must be backslash-escaped.
fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\'' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
