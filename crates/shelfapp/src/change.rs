//! Working-copy changes handed to the shelving engine.
//!
//! A [`Change`] is a before/after pair of [`Revision`]s. Either side may be
//! absent (addition or deletion), never both. Content is sniffed into text or
//! binary when built from raw bytes.

use serde::{Deserialize, Serialize};

/// Number of leading bytes inspected when sniffing for binary content.
const SNIFF_LEN: usize = 8000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Content {
    Text(String),
    Binary(Vec<u8>),
    Directory,
}

impl Content {
    /// Classifies raw bytes: invalid UTF-8 or a NUL byte near the start means binary.
    pub fn sniff(bytes: Vec<u8>) -> Self {
        let head = &bytes[..bytes.len().min(SNIFF_LEN)];
        if head.contains(&0) {
            return Self::Binary(bytes);
        }
        match String::from_utf8(bytes) {
            Ok(text) => Self::Text(text),
            Err(err) => Self::Binary(err.into_bytes()),
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
            Self::Directory => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    /// Repository-relative path, `/` separated.
    pub path: String,
    pub content: Content,
}

impl Revision {
    pub fn text(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: Content::Text(text.into()),
        }
    }

    pub fn binary(path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: Content::Binary(bytes.into()),
        }
    }

    pub fn sniffed(path: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            content: Content::sniff(bytes),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Change {
    pub before: Option<Revision>,
    pub after: Option<Revision>,
    /// Set when the user left this change out of a partial selection.
    #[serde(default)]
    pub excluded: bool,
}

impl Change {
    pub fn modified(before: Revision, after: Revision) -> Self {
        Self {
            before: Some(before),
            after: Some(after),
            excluded: false,
        }
    }

    pub fn added(after: Revision) -> Self {
        Self {
            before: None,
            after: Some(after),
            excluded: false,
        }
    }

    pub fn deleted(before: Revision) -> Self {
        Self {
            before: Some(before),
            after: None,
            excluded: false,
        }
    }

    pub fn excluded(mut self) -> Self {
        self.excluded = true;
        self
    }

    fn revisions(&self) -> impl Iterator<Item = &Revision> {
        self.before.iter().chain(self.after.iter())
    }

    pub fn is_binary(&self) -> bool {
        self.revisions().any(|r| r.content.is_binary())
    }

    pub fn is_directory(&self) -> bool {
        self.revisions()
            .any(|r| matches!(r.content, Content::Directory))
    }

    /// The path used to identify this change: before path, or after path for additions.
    pub fn key_path(&self) -> Option<&str> {
        self.before
            .as_ref()
            .or(self.after.as_ref())
            .map(|r| r.path.as_str())
    }
}
