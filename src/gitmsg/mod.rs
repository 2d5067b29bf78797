//! GitMsg commit-message framing.
//!
//! A GitMsg commit message is line-oriented:
//!
//! ```text
//! <post content>
//!
//! --- GitMsg: ext="social"; type="comment"; reply-to="#commit:abc123def456"; v="1.0"; ext-v="1.0" ---
//! --- GitMsg-Ref: ext="social"; author="Ada"; email="ada@example.com"; time="2024-01-15T10:00:00.000Z"; type="post"; ref="https://github.com/u/r#commit:abc123def456"; v="1.0"; ext-v="1.0" ---
//! > quoted metadata of the referenced post
//! ```
//!
//! Everything above the first header line is the post content; reference
//! sections carry enough metadata to reconstruct the referenced post when
//! the underlying commit is not available locally. Field order is
//! meaningful: `ext` comes first, `v` and `ext-v` last, and everything in
//! between is preserved in insertion order for the write path.

mod parser;
mod writer;

pub use parser::{parse_message, strip_reference_blocks};
pub use writer::write_message;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

/// Extension tag carried by social posts and references.
pub const SOCIAL_EXT: &str = "social";

/// Parsed `--- GitMsg: ... ---` header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitMsgHeader {
    /// Extension tag, always the first field.
    pub ext: String,
    /// Free fields between `ext` and the version tail, in order.
    pub fields: IndexMap<String, String>,
    /// Protocol version (`v`).
    pub version: String,
    /// Extension version (`ext-v`).
    pub ext_version: String,
}

impl GitMsgHeader {
    /// Look up a free field by key.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// Parsed `--- GitMsg-Ref: ... ---` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitMsgReference {
    pub ext: String,
    pub author: Option<String>,
    pub email: Option<String>,
    pub time: Option<DateTime<Utc>>,
    /// Free fields between the fixed prelude and `ref`, in order.
    pub fields: IndexMap<String, String>,
    /// The reference target (`ref="..."`).
    pub target: String,
    pub version: String,
    pub ext_version: String,
    /// Quoted metadata lines (without the `> ` prefix), joined by newlines.
    pub body: String,
}

impl GitMsgReference {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// Result of parsing a commit message that carries a GitMsg header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    /// Everything above the header line, trailing whitespace trimmed.
    /// Embedded reference sections remain part of the content; use
    /// [`strip_reference_blocks`] for display.
    pub content: String,
    pub header: GitMsgHeader,
    /// Reference sections in order of appearance, wherever they occur.
    pub references: Vec<GitMsgReference>,
}
