//! Core entities of the post graph.
//!
//! A `Post` is the unit everything else operates on: it is produced by
//! the ingestion pipeline, frozen when admitted to the cache, and handed
//! back to callers as a deep copy. Identity discipline is strict: a
//! workspace post id is always relative (`#commit:h`), an external post
//! id always absolute (`url#commit:h`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gitmsg::{GitMsgHeader, GitMsgReference};

/// What kind of post a commit represents, from the GitMsg `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    Post,
    Comment,
    Quote,
    Repost,
}

impl PostType {
    /// Parse the GitMsg `type` field; anything unrecognized is a plain post.
    pub fn from_field(value: Option<&str>) -> Self {
        match value {
            Some("comment") => PostType::Comment,
            Some("quote") => PostType::Quote,
            Some("repost") => PostType::Repost,
            Some("post") | None => PostType::Post,
            Some(other) => {
                log::debug!("unknown post type `{other}`, treating as post");
                PostType::Post
            }
        }
    }

    /// True for the types counted toward another post's interactions.
    pub fn is_interaction(self) -> bool {
        matches!(self, PostType::Comment | PostType::Quote | PostType::Repost)
    }
}

/// Whether the post carried a parsed GitMsg header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostSource {
    /// A GitMsg header was parsed (virtual posts are always explicit).
    Explicit,
    /// A plain commit without GitMsg framing.
    Implicit,
}

/// Commit author identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

/// Interaction counters recomputed over the whole post set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interactions {
    pub comments: u32,
    pub reposts: u32,
    pub quotes: u32,
}

/// Derived presentation fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDisplay {
    /// Short human name for the repository (e.g. `user/repo`).
    pub repository_name: String,
    /// Canonical 12-hex commit hash.
    pub commit_hash: String,
    /// Web URL of the commit, when the repository is web-addressable.
    pub commit_url: Option<String>,
    /// Always `reposts + quotes`.
    pub total_reposts: u32,
    pub is_empty: bool,
    pub is_unpushed: bool,
    pub is_origin: bool,
    pub is_workspace_post: bool,
}

/// The raw commit a post was observed on, as the git layer reported it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Full commit hash as reported by git.
    pub hash: String,
    pub author: String,
    pub email: String,
    /// Author time, millisecond precision.
    pub timestamp: DateTime<Utc>,
    pub message: String,
    /// Ref the commit was observed on, when known.
    pub refname: Option<String>,
}

/// Parsed GitMsg framing kept alongside the raw commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedGitMsg {
    pub header: GitMsgHeader,
    pub references: Vec<GitMsgReference>,
}

/// Original commit record plus the parsed GitMsg framing, if present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPost {
    pub commit: CommitRecord,
    pub gitmsg: Option<ParsedGitMsg>,
}

/// A node in the post graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    /// Canonical GitMsg commit reference. Relative for workspace posts,
    /// absolute for external posts.
    pub id: String,
    /// Canonical `url#branch:b` the post belongs to. The url part may be
    /// empty for workspace posts with no configured origin.
    pub repository: String,
    /// Branch the post was observed on, when known.
    pub branch: Option<String>,
    pub author: Author,
    pub timestamp: DateTime<Utc>,
    /// Commit message body with GitMsg header lines stripped.
    pub content: String,
    pub post_type: PostType,
    pub source: PostSource,
    /// True iff observed on the local working repository.
    pub is_workspace_post: bool,
    /// True iff materialized from an embedded reference.
    pub is_virtual: bool,
    /// Canonical reference to the interacted-with post, for
    /// comments/reposts/quotes.
    pub original_post_id: Option<String>,
    /// Canonical reference to the parent comment, for nested replies.
    pub parent_comment_id: Option<String>,
    pub raw: RawPost,
    /// Content with embedded reference blocks removed, for display.
    pub clean_content: String,
    pub interactions: Interactions,
    pub display: PostDisplay,
}

impl Post {
    /// Canonical 12-hex hash of the underlying commit.
    pub fn commit_hash(&self) -> &str {
        &self.display.commit_hash
    }

    /// Recompute the derived repost total after a counter change.
    pub fn sync_total_reposts(&mut self) {
        self.display.total_reposts = self.interactions.reposts + self.interactions.quotes;
    }
}

/// A persisted reading list: a named set of repositories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct List {
    pub id: String,
    pub name: String,
    /// Repository ids (`url` or `url#branch:b`) the list follows.
    pub repositories: Vec<String>,
    /// Whether the list takes part in ingestion.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}
