//! Post cache and resolution engine for the GitMsg protocol.
//!
//! Turns a git repository's commit history into a social-media-style
//! post graph: commits whose messages embed a structured GitMsg header
//! become posts; posts reference other posts (comments, reposts, quotes)
//! via commit-hash references that resolve across repositories.
//!
//! The engine unifies the workspace's own repository with any number of
//! externally mirrored repositories, enforces one canonical identity per
//! post across relative/absolute forms, expands embedded references into
//! virtual posts, counts interactions without double-counting, and
//! supports bounded incremental date-range extension. See
//! [`cache::PostCache`] for the public surface.

pub mod cache;
pub mod error;
pub mod gitmsg;
pub mod models;
pub mod protocol;
pub mod sync;
#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support;
pub mod threading;

pub use cache::{CacheConfig, CacheStats, PostCache, PostFilter, QueryContext, QueryScope, RefreshScope, SortBy};
pub use error::CacheError;
pub use models::{Author, Interactions, Post, PostSource, PostType};
pub use threading::{ThreadSort, ThreadView};

use std::sync::Once;

use env_logger::Env;

static LOGGER: Once = Once::new();

/// Initialize the process-wide logger once. Embedding applications that
/// install their own `log` backend can skip this.
pub fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    });
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    //! Shared builders for unit tests.

    use chrono::{TimeZone, Utc};

    use crate::models::{
        Author, CommitRecord, Interactions, Post, PostDisplay, PostSource, PostType, RawPost,
    };
    use crate::protocol::reference::{self, RefType};

    fn base_post(id: String, hash: &str, content: &str, is_workspace: bool) -> Post {
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        Post {
            id,
            repository: String::new(),
            branch: Some("main".to_string()),
            author: Author {
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
            },
            timestamp,
            content: content.to_string(),
            post_type: PostType::Post,
            source: PostSource::Implicit,
            is_workspace_post: is_workspace,
            is_virtual: false,
            original_post_id: None,
            parent_comment_id: None,
            raw: RawPost {
                commit: CommitRecord {
                    hash: hash.to_string(),
                    author: "Ada".to_string(),
                    email: "ada@example.com".to_string(),
                    timestamp,
                    message: content.to_string(),
                    refname: Some("refs/heads/main".to_string()),
                },
                gitmsg: None,
            },
            clean_content: content.to_string(),
            interactions: Interactions::default(),
            display: PostDisplay {
                commit_hash: hash.to_string(),
                is_empty: content.trim().is_empty(),
                is_workspace_post: is_workspace,
                ..PostDisplay::default()
            },
        }
    }

    /// A workspace post with a relative `#commit:<hash>` id.
    pub fn workspace_post(hash: &str, content: &str) -> Post {
        let id = reference::create(RefType::Commit, hash, None).unwrap();
        base_post(id, hash, content, true)
    }

    /// An external post with an absolute `url#commit:<hash>` id.
    pub fn external_post(repo_url: &str, hash: &str, content: &str) -> Post {
        let id = reference::create(RefType::Commit, hash, Some(repo_url)).unwrap();
        let mut post = base_post(id, hash, content, false);
        post.repository = reference::repository_id(
            &crate::protocol::url::normalize(repo_url),
            "main",
        );
        post
    }
}
