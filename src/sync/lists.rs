//! Persisted reading lists.
//!
//! Lists are named sets of repositories the workspace follows. They live
//! in a JSON document behind the `refs/gitmsg/social/lists` ref, next to
//! the social config blob.

use std::path::Path;

use thiserror::Error;

use crate::models::{List, Post};
use crate::protocol::{reference, url};

/// Ref holding the JSON list document.
pub const SOCIAL_LISTS_REF: &str = "refs/gitmsg/social/lists";

#[derive(Debug, Error)]
pub enum ListError {
    #[error("git error: {0}")]
    Git(String),

    #[error("invalid list document: {0}")]
    Document(String),
}

/// Contract to persisted list storage.
pub trait ListStore {
    /// Lists that take part in ingestion.
    fn lists(&self, workdir: &Path) -> Result<Vec<List>, ListError>;

    /// Every stored list, including disabled ones.
    fn all_lists(&self, workdir: &Path) -> Result<Vec<List>, ListError>;

    /// Whether a post's repository belongs to the given list.
    fn post_in_list(&self, post: &Post, list_id: &str, workdir: &Path) -> bool;
}

/// gix-backed [`ListStore`] reading the list document from the workspace.
#[derive(Debug, Default)]
pub struct GitListStore;

impl GitListStore {
    pub fn new() -> Self {
        Self
    }

    fn read_document(&self, workdir: &Path) -> Result<Vec<List>, ListError> {
        let repo = gix::open(workdir).map_err(|e| ListError::Git(e.to_string()))?;
        let Ok(mut reference) = repo.find_reference(SOCIAL_LISTS_REF) else {
            return Ok(Vec::new());
        };
        let id = reference
            .peel_to_id_in_place()
            .map_err(|e| ListError::Git(e.to_string()))?;
        let blob = repo
            .find_object(id)
            .map_err(|e| ListError::Git(e.to_string()))?
            .try_into_blob()
            .map_err(|e| ListError::Git(e.to_string()))?;

        serde_json::from_slice(&blob.data).map_err(|e| ListError::Document(e.to_string()))
    }
}

impl ListStore for GitListStore {
    fn lists(&self, workdir: &Path) -> Result<Vec<List>, ListError> {
        Ok(self
            .read_document(workdir)?
            .into_iter()
            .filter(|list| list.enabled)
            .collect())
    }

    fn all_lists(&self, workdir: &Path) -> Result<Vec<List>, ListError> {
        self.read_document(workdir)
    }

    fn post_in_list(&self, post: &Post, list_id: &str, workdir: &Path) -> bool {
        match self.lists(workdir) {
            Ok(lists) => lists
                .iter()
                .find(|list| list.id == list_id)
                .is_some_and(|list| post_matches_list(post, list)),
            Err(err) => {
                log::debug!("failed to read lists for membership check: {err}");
                false
            }
        }
    }
}

/// A post belongs to a list when its repository URL matches one of the
/// list's repositories, branch part ignored.
pub fn post_matches_list(post: &Post, list: &List) -> bool {
    let (post_repo, _) = reference::parse_repository_id(&post.repository);
    if post_repo.is_empty() {
        return false;
    }
    list.repositories.iter().any(|entry| {
        let (repo, _) = reference::parse_repository_id(entry);
        url::normalize(&repo) == post_repo
    })
}
