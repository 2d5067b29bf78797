//! Post index: O(1) lookup by hash, repository, list membership, and
//! absolute↔relative identity.
//!
//! The index owns no posts; it maps identities to post ids and the
//! store resolves ids to frozen posts. Entries are maintained at
//! admission and removal and cleared wholesale when the cache is
//! disabled.

use std::collections::{HashMap, HashSet};

use crate::models::Post;
use crate::protocol::reference;

/// Canonical `byRepository` key for a post's repository field.
pub fn repository_key(repository: &str) -> String {
    let (repo, branch) = reference::parse_repository_id(repository);
    reference::repository_id(&repo, &branch)
}

/// `byList` key: `<workdir>:<listId>`.
pub fn list_key(workdir: &str, list_id: &str) -> String {
    format!("{workdir}:{list_id}")
}

fn remove_member(map: &mut HashMap<String, HashSet<String>>, key: &str, id: &str) {
    let emptied = map.get_mut(key).map(|ids| {
        ids.remove(id);
        ids.is_empty()
    });
    if emptied == Some(true) {
        map.remove(key);
    }
}

#[derive(Debug, Default)]
pub struct PostIndex {
    /// 12-hex hash → ids of every post referencing that hash across repos.
    by_hash: HashMap<String, HashSet<String>>,
    /// Canonical `url#branch:b` → post ids.
    by_repository: HashMap<String, HashSet<String>>,
    /// `<workdir>:<listId>` → post ids.
    by_list: HashMap<String, HashSet<String>>,
    /// Absolute id → relative id, for workspace posts and external
    /// duplicates of workspace posts.
    absolute: HashMap<String, String>,
    /// Virtual ids merged into an existing workspace post; these never
    /// appear as standalone posts.
    merged: HashSet<String>,
}

impl PostIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a post's hash and repository entries at admission.
    pub fn track(&mut self, post: &Post) {
        self.by_hash
            .entry(post.display.commit_hash.clone())
            .or_default()
            .insert(post.id.clone());

        if !post.repository.is_empty() {
            self.by_repository
                .entry(repository_key(&post.repository))
                .or_default()
                .insert(post.id.clone());
        }
    }

    /// Drop every entry pointing at the given post.
    pub fn untrack(&mut self, post: &Post) {
        remove_member(&mut self.by_hash, &post.display.commit_hash, &post.id);
        remove_member(
            &mut self.by_repository,
            &repository_key(&post.repository),
            &post.id,
        );
        for ids in self.by_list.values_mut() {
            ids.remove(&post.id);
        }
    }

    /// Remove a hash entry wholesale, returning the ids it held.
    pub fn remove_hash(&mut self, hash: &str) -> HashSet<String> {
        self.by_hash.remove(hash).unwrap_or_default()
    }

    pub fn hash_members(&self, hash: &str) -> Option<&HashSet<String>> {
        self.by_hash.get(hash)
    }

    pub fn repository_members(&self, key: &str) -> Option<&HashSet<String>> {
        self.by_repository.get(key)
    }

    pub fn add_list_member(&mut self, key: String, id: String) {
        self.by_list.entry(key).or_default().insert(id);
    }

    pub fn list_members(&self, key: &str) -> Option<&HashSet<String>> {
        self.by_list.get(key)
    }

    pub fn insert_absolute(&mut self, absolute: String, relative: String) {
        self.absolute.insert(absolute, relative);
    }

    /// Relative id for an absolute one, when the mapping exists.
    pub fn resolve_absolute(&self, id: &str) -> Option<&str> {
        self.absolute.get(id).map(String::as_str)
    }

    pub fn mark_merged(&mut self, id: String) {
        self.merged.insert(id);
    }

    pub fn is_merged(&self, id: &str) -> bool {
        self.merged.contains(id)
    }

    pub fn clear(&mut self) {
        self.by_hash.clear();
        self.by_repository.clear();
        self.by_list.clear();
        self.absolute.clear();
        self.merged.clear();
    }
}
