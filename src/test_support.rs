//! In-memory collaborator implementations for integration tests and
//! embedders that want to drive the cache without touching disk.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::NaiveDate;

use crate::models::{CommitRecord, List, Post};
use crate::protocol::url;
use crate::sync::git::{CommitQuery, GitError, GitOps, NO_ORIGIN_SENTINEL, Remote};
use crate::sync::lists::{ListError, ListStore, post_matches_list};
use crate::sync::mirror::{EnsureOptions, MirrorConfig, MirrorError, MirrorStore};

/// Scripted workspace repository.
#[derive(Default)]
pub struct InMemoryGit {
    pub branch: Option<String>,
    pub origin: Option<String>,
    pub commits: Vec<CommitRecord>,
    pub unpushed: HashSet<String>,
    commit_reads: AtomicUsize,
}

impl InMemoryGit {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times commits were enumerated, so tests can assert that
    /// covered ranges short-circuit git access.
    pub fn commit_reads(&self) -> usize {
        self.commit_reads.load(Ordering::SeqCst)
    }
}

fn window(commits: &[CommitRecord], query: &CommitQuery) -> Vec<CommitRecord> {
    let mut selected: Vec<CommitRecord> = commits
        .iter()
        .filter(|c| query.since.is_none_or(|since| c.timestamp >= since))
        .filter(|c| query.until.is_none_or(|until| c.timestamp <= until))
        .cloned()
        .collect();
    selected.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    if let Some(limit) = query.limit {
        selected.truncate(limit);
    }
    selected
}

impl GitOps for InMemoryGit {
    fn configured_branch(&self, _workdir: &Path) -> Result<String, GitError> {
        Ok(self.branch.clone().unwrap_or_else(|| "main".to_string()))
    }

    fn commits(&self, _workdir: &Path, query: &CommitQuery) -> Result<Vec<CommitRecord>, GitError> {
        self.commit_reads.fetch_add(1, Ordering::SeqCst);
        Ok(window(&self.commits, query))
    }

    fn unpushed_commits(&self, _workdir: &Path, _branch: &str) -> Result<HashSet<String>, GitError> {
        Ok(self.unpushed.clone())
    }

    fn origin_url(&self, _workdir: &Path) -> Result<String, GitError> {
        Ok(self
            .origin
            .clone()
            .unwrap_or_else(|| NO_ORIGIN_SENTINEL.to_string()))
    }

    fn remotes(&self, _workdir: &Path) -> Result<Vec<Remote>, GitError> {
        let mut remotes = Vec::new();
        if let Some(origin) = &self.origin {
            remotes.push(Remote {
                name: "origin".to_string(),
                url: origin.clone(),
            });
        }
        Ok(remotes)
    }
}

/// Scripted mirror store keyed by normalized repository URL.
#[derive(Default)]
pub struct InMemoryMirrors {
    commits: Mutex<HashMap<String, Vec<CommitRecord>>>,
    configs: Mutex<HashMap<PathBuf, MirrorConfig>>,
    commit_reads: AtomicUsize,
}

impl InMemoryMirrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_repository(&self, repo_url: &str, commits: Vec<CommitRecord>) {
        self.commits
            .lock()
            .expect("mirror commits lock")
            .insert(url::normalize(repo_url), commits);
    }

    pub fn set_config(&self, dir: PathBuf, config: MirrorConfig) {
        self.configs
            .lock()
            .expect("mirror configs lock")
            .insert(dir, config);
    }

    pub fn commit_reads(&self) -> usize {
        self.commit_reads.load(Ordering::SeqCst)
    }
}

impl MirrorStore for InMemoryMirrors {
    fn mirror_dir(&self, base: &Path, repo_url: &str) -> PathBuf {
        let normalized = url::normalize(repo_url);
        let rest = normalized.strip_prefix("https://").unwrap_or(&normalized);
        base.join(format!("{rest}.git"))
    }

    fn ensure(
        &self,
        base: &Path,
        repo_url: &str,
        _branch: &str,
        _opts: &EnsureOptions,
    ) -> Result<PathBuf, MirrorError> {
        Ok(self.mirror_dir(base, repo_url))
    }

    fn fetch(
        &self,
        _base: &Path,
        _repo_url: &str,
        _branch: Option<&str>,
        _since: Option<NaiveDate>,
    ) -> Result<(), MirrorError> {
        Ok(())
    }

    fn commits(
        &self,
        _base: &Path,
        repo_url: &str,
        query: &CommitQuery,
    ) -> Result<Vec<CommitRecord>, MirrorError> {
        self.commit_reads.fetch_add(1, Ordering::SeqCst);
        let commits = self.commits.lock().expect("mirror commits lock");
        Ok(commits
            .get(&url::normalize(repo_url))
            .map(|list| window(list, query))
            .unwrap_or_default())
    }

    fn read_config(&self, dir: &Path) -> Result<MirrorConfig, MirrorError> {
        self.configs
            .lock()
            .expect("mirror configs lock")
            .get(dir)
            .cloned()
            .ok_or_else(|| MirrorError::Config(dir.to_path_buf()))
    }
}

/// Fixed list definitions.
#[derive(Default)]
pub struct InMemoryLists {
    pub lists: Vec<List>,
}

impl InMemoryLists {
    pub fn new(lists: Vec<List>) -> Self {
        Self { lists }
    }
}

impl ListStore for InMemoryLists {
    fn lists(&self, _workdir: &Path) -> Result<Vec<List>, ListError> {
        Ok(self
            .lists
            .iter()
            .filter(|list| list.enabled)
            .cloned()
            .collect())
    }

    fn all_lists(&self, _workdir: &Path) -> Result<Vec<List>, ListError> {
        Ok(self.lists.clone())
    }

    fn post_in_list(&self, post: &Post, list_id: &str, _workdir: &Path) -> bool {
        self.lists
            .iter()
            .find(|list| list.id == list_id)
            .is_some_and(|list| post_matches_list(post, list))
    }
}
