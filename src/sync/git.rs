//! Workspace git access.
//!
//! The [`GitOps`] trait is the ingestion boundary to the local working
//! repository: configured branch, commit enumeration over a date window,
//! unpushed-commit detection, and remote configuration. [`WorkspaceGit`]
//! implements it with gix; mirrors reuse the same commit walk through
//! [`read_commits`].

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::models::CommitRecord;
use crate::protocol::reference::DEFAULT_BRANCH;

/// Literal token returned by [`GitOps::origin_url`] when the repository
/// has no origin remote. Preserved verbatim at this boundary; the cache
/// controller maps it to "no origin".
pub const NO_ORIGIN_SENTINEL: &str = "myrepository";

/// Ref holding the repository-level social configuration blob.
pub const SOCIAL_CONFIG_REF: &str = "refs/gitmsg/social/config";

/// Remote name used for externally mirrored repositories. Commits seen
/// through this remote produce external posts.
pub const MIRROR_REMOTE: &str = "upstream";

/// Commit enumeration window.
#[derive(Debug, Clone, Default)]
pub struct CommitQuery {
    pub branch: String,
    /// Inclusive lower bound on author time.
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on author time.
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// A configured remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git error: {0}")]
    Open(#[from] Box<gix::open::Error>),

    #[error("git error: {0}")]
    Repo(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Contract to the local working repository.
pub trait GitOps {
    /// Branch the social graph lives on: the repository's social config
    /// ref, falling back to `origin/HEAD`, then `main`.
    fn configured_branch(&self, workdir: &Path) -> Result<String, GitError>;

    /// Commits on the given branch inside the date window, newest first.
    fn commits(&self, workdir: &Path, query: &CommitQuery) -> Result<Vec<CommitRecord>, GitError>;

    /// Hashes on the local branch not present under `refs/remotes/origin/`.
    fn unpushed_commits(&self, workdir: &Path, branch: &str) -> Result<HashSet<String>, GitError>;

    /// The configured origin URL, or the literal [`NO_ORIGIN_SENTINEL`]
    /// when the repository has no origin remote.
    fn origin_url(&self, workdir: &Path) -> Result<String, GitError>;

    /// All configured remotes with their fetch URLs.
    fn remotes(&self, workdir: &Path) -> Result<Vec<Remote>, GitError>;
}

/// Shape of the JSON blob behind [`SOCIAL_CONFIG_REF`].
#[derive(Debug, Deserialize)]
struct SocialConfig {
    branch: Option<String>,
}

/// gix-backed [`GitOps`] implementation.
#[derive(Debug, Default)]
pub struct WorkspaceGit;

impl WorkspaceGit {
    pub fn new() -> Self {
        Self
    }
}

fn open(path: &Path) -> Result<gix::Repository, GitError> {
    gix::open(path).map_err(|e| GitError::Open(Box::new(e)))
}

impl GitOps for WorkspaceGit {
    fn configured_branch(&self, workdir: &Path) -> Result<String, GitError> {
        let repo = open(workdir)?;

        if let Some(branch) = read_social_config_branch(&repo) {
            return Ok(branch);
        }

        if let Ok(reference) = repo.find_reference("refs/remotes/origin/HEAD") {
            if let gix::refs::TargetRef::Symbolic(name) = reference.target() {
                let full = name.as_bstr().to_string();
                if let Some(branch) = full.strip_prefix("refs/remotes/origin/") {
                    return Ok(branch.to_string());
                }
            }
        }

        Ok(DEFAULT_BRANCH.to_string())
    }

    fn commits(&self, workdir: &Path, query: &CommitQuery) -> Result<Vec<CommitRecord>, GitError> {
        read_commits(workdir, query)
    }

    fn unpushed_commits(&self, workdir: &Path, branch: &str) -> Result<HashSet<String>, GitError> {
        let repo = open(workdir)?;
        let mut unpushed = HashSet::new();

        let Some(local_id) = resolve_ref(&repo, &format!("refs/heads/{branch}")) else {
            return Ok(unpushed);
        };
        let remote_id = resolve_ref(&repo, &format!("refs/remotes/origin/{branch}"));

        let mut walk = repo.rev_walk([local_id]);
        if let Some(remote_id) = remote_id {
            walk = walk.with_hidden([remote_id]);
        }

        for info in walk.all().map_err(|e| GitError::Repo(e.to_string()))? {
            let info = info.map_err(|e| GitError::Repo(e.to_string()))?;
            unpushed.insert(info.id.to_string());
        }

        Ok(unpushed)
    }

    fn origin_url(&self, workdir: &Path) -> Result<String, GitError> {
        let repo = open(workdir)?;
        let snapshot = repo.config_snapshot();
        match snapshot.string("remote.origin.url") {
            Some(url) => Ok(url.to_string()),
            None => Ok(NO_ORIGIN_SENTINEL.to_string()),
        }
    }

    fn remotes(&self, workdir: &Path) -> Result<Vec<Remote>, GitError> {
        let repo = open(workdir)?;
        let mut remotes = Vec::new();

        for name in repo.remote_names() {
            let name = name.to_string();
            let key = format!("remote.{name}.url");
            if let Some(url) = repo.config_snapshot().string(&*key) {
                remotes.push(Remote {
                    name,
                    url: url.to_string(),
                });
            }
        }

        Ok(remotes)
    }
}

fn read_social_config_branch(repo: &gix::Repository) -> Option<String> {
    let mut reference = repo.find_reference(SOCIAL_CONFIG_REF).ok()?;
    let id = reference.peel_to_id_in_place().ok()?;
    let blob = repo.find_object(id).ok()?.try_into_blob().ok()?;
    let config: SocialConfig = serde_json::from_slice(&blob.data).ok()?;
    config.branch
}

fn resolve_ref(repo: &gix::Repository, name: &str) -> Option<gix::ObjectId> {
    let mut reference = repo.find_reference(name).ok()?;
    reference.peel_to_id_in_place().ok().map(|id| id.detach())
}

/// Walk `refs/heads/<branch>` newest-first, mapping commits into
/// [`CommitRecord`]s and honoring the query window. A commit that cannot
/// be decoded is skipped with a debug signal; a missing branch yields an
/// empty result rather than an error.
pub(crate) fn read_commits(
    repo_path: &Path,
    query: &CommitQuery,
) -> Result<Vec<CommitRecord>, GitError> {
    let repo = open(repo_path)?;
    let refname = format!("refs/heads/{}", query.branch);
    let mut records = Vec::new();

    let Some(head_id) = resolve_ref(&repo, &refname) else {
        log::debug!("branch {refname} not found in {}", repo_path.display());
        return Ok(records);
    };

    let walk = repo
        .rev_walk([head_id])
        .all()
        .map_err(|e| GitError::Repo(e.to_string()))?;

    for info in walk {
        let info = info.map_err(|e| GitError::Repo(e.to_string()))?;
        let commit = match repo.find_commit(info.id) {
            Ok(commit) => commit,
            Err(e) => {
                log::debug!("skipping unreadable commit {}: {e}", info.id);
                continue;
            }
        };

        let Some(record) = to_commit_record(&commit, &refname) else {
            log::debug!("skipping undecodable commit {}", info.id);
            continue;
        };

        // History is newest-first; once past the window we are done.
        if let Some(since) = query.since {
            if record.timestamp < since {
                break;
            }
        }
        if let Some(until) = query.until {
            if record.timestamp > until {
                continue;
            }
        }

        records.push(record);
        if query.limit.is_some_and(|limit| records.len() >= limit) {
            break;
        }
    }

    Ok(records)
}

fn to_commit_record(commit: &gix::Commit<'_>, refname: &str) -> Option<CommitRecord> {
    let message = String::from_utf8_lossy(commit.message_raw().ok()?).to_string();
    let author = commit.author().ok()?;
    let name = String::from_utf8_lossy(author.name).to_string();
    let email = String::from_utf8_lossy(author.email).to_string();
    let seconds = commit.time().ok().map(|t| t.seconds).unwrap_or(0);
    let timestamp = Utc.timestamp_opt(seconds, 0).single()?;

    Some(CommitRecord {
        hash: commit.id().to_string(),
        author: name,
        email,
        timestamp,
        message,
        refname: Some(refname.to_string()),
    })
}
