//! Isolated mirror storage for external repositories.
//!
//! Each followed repository gets a bare, blob-less, shallow mirror under
//! the storage base, keyed by its canonical URL. The mirror's remote is
//! always named `upstream` so that commits read from it classify as
//! external posts. A config record in the mirror's git config tracks the
//! date ranges fetched so far; fetches are gap-aware and skip windows
//! that are already covered.
//!
//! Network provisioning shells out to the `git` CLI (`--filter=blob:none`,
//! `--shallow-since`); all reads go through gix like the workspace layer.

use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::git::{CommitQuery, GitError, MIRROR_REMOTE, read_commits};
use crate::cache::ranges::{self, FetchedRange};
use crate::models::CommitRecord;
use crate::protocol::url;

/// Current shape of the per-mirror config record.
pub const MIRROR_CONFIG_VERSION: u32 = 1;

/// Git-config section holding the mirror record.
const CONFIG_SECTION: &str = "gitmsg";

/// Config record stored in the mirror's git config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    pub version: u32,
    pub last_fetch: Option<DateTime<Utc>>,
    pub fetched_ranges: Vec<FetchedRange>,
    pub is_persistent: bool,
    pub created_at: DateTime<Utc>,
    pub branch: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EnsureOptions {
    /// Persistent mirrors survive cache resets; transient ones may be
    /// garbage-collected by the embedding application.
    pub is_persistent: bool,
}

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("git command failed: {0}")]
    Command(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error("mirror config missing or invalid at {0}")]
    Config(PathBuf),
}

/// Contract to the on-disk mirror store.
pub trait MirrorStore {
    /// Directory a mirror for the given URL lives in (whether or not it
    /// has been provisioned yet).
    fn mirror_dir(&self, base: &Path, repo_url: &str) -> PathBuf;

    /// Provision the mirror if absent: bare repository, remote
    /// `upstream`, partial-clone filter, refspecs for the branch and the
    /// social refs, and a fresh config record.
    fn ensure(
        &self,
        base: &Path,
        repo_url: &str,
        branch: &str,
        opts: &EnsureOptions,
    ) -> Result<PathBuf, MirrorError>;

    /// Extend the shallow history back to `since`. Skips when the
    /// requested window is already covered by the recorded ranges.
    fn fetch(
        &self,
        base: &Path,
        repo_url: &str,
        branch: Option<&str>,
        since: Option<NaiveDate>,
    ) -> Result<(), MirrorError>;

    /// Read commits from the mirror.
    fn commits(
        &self,
        base: &Path,
        repo_url: &str,
        query: &CommitQuery,
    ) -> Result<Vec<CommitRecord>, MirrorError>;

    /// Read the config record back from a mirror directory.
    fn read_config(&self, dir: &Path) -> Result<MirrorConfig, MirrorError>;
}

/// CLI-provisioned, gix-read [`MirrorStore`] implementation.
#[derive(Debug, Default)]
pub struct GitMirrorStore;

impl GitMirrorStore {
    pub fn new() -> Self {
        Self
    }
}

impl MirrorStore for GitMirrorStore {
    fn mirror_dir(&self, base: &Path, repo_url: &str) -> PathBuf {
        let normalized = url::normalize(repo_url);
        let rest = normalized
            .strip_prefix("https://")
            .unwrap_or(&normalized)
            .trim_start_matches('/');
        base.join(format!("{rest}.git"))
    }

    fn ensure(
        &self,
        base: &Path,
        repo_url: &str,
        branch: &str,
        opts: &EnsureOptions,
    ) -> Result<PathBuf, MirrorError> {
        let dir = self.mirror_dir(base, repo_url);
        if dir.join("HEAD").exists() {
            return Ok(dir);
        }

        log::info!("provisioning mirror for {repo_url} at {}", dir.display());
        std::fs::create_dir_all(&dir)?;
        run_git(&dir, &["init", "--bare"])?;

        let fetch_url = url::to_git(&url::normalize(repo_url));
        run_git(&dir, &["remote", "add", MIRROR_REMOTE, &fetch_url])?;
        run_git(
            &dir,
            &[
                "config",
                &format!("remote.{MIRROR_REMOTE}.promisor"),
                "true",
            ],
        )?;
        run_git(
            &dir,
            &[
                "config",
                &format!("remote.{MIRROR_REMOTE}.partialclonefilter"),
                "blob:none",
            ],
        )?;
        run_git(
            &dir,
            &[
                "config",
                "--replace-all",
                &format!("remote.{MIRROR_REMOTE}.fetch"),
                &format!("+refs/heads/{branch}:refs/heads/{branch}"),
            ],
        )?;
        run_git(
            &dir,
            &[
                "config",
                "--add",
                &format!("remote.{MIRROR_REMOTE}.fetch"),
                "+refs/gitmsg/social/*:refs/gitmsg/social/*",
            ],
        )?;

        let config = MirrorConfig {
            version: MIRROR_CONFIG_VERSION,
            last_fetch: None,
            fetched_ranges: Vec::new(),
            is_persistent: opts.is_persistent,
            created_at: Utc::now(),
            branch: branch.to_string(),
        };
        write_config(&dir, &config)?;

        Ok(dir)
    }

    fn fetch(
        &self,
        base: &Path,
        repo_url: &str,
        branch: Option<&str>,
        since: Option<NaiveDate>,
    ) -> Result<(), MirrorError> {
        let dir = self.mirror_dir(base, repo_url);
        let mut config = self.read_config(&dir)?;
        let branch = branch.unwrap_or(&config.branch).to_string();

        let today = Local::now().date_naive();
        let start = since.unwrap_or(today);

        if ranges::is_covered(&config.fetched_ranges, start, today) {
            log::debug!("mirror {repo_url} already covers {start}..{today}, skipping fetch");
            return Ok(());
        }

        let shallow = format!("--shallow-since={start}");
        if let Err(err) = run_git(&dir, &["fetch", MIRROR_REMOTE, &shallow]) {
            log::warn!("shallow-since fetch failed for {repo_url}, falling back: {err}");
            run_git(
                &dir,
                &["fetch", MIRROR_REMOTE, "--depth", "100", "--update-shallow"],
            )?;
        }

        ranges::merge_range(&mut config.fetched_ranges, FetchedRange { start, end: today });
        config.last_fetch = Some(Utc::now());
        config.branch = branch;
        write_config(&dir, &config)?;

        Ok(())
    }

    fn commits(
        &self,
        base: &Path,
        repo_url: &str,
        query: &CommitQuery,
    ) -> Result<Vec<CommitRecord>, MirrorError> {
        let dir = self.mirror_dir(base, repo_url);
        Ok(read_commits(&dir, query)?)
    }

    fn read_config(&self, dir: &Path) -> Result<MirrorConfig, MirrorError> {
        let repo = gix::open(dir).map_err(|_| MirrorError::Config(dir.to_path_buf()))?;
        let snapshot = repo.config_snapshot();

        let key = |name: &str| format!("{CONFIG_SECTION}.{name}");
        let string = |name: &str| snapshot.string(&*key(name)).map(|v| v.to_string());

        let version: u32 = string("version")
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| MirrorError::Config(dir.to_path_buf()))?;
        let branch = string("branch").ok_or_else(|| MirrorError::Config(dir.to_path_buf()))?;

        let fetched_ranges = string("fetchedranges")
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        let last_fetch = string("lastfetch").and_then(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        });
        let created_at = string("createdat")
            .and_then(|raw| {
                DateTime::parse_from_rfc3339(&raw)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            })
            .unwrap_or_else(Utc::now);
        let is_persistent = string("ispersistent").is_some_and(|v| v == "true");

        Ok(MirrorConfig {
            version,
            last_fetch,
            fetched_ranges,
            is_persistent,
            created_at,
            branch,
        })
    }
}

fn write_config(dir: &Path, config: &MirrorConfig) -> Result<(), MirrorError> {
    let ranges_json = serde_json::to_string(&config.fetched_ranges)
        .map_err(|e| MirrorError::Command(format!("serializing fetched ranges: {e}")))?;

    let mut entries: Vec<(String, String)> = vec![
        ("version".into(), config.version.to_string()),
        ("branch".into(), config.branch.clone()),
        ("ispersistent".into(), config.is_persistent.to_string()),
        ("createdat".into(), config.created_at.to_rfc3339()),
        ("fetchedranges".into(), ranges_json),
    ];
    if let Some(last_fetch) = config.last_fetch {
        entries.push(("lastfetch".into(), last_fetch.to_rfc3339()));
    }

    for (name, value) in entries {
        run_git(
            dir,
            &["config", &format!("{CONFIG_SECTION}.{name}"), &value],
        )?;
    }

    Ok(())
}

fn run_git(dir: &Path, args: &[&str]) -> Result<String, MirrorError> {
    let output = Command::new("git").arg("-C").arg(dir).args(args).output()?;
    if !output.status.success() {
        return Err(MirrorError::Command(format!(
            "git {}: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
