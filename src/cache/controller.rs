//! Cache controller: the public surface of the engine.
//!
//! Orchestrates the full ingestion pipeline (gather → transform →
//! process → count → freeze), serves scope-based queries from the frozen
//! store, and tracks which date ranges have been loaded so incremental
//! extension is exactly-once.
//!
//! The controller is driven through `&mut self`: one logical owner
//! serializes every operation, which is what makes the admission order
//! (and with it the dedup outcome) deterministic.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, Utc};
use indexmap::IndexMap;

use crate::error::CacheError;
use crate::models::Post;
use crate::protocol::reference::{self, DEFAULT_BRANCH};
use crate::protocol::{hash, url};
use crate::sync::git::{CommitQuery, GitOps, MIRROR_REMOTE, NO_ORIGIN_SENTINEL};
use crate::sync::lists::{ListStore, post_matches_list};
use crate::sync::mirror::{EnsureOptions, MirrorStore};
use crate::sync::transformer::{self, CommitContext};
use crate::sync::{interactions, processor};
use crate::threading::{self, ThreadError, ThreadSort, ThreadView};

use super::index::{self, PostIndex};
use super::ranges;
use super::scope::{PostFilter, QueryContext, QueryScope, RefreshScope, SortBy};
use super::store::{
    CacheStats, DEFAULT_CACHE_SIZE, DEFAULT_TTL_DAYS, MAX_CACHE_SIZE, MIN_CACHE_SIZE, PostStore,
};

/// Environment variable overriding the LRU capacity.
const MAX_SIZE_ENV: &str = "GITMSG_CACHE_MAX_SIZE";

/// Tunables for the cache controller.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub max_size: usize,
    pub ttl_days: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_CACHE_SIZE,
            ttl_days: DEFAULT_TTL_DAYS,
        }
    }
}

impl CacheConfig {
    /// Read overrides from the environment, clamped to the size bounds.
    pub fn from_env() -> Self {
        let max_size = std::env::var(MAX_SIZE_ENV)
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .map(|size| size.clamp(MIN_CACHE_SIZE, MAX_CACHE_SIZE))
            .unwrap_or(DEFAULT_CACHE_SIZE);

        Self {
            max_size,
            ttl_days: DEFAULT_TTL_DAYS,
        }
    }
}

/// In-memory, indexed, incrementally-loadable snapshot of the post
/// universe.
pub struct PostCache {
    enabled: bool,
    initialized: bool,
    store: PostStore,
    index: PostIndex,
    /// `YYYY-MM-DD` start dates already ingested.
    covered: BTreeSet<String>,
    /// Workdir → configured branch, resolved at initialization.
    branches: HashMap<String, String>,
    git: Arc<dyn GitOps>,
    mirrors: Arc<dyn MirrorStore>,
    lists: Arc<dyn ListStore>,
}

impl PostCache {
    /// Build a controller with configuration from the environment.
    pub fn new(git: Arc<dyn GitOps>, mirrors: Arc<dyn MirrorStore>, lists: Arc<dyn ListStore>) -> Self {
        Self::with_config(CacheConfig::from_env(), git, mirrors, lists)
    }

    pub fn with_config(
        config: CacheConfig,
        git: Arc<dyn GitOps>,
        mirrors: Arc<dyn MirrorStore>,
        lists: Arc<dyn ListStore>,
    ) -> Self {
        Self {
            enabled: true,
            initialized: false,
            store: PostStore::new(config.max_size, config.ttl_days),
            index: PostIndex::new(),
            covered: BTreeSet::new(),
            branches: HashMap::new(),
            git,
            mirrors,
            lists,
        }
    }

    /// Disabling clears everything; subsequent reads yield empty results
    /// until re-enabled and re-initialized.
    pub fn set_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.store.clear();
            self.index.clear();
            self.covered.clear();
            self.initialized = false;
            log::info!("post cache disabled and cleared");
        }
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Swap in a store of the new capacity (clamped), keeping entries.
    pub fn set_max_size(&mut self, max_size: usize) {
        self.store.resize(max_size);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.store.len(),
            max_size: self.store.max_size(),
            enabled: self.enabled,
        }
    }

    /// Full load: workspace commits plus every list-followed mirror,
    /// from `since_override` (default: Monday of the current week).
    pub fn initialize(
        &mut self,
        workdir: &Path,
        storage_base: Option<&Path>,
        since_override: Option<DateTime<Utc>>,
    ) -> Result<(), CacheError> {
        if !self.enabled {
            log::debug!("cache disabled, skipping initialization");
            return Ok(());
        }

        let workdir_str = workdir.display().to_string();
        let branch = match self.git.configured_branch(workdir) {
            Ok(branch) => branch,
            Err(err) => {
                log::warn!("failed to resolve configured branch: {err}");
                DEFAULT_BRANCH.to_string()
            }
        };
        self.branches.insert(workdir_str, branch.clone());

        let origin = self.origin_for(workdir);
        let since = since_override.unwrap_or_else(ranges::default_fetch_start);
        log::info!(
            "initializing post cache for {} since {}",
            workdir.display(),
            ranges::to_date_string(since)
        );

        let gathered = self.gather_posts(workdir, storage_base, &branch, origin.as_deref(), since);
        let admitted = self.ingest(workdir, gathered, origin.as_deref());
        log::info!("initialized with {admitted} newly admitted posts");

        self.covered.insert(ranges::to_date_string(since));
        self.initialized = true;
        Ok(())
    }

    /// Invalidate per the scope, then re-initialize when a workdir is
    /// given, going back to the oldest date any mirror has fetched.
    pub fn refresh(
        &mut self,
        scope: &RefreshScope,
        workdir: Option<&Path>,
        storage_base: Option<&Path>,
    ) -> Result<(), CacheError> {
        match scope {
            RefreshScope::All => {
                self.store.clear();
                self.index.clear();
                self.covered.clear();
                self.initialized = false;
            }
            RefreshScope::Hashes(hashes) => {
                for raw in hashes {
                    let canonical = hash::normalize(raw)?;
                    for id in self.index.remove_hash(&canonical) {
                        if let Some(post) = self.store.remove(&id) {
                            self.index.untrack(&post);
                        }
                    }
                }
            }
            RefreshScope::Repositories(_) | RefreshScope::Lists(_) => {
                self.initialized = false;
            }
        }

        if let Some(workdir) = workdir {
            let since = self
                .oldest_mirror_date(workdir, storage_base)
                .map(ranges::start_of_day);
            self.initialize(workdir, storage_base, since)?;
        }

        Ok(())
    }

    /// Extend the cache back to `since`. A covered date is a no-op; the
    /// date is marked covered only when the pass admitted something new.
    pub fn load_additional(
        &mut self,
        workdir: &Path,
        storage_base: Option<&Path>,
        since: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        if !self.enabled {
            return Ok(());
        }

        let key = ranges::to_date_string(since);
        if self.covered.contains(&key) {
            log::debug!("range {key} already covered, skipping load");
            return Ok(());
        }

        let workdir_str = workdir.display().to_string();
        let branch = match self.branches.get(&workdir_str) {
            Some(branch) => branch.clone(),
            None => match self.git.configured_branch(workdir) {
                Ok(branch) => {
                    self.branches.insert(workdir_str, branch.clone());
                    branch
                }
                Err(err) => {
                    log::warn!("failed to resolve configured branch: {err}");
                    DEFAULT_BRANCH.to_string()
                }
            },
        };

        let origin = self.origin_for(workdir);
        let gathered = self.gather_posts(workdir, storage_base, &branch, origin.as_deref(), since);
        let admitted = self.ingest(workdir, gathered, origin.as_deref());

        if admitted > 0 {
            self.covered.insert(key);
        } else {
            log::debug!("no new posts for {key}; range left uncovered");
        }
        Ok(())
    }

    /// Resolve a scope against the cache. Returned posts are deep copies
    /// of the frozen originals.
    pub fn get_cached_posts(
        &mut self,
        workdir: &Path,
        scope: &QueryScope,
        filter: Option<&PostFilter>,
        context: Option<&QueryContext>,
    ) -> Result<Vec<Post>, CacheError> {
        if !self.enabled {
            return Ok(Vec::new());
        }

        let filter = filter.cloned().unwrap_or_default();
        if filter.skip_cache {
            log::trace!("skipCache is a hint; serving from cache regardless");
        }

        let workdir_str = workdir.display().to_string();
        let mut posts = match scope {
            QueryScope::All | QueryScope::Timeline => self.deep_snapshot(),
            QueryScope::MyRepository => self.my_repository_posts(&workdir_str),
            QueryScope::Repository { url, list } => {
                let (repo_url, branch) = reference::parse_repository_id(url);
                let key = reference::repository_id(&repo_url, &branch);
                let ids: Vec<String> = self
                    .index
                    .repository_members(&key)
                    .map(|members| members.iter().cloned().collect())
                    .unwrap_or_default();
                let mut selected: Vec<Post> = ids
                    .iter()
                    .filter_map(|id| self.store.get(id).map(|p| (*p).clone()))
                    .collect();
                if let Some(list_id) = list {
                    let list_key = index::list_key(&workdir_str, list_id);
                    if let Some(members) = self.index.list_members(&list_key) {
                        selected.retain(|post| members.contains(&post.id));
                    } else {
                        selected.clear();
                    }
                }
                selected
            }
            QueryScope::List(list_id) => {
                let list_key = index::list_key(&workdir_str, list_id);
                let ids: Vec<String> = self
                    .index
                    .list_members(&list_key)
                    .map(|members| members.iter().cloned().collect())
                    .unwrap_or_default();
                if !ids.is_empty() {
                    ids.iter()
                        .filter_map(|id| self.store.get(id).map(|p| (*p).clone()))
                        .collect()
                } else if let Some(list) = context.and_then(|c| c.list.as_ref()) {
                    self.store
                        .snapshot()
                        .iter()
                        .filter(|post| post_matches_list(post, list))
                        .map(|post| (**post).clone())
                        .collect()
                } else {
                    Vec::new()
                }
            }
            QueryScope::Post(id) => self.lookup_post(id).into_iter().collect(),
            QueryScope::ByIds(ids) => {
                ids.iter().filter_map(|id| self.lookup_post(id)).collect()
            }
            QueryScope::Thread(anchor_id) => {
                let sort = match filter.sort_by {
                    SortBy::Top => ThreadSort::Top,
                    SortBy::Oldest => ThreadSort::Oldest,
                    SortBy::Latest => ThreadSort::Latest,
                };
                let view = self.thread(anchor_id, sort)?;
                let mut flat = view.parents;
                flat.push(view.anchor);
                flat.extend(view.children);
                flat
            }
        };

        // Thread order is structural; everything else sorts per filter.
        let keep_order = matches!(scope, QueryScope::Thread(_));
        apply_filter(&mut posts, &filter, !keep_order);
        Ok(posts)
    }

    /// Assemble the thread view around an anchor post.
    pub fn thread(&mut self, anchor_id: &str, sort: ThreadSort) -> Result<ThreadView, CacheError> {
        let posts = self.deep_snapshot();
        threading::build_thread(&posts, anchor_id, sort).map_err(|err| match err {
            ThreadError::PostNotFound(id) => CacheError::PostNotFound(id),
        })
    }

    /// Exact membership check on the covered-range set.
    pub fn is_cache_range_covered(&self, since: DateTime<Utc>) -> bool {
        self.covered.contains(&ranges::to_date_string(since))
    }

    /// Sorted list of covered range start dates.
    pub fn cached_ranges(&self) -> Vec<String> {
        self.covered.iter().cloned().collect()
    }

    fn deep_snapshot(&self) -> Vec<Post> {
        self.store
            .snapshot()
            .iter()
            .map(|post| (**post).clone())
            .collect()
    }

    fn my_repository_posts(&self, workdir_str: &str) -> Vec<Post> {
        let branch = self
            .branches
            .get(workdir_str)
            .cloned()
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string());
        let workdir_normalized = url::normalize(workdir_str);

        self.store
            .snapshot()
            .iter()
            .filter(|post| {
                let (repo, repo_branch) = reference::parse_repository_id(&post.repository);
                let mine = reference::is_my_repository(&post.id)
                    || repo == workdir_normalized
                    || repo == workdir_str;
                mine && repo_branch == branch
            })
            .map(|post| (**post).clone())
            .collect()
    }

    fn lookup_post(&mut self, id: &str) -> Option<Post> {
        if let Some(post) = self.store.get(id) {
            return Some((*post).clone());
        }
        let relative = self.index.resolve_absolute(id)?.to_string();
        self.store.get(&relative).map(|post| (*post).clone())
    }

    /// Origin URL with the no-remote sentinel mapped to absence.
    fn origin_for(&self, workdir: &Path) -> Option<String> {
        match self.git.origin_url(workdir) {
            Ok(raw) if raw == NO_ORIGIN_SENTINEL => None,
            Ok(raw) => Some(url::normalize(&raw)),
            Err(err) => {
                log::warn!("failed to read origin url: {err}");
                None
            }
        }
    }

    /// Gather and transform: workspace commits first, then each mirror
    /// in list iteration order. Every failure degrades to fewer posts.
    fn gather_posts(
        &self,
        workdir: &Path,
        storage_base: Option<&Path>,
        branch: &str,
        origin: Option<&str>,
        since: DateTime<Utc>,
    ) -> Vec<Post> {
        let workdir_str = workdir.display().to_string();
        let mut posts: Vec<Post> = Vec::new();

        let query = CommitQuery {
            branch: branch.to_string(),
            since: Some(since),
            until: None,
            limit: None,
        };
        let commits = match self.git.commits(workdir, &query) {
            Ok(commits) => commits,
            Err(err) => {
                log::warn!("failed to read workspace commits: {err}");
                Vec::new()
            }
        };
        let unpushed = match self.git.unpushed_commits(workdir, branch) {
            Ok(set) => Some(set),
            Err(err) => {
                log::debug!("unpushed set unavailable: {err}");
                None
            }
        };

        let workspace_ctx = CommitContext {
            repo_url: workdir_str,
            branch: Some(branch.to_string()),
            remote_name: None,
            origin_url: origin.map(str::to_string),
            has_origin: origin.is_some(),
            unpushed,
        };
        for commit in commits {
            match transformer::from_commit(commit, &workspace_ctx) {
                Ok(post) => posts.push(post),
                Err(err) => log::warn!("dropping workspace commit: {err}"),
            }
        }

        let Some(base) = storage_base else {
            return posts;
        };

        let lists = match self.lists.lists(workdir) {
            Ok(lists) => lists,
            Err(err) => {
                log::warn!("failed to read lists: {err}");
                Vec::new()
            }
        };

        let since_date = since.with_timezone(&Local).date_naive();
        let mut seen: HashSet<String> = HashSet::new();
        for list in &lists {
            for entry in &list.repositories {
                let (repo_url, repo_branch) = reference::parse_repository_id(entry);
                if repo_url.is_empty() || !seen.insert(reference::repository_id(&repo_url, &repo_branch)) {
                    continue;
                }
                posts.extend(self.gather_mirror_posts(
                    base,
                    &repo_url,
                    &repo_branch,
                    origin,
                    since,
                    since_date,
                ));
            }
        }

        posts
    }

    fn gather_mirror_posts(
        &self,
        base: &Path,
        repo_url: &str,
        branch: &str,
        origin: Option<&str>,
        since: DateTime<Utc>,
        since_date: NaiveDate,
    ) -> Vec<Post> {
        if let Err(err) = self
            .mirrors
            .ensure(base, repo_url, branch, &EnsureOptions::default())
        {
            log::warn!("failed to provision mirror for {repo_url}: {err}");
            return Vec::new();
        }
        if let Err(err) = self
            .mirrors
            .fetch(base, repo_url, Some(branch), Some(since_date))
        {
            log::warn!("failed to fetch mirror {repo_url}: {err}");
        }

        let query = CommitQuery {
            branch: branch.to_string(),
            since: Some(since),
            until: None,
            limit: None,
        };
        let commits = match self.mirrors.commits(base, repo_url, &query) {
            Ok(commits) => commits,
            Err(err) => {
                log::warn!("failed to read mirror commits for {repo_url}: {err}");
                return Vec::new();
            }
        };

        let ctx = CommitContext {
            repo_url: repo_url.to_string(),
            branch: Some(branch.to_string()),
            remote_name: Some(MIRROR_REMOTE.to_string()),
            origin_url: origin.map(str::to_string),
            has_origin: origin.is_some(),
            unpushed: None,
        };

        let mut posts = Vec::new();
        for commit in commits {
            match transformer::from_commit(commit, &ctx) {
                Ok(post) => posts.push(post),
                Err(err) => log::warn!("dropping mirror commit from {repo_url}: {err}"),
            }
        }
        posts
    }

    /// Process, recount over the union with already-cached posts, update
    /// list membership, and freeze. Returns how many ids were new.
    fn ingest(&mut self, workdir: &Path, gathered: Vec<Post>, origin: Option<&str>) -> usize {
        let workdir_str = workdir.display().to_string();
        let working = processor::process(gathered, origin, &mut self.index);

        let mut union: IndexMap<String, Post> = IndexMap::new();
        for frozen in self.store.snapshot() {
            union.insert(frozen.id.clone(), (*frozen).clone());
        }

        let mut admitted_new = 0;
        for (id, post) in working {
            if !union.contains_key(&id) {
                admitted_new += 1;
            }
            union.insert(id, post);
        }

        interactions::recount(&mut union, origin, &self.index);

        let lists = self.lists.lists(workdir).unwrap_or_else(|err| {
            log::debug!("lists unavailable for membership index: {err}");
            Vec::new()
        });
        for (id, post) in &union {
            for list in &lists {
                if post_matches_list(post, list) {
                    self.index
                        .add_list_member(index::list_key(&workdir_str, &list.id), id.clone());
                }
            }
        }

        for (_, post) in union {
            if self.index.is_merged(&post.id) {
                // A merged virtual must never sit in the store as a
                // standalone post.
                if let Some(stale) = self.store.remove(&post.id) {
                    self.index.untrack(&stale);
                }
                continue;
            }
            self.index.track(&post);
            self.store.insert(post);
        }

        admitted_new
    }

    /// Earliest fetched date across every mirror the lists follow.
    fn oldest_mirror_date(&self, workdir: &Path, storage_base: Option<&Path>) -> Option<NaiveDate> {
        let base = storage_base?;
        let lists = self.lists.lists(workdir).ok()?;

        let mut oldest: Option<NaiveDate> = None;
        for list in &lists {
            for entry in &list.repositories {
                let (repo_url, _) = reference::parse_repository_id(entry);
                if repo_url.is_empty() {
                    continue;
                }
                let dir = self.mirrors.mirror_dir(base, &repo_url);
                let Ok(config) = self.mirrors.read_config(&dir) else {
                    continue;
                };
                if let Some(start) = ranges::oldest_start(&config.fetched_ranges) {
                    oldest = Some(oldest.map_or(start, |current| current.min(start)));
                }
            }
        }
        oldest
    }
}

fn apply_filter(posts: &mut Vec<Post>, filter: &PostFilter, sort: bool) {
    if let Some(types) = &filter.types {
        posts.retain(|post| types.contains(&post.post_type));
    }
    if let Some(since) = filter.since {
        posts.retain(|post| post.timestamp >= since);
    }
    if let Some(until) = filter.until {
        posts.retain(|post| post.timestamp <= until);
    }

    if sort {
        match filter.sort_by {
            SortBy::Latest => posts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
            SortBy::Oldest => posts.sort_by_key(|post| post.timestamp),
            SortBy::Top => posts.sort_by(|a, b| {
                let score = |p: &Post| {
                    p.interactions.comments + p.interactions.reposts + p.interactions.quotes
                };
                score(b)
                    .cmp(&score(a))
                    .then_with(|| b.timestamp.cmp(&a.timestamp))
            }),
        }
    }

    if let Some(limit) = filter.limit {
        posts.truncate(limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PostType;
    use crate::test_fixtures::workspace_post;
    use chrono::TimeZone;

    #[test]
    fn test_cache_config_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.max_size, DEFAULT_CACHE_SIZE);
        assert_eq!(config.ttl_days, DEFAULT_TTL_DAYS);
    }

    #[test]
    fn test_apply_filter_types_and_window() {
        let mut target = workspace_post("aaa111bbb222", "original");
        target.timestamp = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();

        let mut comment = workspace_post("ccc333ddd444", "reply");
        comment.post_type = PostType::Comment;
        comment.original_post_id = Some("#commit:aaa111bbb222".to_string());
        comment.timestamp = Utc.with_ymd_and_hms(2024, 1, 20, 0, 0, 0).unwrap();

        let mut posts = vec![target, comment];
        let filter = PostFilter {
            types: Some(vec![PostType::Comment]),
            since: Some(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()),
            ..PostFilter::default()
        };
        apply_filter(&mut posts, &filter, true);

        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "#commit:ccc333ddd444");
    }

    #[test]
    fn test_apply_filter_sort_and_limit() {
        let mut a = workspace_post("aaa111bbb222", "a");
        a.timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut b = workspace_post("ccc333ddd444", "b");
        b.timestamp = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let mut c = workspace_post("eee555fff666", "c");
        c.timestamp = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        c.interactions.comments = 3;

        let mut posts = vec![a.clone(), b.clone(), c.clone()];
        apply_filter(&mut posts, &PostFilter::default(), true);
        assert_eq!(posts[0].id, c.id);
        assert_eq!(posts[2].id, a.id);

        let mut posts = vec![a.clone(), b.clone(), c.clone()];
        let filter = PostFilter {
            sort_by: SortBy::Oldest,
            limit: Some(1),
            ..PostFilter::default()
        };
        apply_filter(&mut posts, &filter, true);
        assert_eq!(posts, vec![a.clone()]);

        let mut posts = vec![a, b, c.clone()];
        let filter = PostFilter {
            sort_by: SortBy::Top,
            ..PostFilter::default()
        };
        apply_filter(&mut posts, &filter, true);
        assert_eq!(posts[0].id, c.id);
    }
}
