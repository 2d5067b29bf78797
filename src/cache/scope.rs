//! Query and refresh scopes, and the post filter.
//!
//! Scope strings are the controller's query surface. Parsing is strict:
//! anything that fits no production is an invalid-input error, reported
//! synchronously with the cache untouched.

use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::CacheError;
use crate::models::{List, PostType};

/// What a query selects from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryScope {
    /// Every post in the cache.
    All,
    /// Every post (the timeline view).
    Timeline,
    /// Posts of the workspace repository, on its configured branch.
    MyRepository,
    /// Posts of one external repository, optionally narrowed to a list.
    Repository { url: String, list: Option<String> },
    /// Posts whose repository belongs to a stored list.
    List(String),
    /// A single post by id.
    Post(String),
    /// A batch of posts by id.
    ByIds(Vec<String>),
    /// A thread view anchored at the given post.
    Thread(String),
}

impl FromStr for QueryScope {
    type Err = CacheError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        match input {
            "" => Err(CacheError::InvalidInput("empty scope".to_string())),
            "all" => Ok(QueryScope::All),
            "timeline" => Ok(QueryScope::Timeline),
            "repository:my" => Ok(QueryScope::MyRepository),
            _ => {
                if let Some(rest) = input.strip_prefix("repository:") {
                    if rest.is_empty() {
                        return Err(CacheError::InvalidInput(
                            "repository scope without a url".to_string(),
                        ));
                    }
                    return Ok(match rest.rsplit_once("/list:") {
                        Some((url, list)) if !list.is_empty() => QueryScope::Repository {
                            url: url.to_string(),
                            list: Some(list.to_string()),
                        },
                        _ => QueryScope::Repository {
                            url: rest.to_string(),
                            list: None,
                        },
                    });
                }
                if let Some(id) = non_empty_suffix(input, "list:") {
                    return Ok(QueryScope::List(id));
                }
                if let Some(id) = non_empty_suffix(input, "post:") {
                    return Ok(QueryScope::Post(id));
                }
                if let Some(csv) = non_empty_suffix(input, "byId:") {
                    let ids: Vec<String> = csv
                        .split(',')
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                        .map(str::to_string)
                        .collect();
                    if ids.is_empty() {
                        return Err(CacheError::InvalidInput(
                            "byId scope without ids".to_string(),
                        ));
                    }
                    return Ok(QueryScope::ByIds(ids));
                }
                if let Some(id) = non_empty_suffix(input, "thread:") {
                    return Ok(QueryScope::Thread(id));
                }
                Err(CacheError::InvalidInput(format!(
                    "unrecognized scope `{input}`"
                )))
            }
        }
    }
}

fn non_empty_suffix(input: &str, prefix: &str) -> Option<String> {
    input
        .strip_prefix(prefix)
        .filter(|rest| !rest.is_empty())
        .map(str::to_string)
}

/// What a refresh invalidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshScope {
    /// Drop everything and deinitialize.
    All,
    /// Evict the posts behind specific commit hashes.
    Hashes(Vec<String>),
    /// Mark specific repositories stale (deinitializes).
    Repositories(Vec<String>),
    /// Mark specific lists stale (deinitializes).
    Lists(Vec<String>),
}

/// Sort order for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    /// Newest first.
    #[default]
    Latest,
    /// Oldest first.
    Oldest,
    /// Most interacted-with first (comments + reposts + quotes), ties
    /// broken newest-first.
    Top,
}

/// Optional narrowing applied after scope resolution.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub types: Option<Vec<PostType>>,
    /// Inclusive lower bound on the post timestamp.
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the post timestamp.
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub sort_by: SortBy,
    /// A hint only: the controller never re-ingests on its own; callers
    /// wanting fresh data refresh explicitly.
    pub skip_cache: bool,
}

/// Caller-supplied context for scopes that need more than the cache.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    /// Fallback list definition for `list:` scopes whose membership
    /// index is empty.
    pub list: Option<List>,
}
