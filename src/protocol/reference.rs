//! GitMsg reference strings.
//!
//! A reference denotes a commit, branch, or list, optionally scoped to a
//! repository URL:
//!
//! - commit: `[repo]#commit:<12-hex>`
//! - branch: `[repo]#branch:<name>`
//! - list:   `[repo]#list:<id>`
//!
//! With the repo portion present the reference is **absolute**; without
//! it the reference is **relative** and anchored to the current
//! workspace. The repo portion, when present, must itself validate as a
//! repository URL; anything that fits none of the shapes parses as
//! [`RefType::Unknown`].

use std::sync::LazyLock;

use regex::Regex;

use super::{ProtocolError, hash, url};

/// Default branch assumed when a repository id carries no branch part.
pub const DEFAULT_BRANCH: &str = "main";

static BRANCH_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9/_-]+$").expect("branch value regex"));

static LIST_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,40}$").expect("list value regex"));

static COMMIT_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-f0-9]{12}$").expect("commit value regex"));

/// The kind of entity a reference denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefType {
    Commit,
    Branch,
    List,
    Unknown,
}

impl RefType {
    pub fn as_str(self) -> &'static str {
        match self {
            RefType::Commit => "commit",
            RefType::Branch => "branch",
            RefType::List => "list",
            RefType::Unknown => "unknown",
        }
    }
}

/// Structured form of a reference string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRef {
    pub ref_type: RefType,
    /// Canonical value: a 12-hex hash for commits, the raw name for
    /// branches and lists. For `Unknown` this is the whole input.
    pub value: String,
    /// Normalized repository URL for absolute references.
    pub repository: Option<String>,
}

impl ParsedRef {
    /// True when the reference is anchored to the current workspace.
    pub fn is_relative(&self) -> bool {
        self.repository.is_none()
    }
}

/// Build a canonical reference string.
///
/// Commit values are lowercased and truncated to 12 hex characters;
/// branch and list values are validated against their exact shapes. The
/// repository portion, when given, is normalized.
pub fn create(
    ref_type: RefType,
    value: &str,
    repository: Option<&str>,
) -> Result<String, ProtocolError> {
    let canonical_value = match ref_type {
        RefType::Commit => hash::normalize(value)?,
        RefType::Branch => {
            if !BRANCH_VALUE.is_match(value) {
                return Err(ProtocolError::InvalidRefValue {
                    kind: "branch",
                    value: value.to_string(),
                });
            }
            value.to_string()
        }
        RefType::List => {
            if !LIST_VALUE.is_match(value) {
                return Err(ProtocolError::InvalidRefValue {
                    kind: "list",
                    value: value.to_string(),
                });
            }
            value.to_string()
        }
        RefType::Unknown => {
            return Err(ProtocolError::InvalidRefValue {
                kind: "unknown",
                value: value.to_string(),
            });
        }
    };

    let repo = repository.map(url::normalize).unwrap_or_default();
    Ok(format!("{repo}#{}:{canonical_value}", ref_type.as_str()))
}

/// Parse a reference string into its structured form.
///
/// Never fails: anything unrecognized comes back as [`RefType::Unknown`]
/// with the whole input as the value.
pub fn parse(input: &str) -> ParsedRef {
    let unknown = || ParsedRef {
        ref_type: RefType::Unknown,
        value: input.to_string(),
        repository: None,
    };

    let Some((repo_part, ref_part)) = input.split_once('#') else {
        return unknown();
    };

    let repository = if repo_part.is_empty() {
        None
    } else {
        let normalized = url::normalize(repo_part);
        if !url::validate(&normalized) {
            return unknown();
        }
        Some(normalized)
    };

    let Some((kind, raw_value)) = ref_part.split_once(':') else {
        return unknown();
    };

    match kind {
        "commit" => match hash::normalize(raw_value) {
            Ok(value) => ParsedRef {
                ref_type: RefType::Commit,
                value,
                repository,
            },
            Err(_) => unknown(),
        },
        "branch" if BRANCH_VALUE.is_match(raw_value) => ParsedRef {
            ref_type: RefType::Branch,
            value: raw_value.to_string(),
            repository,
        },
        "list" if LIST_VALUE.is_match(raw_value) => ParsedRef {
            ref_type: RefType::List,
            value: raw_value.to_string(),
            repository,
        },
        _ => unknown(),
    }
}

/// Validate a reference against the exact shape of its type.
///
/// With `expected` given, only that type is accepted; otherwise any of
/// the three known shapes passes. Commit values must already be in
/// canonical 12-hex form.
pub fn validate(input: &str, expected: Option<RefType>) -> bool {
    let Some((repo_part, ref_part)) = input.split_once('#') else {
        return false;
    };

    if !repo_part.is_empty() && !url::validate(repo_part) {
        return false;
    }

    let Some((kind, value)) = ref_part.split_once(':') else {
        return false;
    };

    let actual = match kind {
        "commit" if COMMIT_VALUE.is_match(value) => RefType::Commit,
        "branch" if BRANCH_VALUE.is_match(value) => RefType::Branch,
        "list" if LIST_VALUE.is_match(value) => RefType::List,
        _ => return false,
    };

    expected.is_none_or(|e| e == actual)
}

/// Rewrite commit references to canonical 12-hex form; other types come
/// back unchanged.
pub fn normalize(input: &str) -> String {
    let parsed = parse(input);
    if parsed.ref_type != RefType::Commit {
        return input.to_string();
    }
    create(RefType::Commit, &parsed.value, parsed.repository.as_deref())
        .unwrap_or_else(|_| input.to_string())
}

/// True iff the reference is relative, i.e. anchored to the workspace.
pub fn is_my_repository(input: &str) -> bool {
    input.starts_with('#')
}

/// Split a repository id of the form `url#branch:b` into its parts.
/// The branch defaults to [`DEFAULT_BRANCH`] when absent.
pub fn parse_repository_id(input: &str) -> (String, String) {
    match input.split_once('#') {
        Some((repo, rest)) => {
            let branch = rest
                .strip_prefix("branch:")
                .filter(|b| !b.is_empty())
                .unwrap_or(DEFAULT_BRANCH);
            (url::normalize(repo), branch.to_string())
        }
        None => (url::normalize(input), DEFAULT_BRANCH.to_string()),
    }
}

/// Build the canonical `url#branch:b` repository id used as an index key.
///
/// The url may be empty for workspace posts with no configured origin.
pub fn repository_id(repo_url: &str, branch: &str) -> String {
    format!("{repo_url}#branch:{branch}")
}

/// Rewrite a relative commit reference to its absolute form against the
/// given repository context. Absolute commit references are normalized;
/// everything else passes through untouched.
pub fn normalize_hash_in_ref_with_context(input: &str, context_repo: Option<&str>) -> String {
    let parsed = parse(input);
    if parsed.ref_type != RefType::Commit {
        return input.to_string();
    }

    let repo = match (&parsed.repository, context_repo) {
        (Some(repo), _) => Some(repo.clone()),
        (None, Some(ctx)) => Some(url::normalize(ctx)),
        (None, None) => None,
    };

    create(RefType::Commit, &parsed.value, repo.as_deref())
        .unwrap_or_else(|_| input.to_string())
}
