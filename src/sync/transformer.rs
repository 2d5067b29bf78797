//! Commit→Post transformation.
//!
//! Converts a raw commit (real path) or an embedded reference (virtual
//! path) into a [`Post`], deciding workspace-vs-external identity and
//! normalizing the interaction references so that everything stored on a
//! post is resolvable later.
//!
//! # Identity
//!
//! A commit observed through the `upstream` remote belongs to a mirrored
//! external repository and gets an absolute id; everything else is a
//! workspace commit with a relative id. A virtual post inherits its
//! identity from its reference target.
//!
//! # Rejection
//!
//! A post whose type is an interaction but which yields no original
//! reference is dropped, since it could never be counted. Virtual posts
//! additionally require quoted metadata and a usable timestamp.

use std::collections::HashSet;

use thiserror::Error;

use super::git::MIRROR_REMOTE;
use crate::gitmsg::{self, GitMsgReference};
use crate::models::{
    Author, CommitRecord, Interactions, ParsedGitMsg, Post, PostDisplay, PostSource, PostType,
    RawPost,
};
use crate::protocol::reference::{self, RefType};
use crate::protocol::{ProtocolError, hash, url};

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("interaction post {id} has no original reference")]
    MissingOriginalRef { id: String },

    #[error("virtual reference {target} has no quoted metadata")]
    EmptyVirtualBody { target: String },

    #[error("virtual reference {target} has no usable timestamp")]
    MissingTime { target: String },

    #[error("reference target {target} is not a commit reference")]
    NotACommitRef { target: String },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Where a commit was observed, and what the workspace knows about
/// itself at that moment.
#[derive(Debug, Clone, Default)]
pub struct CommitContext {
    /// Local workdir path for workspace commits, external repository URL
    /// for mirror commits. May be empty for a pathless workspace.
    pub repo_url: String,
    pub branch: Option<String>,
    /// Remote the commit was observed through; [`MIRROR_REMOTE`] marks
    /// external mirrors.
    pub remote_name: Option<String>,
    /// Normalized workspace origin URL, when configured.
    pub origin_url: Option<String>,
    /// Whether the repository has an origin remote at all.
    pub has_origin: bool,
    /// Hashes known to be unpushed. When absent the refname heuristic
    /// decides instead (the set wins whenever both are available).
    pub unpushed: Option<HashSet<String>>,
}

impl CommitContext {
    fn is_workspace(&self) -> bool {
        self.remote_name.as_deref() != Some(MIRROR_REMOTE)
    }
}

/// Transform a real commit into a post.
pub fn from_commit(commit: CommitRecord, ctx: &CommitContext) -> Result<Post, TransformError> {
    let is_workspace = ctx.is_workspace();
    let commit_hash = hash::normalize(&commit.hash)?;

    let external_url = if is_workspace {
        None
    } else {
        Some(url::normalize(&ctx.repo_url))
    };

    let id = reference::create(RefType::Commit, &commit_hash, external_url.as_deref())?;

    let repo_for_id = external_url.as_deref().unwrap_or(ctx.repo_url.as_str());
    let repository = match &ctx.branch {
        Some(branch) => reference::repository_id(repo_for_id, branch),
        None => repo_for_id.to_string(),
    };

    let parsed = gitmsg::parse_message(&commit.message);
    let (content, source, gitmsg) = match parsed {
        Some(message) => (
            message.content,
            PostSource::Explicit,
            Some(ParsedGitMsg {
                header: message.header,
                references: message.references,
            }),
        ),
        None => (commit.message.clone(), PostSource::Implicit, None),
    };

    let header = gitmsg.as_ref().map(|g| &g.header);
    let post_type = PostType::from_field(header.and_then(|h| h.field("type")));

    // Stored references must always resolve: external posts rewrite
    // relative refs against their own repository; workspace posts keep
    // them relative.
    let ref_context = external_url.as_deref();
    let parent_comment_id = header
        .and_then(|h| h.field("reply-to"))
        .map(|raw| normalize_interaction_ref(raw, is_workspace, ref_context));
    let original_post_id = header
        .and_then(|h| h.field("original"))
        .map(|raw| normalize_interaction_ref(raw, is_workspace, ref_context));

    if post_type.is_interaction() && original_post_id.is_none() {
        return Err(TransformError::MissingOriginalRef { id });
    }

    let is_unpushed = if ctx.has_origin && is_workspace {
        match &ctx.unpushed {
            Some(set) => set.contains(&commit.hash),
            None => commit
                .refname
                .as_deref()
                .is_some_and(|r| r.starts_with("refs/heads/")),
        }
    } else {
        false
    };

    let commit_url = match (&external_url, &ctx.origin_url) {
        (Some(repo), _) => Some(format!("{repo}/commit/{}", commit.hash)),
        (None, Some(origin)) => Some(format!("{origin}/commit/{}", commit.hash)),
        (None, None) => None,
    };

    let repository_name = match &external_url {
        Some(repo) => repo_display_name(repo),
        None => workspace_display_name(&ctx.repo_url, ctx.origin_url.as_deref()),
    };

    let is_origin = if is_workspace {
        ctx.has_origin
    } else {
        external_url == ctx.origin_url
    };

    let clean_content = gitmsg::strip_reference_blocks(&content);
    let display = PostDisplay {
        repository_name,
        commit_hash,
        commit_url,
        total_reposts: 0,
        is_empty: clean_content.trim().is_empty(),
        is_unpushed,
        is_origin,
        is_workspace_post: is_workspace,
    };

    Ok(Post {
        id,
        repository,
        branch: ctx.branch.clone(),
        author: Author {
            name: commit.author.clone(),
            email: commit.email.clone(),
        },
        timestamp: commit.timestamp,
        content,
        post_type,
        source,
        is_workspace_post: is_workspace,
        is_virtual: false,
        original_post_id,
        parent_comment_id,
        raw: RawPost { commit, gitmsg },
        clean_content,
        interactions: Interactions::default(),
        display,
    })
}

/// Materialize a post from an embedded reference. The reference target
/// becomes the post id; the quoted metadata becomes its content.
pub fn from_reference(embedded: &GitMsgReference) -> Result<Post, TransformError> {
    let target = reference::normalize(&embedded.target);
    let parsed = reference::parse(&target);
    if parsed.ref_type != RefType::Commit {
        return Err(TransformError::NotACommitRef {
            target: embedded.target.clone(),
        });
    }

    let body = embedded.body.trim();
    if body.is_empty() {
        return Err(TransformError::EmptyVirtualBody {
            target: target.clone(),
        });
    }

    let timestamp = embedded.time.ok_or_else(|| TransformError::MissingTime {
        target: target.clone(),
    })?;

    let is_workspace = parsed.repository.is_none();
    let repo_url = parsed.repository.clone().unwrap_or_default();
    let post_type = PostType::from_field(embedded.field("type"));

    let ref_context = parsed.repository.as_deref();
    let original_post_id = embedded
        .field("original")
        .map(|raw| normalize_interaction_ref(raw, is_workspace, ref_context));
    let parent_comment_id = embedded
        .field("reply-to")
        .map(|raw| normalize_interaction_ref(raw, is_workspace, ref_context));

    if post_type.is_interaction() && original_post_id.is_none() {
        return Err(TransformError::MissingOriginalRef { id: target });
    }

    let content = body.to_string();
    let clean_content = gitmsg::strip_reference_blocks(&content);
    let commit_url = parsed
        .repository
        .as_ref()
        .map(|repo| format!("{repo}/commit/{}", parsed.value));

    let display = PostDisplay {
        repository_name: if repo_url.is_empty() {
            String::new()
        } else {
            repo_display_name(&repo_url)
        },
        commit_hash: parsed.value.clone(),
        commit_url,
        total_reposts: 0,
        is_empty: false,
        is_unpushed: false,
        is_origin: false,
        is_workspace_post: is_workspace,
    };

    Ok(Post {
        id: target,
        repository: repo_url,
        branch: None,
        author: Author {
            name: embedded.author.clone().unwrap_or_default(),
            email: embedded.email.clone().unwrap_or_default(),
        },
        timestamp,
        content: content.clone(),
        post_type,
        source: PostSource::Explicit,
        is_workspace_post: is_workspace,
        is_virtual: true,
        original_post_id,
        parent_comment_id,
        raw: RawPost {
            commit: CommitRecord {
                hash: parsed.value,
                author: embedded.author.clone().unwrap_or_default(),
                email: embedded.email.clone().unwrap_or_default(),
                timestamp,
                message: embedded.body.clone(),
                refname: None,
            },
            gitmsg: None,
        },
        clean_content,
        interactions: Interactions::default(),
        display,
    })
}

fn normalize_interaction_ref(raw: &str, is_workspace: bool, repo_context: Option<&str>) -> String {
    if is_workspace {
        reference::normalize(raw)
    } else {
        reference::normalize_hash_in_ref_with_context(raw, repo_context)
    }
}

/// `owner/repo` from the trailing path segments of a repository URL.
fn repo_display_name(repo_url: &str) -> String {
    let path = repo_url
        .strip_prefix("https://")
        .and_then(|rest| rest.split_once('/'))
        .map(|(_, path)| path)
        .unwrap_or(repo_url);

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [] => repo_url.to_string(),
        [one] => (*one).to_string(),
        [.., owner, repo] => format!("{owner}/{repo}"),
    }
}

/// Workspace posts display their origin's name when one is configured,
/// else the workdir's last path component.
fn workspace_display_name(workdir: &str, origin_url: Option<&str>) -> String {
    if let Some(origin) = origin_url {
        return repo_display_name(origin);
    }
    workdir
        .trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(workdir)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use indexmap::IndexMap;

    fn commit(hash: &str, message: &str) -> CommitRecord {
        CommitRecord {
            hash: hash.to_string(),
            author: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
            message: message.to_string(),
            refname: Some("refs/heads/main".to_string()),
        }
    }

    fn workspace_ctx() -> CommitContext {
        CommitContext {
            repo_url: "/home/ada/project".to_string(),
            branch: Some("main".to_string()),
            ..CommitContext::default()
        }
    }

    fn external_ctx(repo_url: &str) -> CommitContext {
        CommitContext {
            repo_url: repo_url.to_string(),
            branch: Some("main".to_string()),
            remote_name: Some(MIRROR_REMOTE.to_string()),
            ..CommitContext::default()
        }
    }

    #[test]
    fn test_workspace_post_gets_relative_id() {
        let post = from_commit(commit("ABC123DEF4567890", "hello world"), &workspace_ctx()).unwrap();
        assert_eq!(post.id, "#commit:abc123def456");
        assert!(post.is_workspace_post);
        assert_eq!(post.source, PostSource::Implicit);
        assert_eq!(post.post_type, PostType::Post);
        assert_eq!(post.content, "hello world");
        assert_eq!(post.repository, "/home/ada/project#branch:main");
    }

    #[test]
    fn test_external_post_gets_absolute_id() {
        let post = from_commit(
            commit("abc123def4567890", "hi"),
            &external_ctx("https://GitHub.com/u/r.git"),
        )
        .unwrap();
        assert_eq!(post.id, "https://github.com/u/r#commit:abc123def456");
        assert!(!post.is_workspace_post);
        assert_eq!(post.repository, "https://github.com/u/r#branch:main");
        assert_eq!(post.display.repository_name, "u/r");
    }

    #[test]
    fn test_explicit_comment_parses_header() {
        let message = concat!(
            "nice work!\n",
            "\n",
            "--- GitMsg: ext=\"social\"; type=\"comment\"; original=\"#commit:aaa111bbb222\"; ",
            "reply-to=\"#commit:ccc333ddd444\"; v=\"1.0\"; ext-v=\"1.0\" ---\n",
        );
        let post = from_commit(commit("abc123def456", message), &workspace_ctx()).unwrap();
        assert_eq!(post.post_type, PostType::Comment);
        assert_eq!(post.source, PostSource::Explicit);
        assert_eq!(post.original_post_id.as_deref(), Some("#commit:aaa111bbb222"));
        assert_eq!(post.parent_comment_id.as_deref(), Some("#commit:ccc333ddd444"));
        assert_eq!(post.content, "nice work!");
    }

    #[test]
    fn test_external_comment_rewrites_relative_refs() {
        let message = concat!(
            "agreed\n",
            "\n",
            "--- GitMsg: ext=\"social\"; type=\"comment\"; original=\"#commit:aaa111bbb222\"; ",
            "v=\"1.0\"; ext-v=\"1.0\" ---\n",
        );
        let post = from_commit(
            commit("abc123def456", message),
            &external_ctx("https://github.com/u/r"),
        )
        .unwrap();
        assert_eq!(
            post.original_post_id.as_deref(),
            Some("https://github.com/u/r#commit:aaa111bbb222")
        );
    }

    #[test]
    fn test_interaction_without_original_is_rejected() {
        let message = concat!(
            "orphan comment\n",
            "\n",
            "--- GitMsg: ext=\"social\"; type=\"comment\"; v=\"1.0\"; ext-v=\"1.0\" ---\n",
        );
        let err = from_commit(commit("abc123def456", message), &workspace_ctx()).unwrap_err();
        assert!(matches!(err, TransformError::MissingOriginalRef { .. }));
    }

    #[test]
    fn test_unpushed_set_wins_over_refname() {
        let mut ctx = workspace_ctx();
        ctx.has_origin = true;
        ctx.origin_url = Some("https://github.com/u/r".to_string());
        ctx.unpushed = Some(HashSet::from(["abc123def4567890".to_string()]));

        let post = from_commit(commit("abc123def4567890", "x"), &ctx).unwrap();
        assert!(post.display.is_unpushed);

        ctx.unpushed = Some(HashSet::new());
        let post = from_commit(commit("abc123def4567890", "x"), &ctx).unwrap();
        assert!(!post.display.is_unpushed);
    }

    #[test]
    fn test_refname_heuristic_without_set() {
        let mut ctx = workspace_ctx();
        ctx.has_origin = true;
        let post = from_commit(commit("abc123def456", "x"), &ctx).unwrap();
        assert!(post.display.is_unpushed);

        ctx.has_origin = false;
        let post = from_commit(commit("abc123def456", "x"), &ctx).unwrap();
        assert!(!post.display.is_unpushed);
    }

    fn embedded(target: &str, body: &str, post_type: &str) -> GitMsgReference {
        let mut fields = IndexMap::new();
        fields.insert("type".to_string(), post_type.to_string());
        GitMsgReference {
            ext: "social".to_string(),
            author: Some("Grace".to_string()),
            email: Some("grace@example.com".to_string()),
            time: Some(Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap()),
            fields,
            target: target.to_string(),
            version: "1.0".to_string(),
            ext_version: "1.0".to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_virtual_post_from_reference() {
        let post = from_reference(&embedded(
            "https://github.com/u/r#commit:ABC123DEF456789",
            "quoted content",
            "post",
        ))
        .unwrap();
        assert_eq!(post.id, "https://github.com/u/r#commit:abc123def456");
        assert!(post.is_virtual);
        assert!(!post.is_workspace_post);
        assert_eq!(post.source, PostSource::Explicit);
        assert_eq!(post.content, "quoted content");
        assert_eq!(post.author.name, "Grace");
    }

    #[test]
    fn test_virtual_relative_target_is_workspace() {
        let post = from_reference(&embedded("#commit:abc123def456", "body", "post")).unwrap();
        assert!(post.is_workspace_post);
        assert_eq!(post.repository, "");
    }

    #[test]
    fn test_virtual_requires_body_and_time() {
        let empty = embedded("#commit:abc123def456", "   ", "post");
        assert!(matches!(
            from_reference(&empty).unwrap_err(),
            TransformError::EmptyVirtualBody { .. }
        ));

        let mut timeless = embedded("#commit:abc123def456", "body", "post");
        timeless.time = None;
        assert!(matches!(
            from_reference(&timeless).unwrap_err(),
            TransformError::MissingTime { .. }
        ));
    }

    #[test]
    fn test_virtual_rejects_non_commit_target() {
        let branch_ref = embedded("#branch:main", "body", "post");
        assert!(matches!(
            from_reference(&branch_ref).unwrap_err(),
            TransformError::NotACommitRef { .. }
        ));
    }

    #[test]
    fn test_repo_display_name() {
        assert_eq!(repo_display_name("https://github.com/u/r"), "u/r");
        assert_eq!(repo_display_name("https://gitlab.com/a/b/c"), "b/c");
    }

    #[test]
    fn test_workspace_display_name() {
        assert_eq!(
            workspace_display_name("/home/ada/project", None),
            "project"
        );
        assert_eq!(
            workspace_display_name("/home/ada/project", Some("https://github.com/u/r")),
            "u/r"
        );
    }
}
