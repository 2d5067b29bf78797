//! Reference processing and deduplication.
//!
//! Runs over transformed posts in admission order and produces the
//! working set the cache will freeze. Four responsibilities:
//!
//! 1. Re-normalize interaction references against the right repository
//!    context so every stored reference resolves.
//! 2. Register absolute↔relative identity mappings for workspace posts
//!    and drop external duplicates of workspace posts.
//! 3. Apply the admission rule: first writer wins, except that an
//!    explicit post replaces an implicit one with the same id.
//! 4. Expand embedded social references into virtual posts, merging a
//!    virtual that targets an existing workspace post into that post
//!    instead of admitting a standalone stub.
//!
//! Order matters: the workspace pass runs before mirrors, so duplicate
//! and merge checks can rely on workspace posts already being present.

use indexmap::IndexMap;

use super::transformer;
use crate::cache::index::PostIndex;
use crate::gitmsg::{GitMsgReference, SOCIAL_EXT};
use crate::models::{Post, PostSource, PostType};
use crate::protocol::reference::{self, RefType};

/// Process transformed posts into the deduplicated working set,
/// registering identity mappings and merged virtuals on the index.
pub fn process(
    posts: Vec<Post>,
    origin_url: Option<&str>,
    index: &mut PostIndex,
) -> IndexMap<String, Post> {
    let mut working: IndexMap<String, Post> = IndexMap::new();

    for mut post in posts {
        renormalize_refs(&mut post, origin_url);

        if post.is_workspace_post {
            register_workspace_identity(&post, origin_url, index);
        } else if drops_as_workspace_duplicate(&post, origin_url, &working, index) {
            continue;
        }

        let embedded: Vec<GitMsgReference> = post
            .raw
            .gitmsg
            .as_ref()
            .map(|g| {
                g.references
                    .iter()
                    .filter(|r| r.ext == SOCIAL_EXT && !r.body.trim().is_empty())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let embedding_repo = if post.is_workspace_post {
            None
        } else {
            reference::parse(&post.id).repository
        };

        if !admit(&mut working, post) {
            continue;
        }

        for embedded_ref in embedded {
            expand_reference(
                &embedded_ref,
                embedding_repo.as_deref(),
                origin_url,
                index,
                &mut working,
            );
        }
    }

    working
}

/// Admission rule: admit when absent, or when an explicit post arrives
/// for an id currently held by a non-explicit one. Two explicit posts
/// with the same id resolve to the existing entry.
fn admit(working: &mut IndexMap<String, Post>, post: Post) -> bool {
    match working.get(&post.id) {
        None => {
            working.insert(post.id.clone(), post);
            true
        }
        Some(existing)
            if post.source == PostSource::Explicit && existing.source != PostSource::Explicit =>
        {
            log::debug!("explicit post {} replaces implicit entry", post.id);
            working.insert(post.id.clone(), post);
            true
        }
        Some(_) => false,
    }
}

/// Relative inner references are rewritten absolute against the right
/// repository context: the post's own repository for external posts, the
/// configured origin for workspace posts. Everything else is
/// canonicalized in place.
fn renormalize_refs(post: &mut Post, origin_url: Option<&str>) {
    if post.is_workspace_post && origin_url.is_none() {
        return;
    }

    let context = if post.is_workspace_post {
        origin_url.map(str::to_string)
    } else {
        reference::parse(&post.id).repository
    };

    for field in [&mut post.original_post_id, &mut post.parent_comment_id] {
        if let Some(value) = field {
            *value = if reference::is_my_repository(value) {
                reference::normalize_hash_in_ref_with_context(value, context.as_deref())
            } else {
                reference::normalize(value)
            };
        }
    }
}

/// A workspace post with a configured origin is reachable under its
/// absolute form too; record the translation.
fn register_workspace_identity(post: &Post, origin_url: Option<&str>, index: &mut PostIndex) {
    let Some(origin) = origin_url else { return };
    if let Ok(absolute) = reference::create(
        RefType::Commit,
        &post.display.commit_hash,
        Some(origin),
    ) {
        index.insert_absolute(absolute, post.id.clone());
    }
}

/// An external post whose repository is the workspace origin duplicates
/// the workspace post at the same hash: record the mapping, drop the
/// external copy.
fn drops_as_workspace_duplicate(
    post: &Post,
    origin_url: Option<&str>,
    working: &IndexMap<String, Post>,
    index: &mut PostIndex,
) -> bool {
    let Some(origin) = origin_url else {
        return false;
    };
    let parsed = reference::parse(&post.id);
    if parsed.ref_type != RefType::Commit || parsed.repository.as_deref() != Some(origin) {
        return false;
    }

    let Ok(relative) = reference::create(RefType::Commit, &parsed.value, None) else {
        return false;
    };
    if !working.contains_key(&relative) {
        return false;
    }

    log::debug!("dropping external duplicate {} of {relative}", post.id);
    index.insert_absolute(post.id.clone(), relative);
    true
}

/// Expand one embedded social reference: merge into an existing
/// workspace post when the target resolves to one, admit a virtual post
/// otherwise.
fn expand_reference(
    embedded: &GitMsgReference,
    embedding_repo: Option<&str>,
    origin_url: Option<&str>,
    index: &mut PostIndex,
    working: &mut IndexMap<String, Post>,
) {
    // A relative target inside an external post is relative to that
    // external repository.
    let target = reference::normalize_hash_in_ref_with_context(&embedded.target, embedding_repo);
    if reference::parse(&target).ref_type != RefType::Commit {
        log::debug!("skipping embedded reference with non-commit target `{target}`");
        return;
    }

    if let Some(relative) = workspace_equivalent(&target, origin_url) {
        let is_workspace_target = working
            .get(&relative)
            .is_some_and(|existing| existing.is_workspace_post);
        if is_workspace_target {
            merge_into_workspace(embedded, &target, &relative, index, working);
            return;
        }
    }

    let mut resolved = embedded.clone();
    resolved.target = target;
    match transformer::from_reference(&resolved) {
        Ok(virtual_post) => {
            if working.contains_key(&virtual_post.id) {
                return;
            }
            if virtual_post.is_workspace_post {
                register_workspace_identity(&virtual_post, origin_url, index);
            }
            log::debug!("admitting virtual post {}", virtual_post.id);
            working.insert(virtual_post.id.clone(), virtual_post);
        }
        Err(err) => log::debug!("skipping embedded reference: {err}"),
    }
}

/// Relative form of a target that points into the workspace, either
/// directly or through the configured origin.
fn workspace_equivalent(target: &str, origin_url: Option<&str>) -> Option<String> {
    if reference::is_my_repository(target) {
        return Some(target.to_string());
    }
    let origin = origin_url?;
    let parsed = reference::parse(target);
    if parsed.ref_type == RefType::Commit && parsed.repository.as_deref() == Some(origin) {
        reference::create(RefType::Commit, &parsed.value, None).ok()
    } else {
        None
    }
}

/// The real post is authoritative; a merged virtual contributes only its
/// interaction. No other field changes.
fn merge_into_workspace(
    embedded: &GitMsgReference,
    target: &str,
    relative: &str,
    index: &mut PostIndex,
    working: &mut IndexMap<String, Post>,
) {
    let reference_type = PostType::from_field(embedded.field("type"));

    if let Some(workspace_post) = working.get_mut(relative) {
        match reference_type {
            PostType::Comment => workspace_post.interactions.comments += 1,
            PostType::Repost => workspace_post.interactions.reposts += 1,
            PostType::Quote => workspace_post.interactions.quotes += 1,
            PostType::Post => {}
        }
        workspace_post.sync_total_reposts();
    }

    if target != relative {
        index.insert_absolute(target.to_string(), relative.to_string());
    }
    index.mark_merged(target.to_string());
    log::debug!("merged virtual {target} into workspace post {relative}");
}
