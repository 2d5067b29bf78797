//! Thread assembly: anchor, parent chain, children.
//!
//! Works over a flat snapshot of cached posts. Resolution is by id
//! matching, never pointer traversal, and both upward walks carry a
//! visited set so reference cycles terminate.

use std::collections::HashSet;

use thiserror::Error;

use crate::models::{Post, PostType};
use crate::protocol::reference::{self, RefType};

/// Sort order for a thread's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadSort {
    /// Most interacted-with first (comments + reposts + quotes).
    Top,
    /// Oldest first, natural reading order.
    #[default]
    Oldest,
    /// Newest first.
    Latest,
}

#[derive(Debug, Error)]
pub enum ThreadError {
    #[error("post not found: {0}")]
    PostNotFound(String),
}

/// An assembled thread view around an anchor post.
#[derive(Debug, Clone)]
pub struct ThreadView {
    pub anchor: Post,
    /// Original post (when distinct) followed by the parent-comment
    /// chain, top to bottom.
    pub parents: Vec<Post>,
    /// Direct replies and interactions, in the requested order.
    pub children: Vec<Post>,
    /// Id of the thread root reached by following original references.
    pub thread_root_id: String,
}

/// Two ids match when string-equal or when both are commit references
/// with the same hash value, whichever repository they carry.
fn ids_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let pa = reference::parse(a);
    let pb = reference::parse(b);
    pa.ref_type == RefType::Commit && pb.ref_type == RefType::Commit && pa.value == pb.value
}

fn find_by_id<'a>(posts: &'a [Post], id: &str) -> Option<&'a Post> {
    posts.iter().find(|p| ids_match(&p.id, id))
}

/// Assemble the thread around `anchor_id`.
pub fn build_thread(
    posts: &[Post],
    anchor_id: &str,
    sort: ThreadSort,
) -> Result<ThreadView, ThreadError> {
    let anchor = posts
        .iter()
        .find(|p| p.id == anchor_id)
        .ok_or_else(|| ThreadError::PostNotFound(anchor_id.to_string()))?;

    let thread_root_id = walk_to_root(posts, anchor);
    let chain = parent_chain(posts, anchor);

    // The original shown above the chain: the topmost parent's original,
    // else the anchor's own. Quotes are the exception: their content already
    // carries what they quote.
    let mut parents: Vec<Post> = Vec::new();
    let original_ref = match chain.first() {
        Some(top) => top.original_post_id.as_deref(),
        None if anchor.post_type != PostType::Quote => anchor.original_post_id.as_deref(),
        None => None,
    };
    if let Some(original_id) = original_ref {
        if let Some(original) = find_by_id(posts, original_id) {
            if original.id != anchor.id {
                parents.push(original.clone());
            }
        }
    }
    parents.extend(chain.iter().map(|p| (*p).clone()));

    let mut children: Vec<Post> = posts
        .iter()
        .filter(|p| p.id != anchor.id)
        .filter(|p| is_child_of(p, anchor))
        .cloned()
        .collect();
    sort_children(&mut children, sort);

    Ok(ThreadView {
        anchor: anchor.clone(),
        parents,
        children,
        thread_root_id,
    })
}

/// Follow original references upward until a post without one (or an
/// unresolvable/cyclic reference); that post is the thread root.
fn walk_to_root(posts: &[Post], anchor: &Post) -> String {
    let mut current = anchor;
    let mut visited: HashSet<&str> = HashSet::from([current.id.as_str()]);

    while let Some(original_id) = current.original_post_id.as_deref() {
        let Some(parent) = find_by_id(posts, original_id) else {
            break;
        };
        if !visited.insert(parent.id.as_str()) {
            log::debug!("reference cycle at {} while walking to root", parent.id);
            break;
        }
        current = parent;
    }

    current.id.clone()
}

/// Ordered chain of parent comments above the anchor, top to bottom.
fn parent_chain<'a>(posts: &'a [Post], anchor: &Post) -> Vec<&'a Post> {
    let mut chain: Vec<&Post> = Vec::new();
    let mut visited: HashSet<&str> = HashSet::from([anchor.id.as_str()]);
    let mut current = anchor.parent_comment_id.as_deref();

    while let Some(parent_id) = current {
        let Some(parent) = find_by_id(posts, parent_id) else {
            break;
        };
        if !visited.insert(parent.id.as_str()) {
            break;
        }
        chain.push(parent);
        current = parent.parent_comment_id.as_deref();
    }

    chain.reverse();
    chain
}

/// A child replies to the anchor directly or comments under it. Reposts
/// are not listed under the original they repost; the counter already
/// accounts for them.
fn is_child_of(candidate: &Post, anchor: &Post) -> bool {
    let via_original = candidate
        .original_post_id
        .as_deref()
        .is_some_and(|original| ids_match(original, &anchor.id))
        && candidate.post_type != PostType::Repost;

    let via_parent = candidate
        .parent_comment_id
        .as_deref()
        .is_some_and(|parent| ids_match(parent, &anchor.id));

    via_original || via_parent
}

fn sort_children(children: &mut [Post], sort: ThreadSort) {
    match sort {
        ThreadSort::Oldest => children.sort_by_key(|p| p.timestamp),
        ThreadSort::Latest => children.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
        ThreadSort::Top => children.sort_by(|a, b| {
            let score = |p: &Post| {
                p.interactions.comments + p.interactions.reposts + p.interactions.quotes
            };
            score(b)
                .cmp(&score(a))
                .then_with(|| b.timestamp.cmp(&a.timestamp))
        }),
    }
}
