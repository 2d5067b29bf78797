//! Interaction counting.
//!
//! Counters are recomputed from scratch over the whole post set, never
//! incrementally patched: cross-repository duplicates and merged
//! virtuals make incremental updates unreliable, while a full recount
//! with canonical-pair deduplication cannot double-count.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::cache::index::PostIndex;
use crate::models::{Interactions, Post, PostType};
use crate::protocol::reference::{self, RefType};

/// Reset and recount every interaction counter in the set.
///
/// One source post contributes at most one interaction to a given
/// target, no matter under how many identities the pair appears.
pub fn recount(posts: &mut IndexMap<String, Post>, origin_url: Option<&str>, index: &PostIndex) {
    for post in posts.values_mut() {
        post.interactions = Interactions::default();
        post.display.total_reposts = 0;
    }

    let sources: Vec<(String, PostType, String)> = posts
        .values()
        .filter(|p| p.post_type.is_interaction())
        .filter_map(|p| {
            p.original_post_id
                .clone()
                .map(|original| (p.id.clone(), p.post_type, original))
        })
        .collect();

    let mut counted: HashSet<(String, String)> = HashSet::new();

    for (source_id, post_type, original) in sources {
        let canonical_source = resolve_to_canonical(&source_id, origin_url, index);
        let canonical_target = resolve_to_canonical(&original, origin_url, index);
        if !counted.insert((canonical_source, canonical_target)) {
            continue;
        }

        let Some(target_id) = locate_target(posts, &original, origin_url, index) else {
            log::trace!("interaction target {original} not cached");
            continue;
        };

        if let Some(target) = posts.get_mut(&target_id) {
            match post_type {
                PostType::Comment => target.interactions.comments += 1,
                PostType::Repost => target.interactions.reposts += 1,
                PostType::Quote => target.interactions.quotes += 1,
                PostType::Post => {}
            }
            target.sync_total_reposts();
        }
    }
}

/// Canonical identity of a post id: the relative form whenever the id
/// resolves into the workspace, the id itself otherwise.
pub fn resolve_to_canonical(id: &str, origin_url: Option<&str>, index: &PostIndex) -> String {
    if let Some(relative) = index.resolve_absolute(id) {
        return relative.to_string();
    }
    if reference::is_my_repository(id) {
        return id.to_string();
    }
    if let Some(origin) = origin_url {
        let parsed = reference::parse(id);
        if parsed.ref_type == RefType::Commit && parsed.repository.as_deref() == Some(origin) {
            if let Ok(relative) = reference::create(RefType::Commit, &parsed.value, None) {
                return relative;
            }
        }
    }
    id.to_string()
}

/// Find the cached post a target reference points at: direct lookup,
/// then the absolute table, then the origin-stripped relative form.
fn locate_target(
    posts: &IndexMap<String, Post>,
    target: &str,
    origin_url: Option<&str>,
    index: &PostIndex,
) -> Option<String> {
    if posts.contains_key(target) {
        return Some(target.to_string());
    }

    if let Some(relative) = index.resolve_absolute(target) {
        if posts.contains_key(relative) {
            return Some(relative.to_string());
        }
    }

    if let Some(origin) = origin_url {
        let parsed = reference::parse(target);
        if parsed.ref_type == RefType::Commit && parsed.repository.as_deref() == Some(origin) {
            let relative = reference::create(RefType::Commit, &parsed.value, None).ok()?;
            if posts.contains_key(&relative) {
                return Some(relative);
            }
        }
    }

    None
}
