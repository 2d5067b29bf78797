//! Thread assembly through the public surface: chains, quotes, reposts,
//! and child ordering.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use gitmsg_social::ThreadSort;
use gitmsg_social::cache::PostCache;
use gitmsg_social::models::{CommitRecord, PostType};
use gitmsg_social::test_support::{InMemoryGit, InMemoryLists, InMemoryMirrors};

const WORKDIR: &str = "/work/project";

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, d, 12, 0, 0).unwrap()
}

fn commit(hash: &str, message: &str, d: u32) -> CommitRecord {
    CommitRecord {
        hash: hash.to_string(),
        author: "Ada".to_string(),
        email: "ada@example.com".to_string(),
        timestamp: day(d),
        message: message.to_string(),
        refname: Some("refs/heads/main".to_string()),
    }
}

fn social_message(text: &str, post_type: &str, original: Option<&str>, reply_to: Option<&str>) -> String {
    let mut fields = format!("ext=\"social\"; type=\"{post_type}\"");
    if let Some(original) = original {
        fields.push_str(&format!("; original=\"{original}\""));
    }
    if let Some(reply_to) = reply_to {
        fields.push_str(&format!("; reply-to=\"{reply_to}\""));
    }
    format!("{text}\n\n--- GitMsg: {fields}; v=\"1.0\"; ext-v=\"1.0\" ---\n")
}

fn cache_of(commits: Vec<CommitRecord>) -> PostCache {
    let mut git = InMemoryGit::new();
    git.commits = commits;
    let mut cache = PostCache::new(
        Arc::new(git),
        Arc::new(InMemoryMirrors::new()),
        Arc::new(InMemoryLists::new(vec![])),
    );
    cache
        .initialize(Path::new(WORKDIR), None, Some(day(1)))
        .unwrap();
    cache
}

#[test]
fn deep_comment_chain_builds_ordered_parents() {
    let mut cache = cache_of(vec![
        commit("aaa111bbb222333", "root post", 1),
        commit(
            "bbb222ccc333444",
            &social_message("level one", "comment", Some("#commit:aaa111bbb222"), None),
            2,
        ),
        commit(
            "ccc333ddd444555",
            &social_message(
                "level two",
                "comment",
                Some("#commit:aaa111bbb222"),
                Some("#commit:bbb222ccc333"),
            ),
            3,
        ),
        commit(
            "ddd444eee555666",
            &social_message(
                "level three",
                "comment",
                Some("#commit:aaa111bbb222"),
                Some("#commit:ccc333ddd444"),
            ),
            4,
        ),
    ]);

    let view = cache.thread("#commit:ddd444eee555666", ThreadSort::Oldest).unwrap();
    let parent_ids: Vec<&str> = view.parents.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(
        parent_ids,
        vec![
            "#commit:aaa111bbb222",
            "#commit:bbb222ccc333",
            "#commit:ccc333ddd444"
        ]
    );
    assert_eq!(view.thread_root_id, "#commit:aaa111bbb222");
    assert!(view.children.is_empty());
}

#[test]
fn quote_anchor_suppresses_extra_original() {
    let mut cache = cache_of(vec![
        commit("aaa111bbb222333", "root post", 1),
        commit(
            "bbb222ccc333444",
            &social_message("look at this", "quote", Some("#commit:aaa111bbb222"), None),
            2,
        ),
    ]);

    let view = cache.thread("#commit:bbb222ccc333", ThreadSort::Oldest).unwrap();
    assert_eq!(view.anchor.post_type, PostType::Quote);
    // The quote's content already carries what it quotes; nothing is
    // displayed above it.
    assert!(view.parents.is_empty());
    assert_eq!(view.thread_root_id, "#commit:aaa111bbb222");
}

#[test]
fn quotes_appear_as_children_but_reposts_do_not() {
    let mut cache = cache_of(vec![
        commit("aaa111bbb222333", "root post", 1),
        commit(
            "bbb222ccc333444",
            &social_message("", "repost", Some("#commit:aaa111bbb222"), None),
            2,
        ),
        commit(
            "ccc333ddd444555",
            &social_message("quoting you", "quote", Some("#commit:aaa111bbb222"), None),
            3,
        ),
    ]);

    let view = cache.thread("#commit:aaa111bbb222", ThreadSort::Oldest).unwrap();
    let child_types: Vec<PostType> = view.children.iter().map(|c| c.post_type).collect();
    assert_eq!(child_types, vec![PostType::Quote]);

    // Both still count toward the repost total.
    assert_eq!(view.anchor.display.total_reposts, 2);
}

#[test]
fn children_order_follows_requested_sort() {
    let mut cache = cache_of(vec![
        commit("aaa111bbb222333", "root post", 1),
        commit(
            "bbb222ccc333444",
            &social_message("early reply", "comment", Some("#commit:aaa111bbb222"), None),
            2,
        ),
        commit(
            "ccc333ddd444555",
            &social_message("busy reply", "comment", Some("#commit:aaa111bbb222"), None),
            3,
        ),
        // A nested reply makes the busy one the most interacted-with.
        commit(
            "ddd444eee555666",
            &social_message(
                "nested",
                "comment",
                Some("#commit:ccc333ddd444"),
                Some("#commit:ccc333ddd444"),
            ),
            4,
        ),
        commit(
            "eee555fff666777",
            &social_message("late reply", "comment", Some("#commit:aaa111bbb222"), None),
            5,
        ),
    ]);

    let oldest = cache.thread("#commit:aaa111bbb222", ThreadSort::Oldest).unwrap();
    assert_eq!(oldest.children.first().unwrap().id, "#commit:bbb222ccc333");

    let latest = cache.thread("#commit:aaa111bbb222", ThreadSort::Latest).unwrap();
    assert_eq!(latest.children.first().unwrap().id, "#commit:eee555fff666");

    let top = cache.thread("#commit:aaa111bbb222", ThreadSort::Top).unwrap();
    assert_eq!(top.children.first().unwrap().id, "#commit:ccc333ddd444");
}

#[test]
fn cross_repository_ids_match_by_hash() {
    // A comment stored with an absolute original still threads under
    // the relative workspace post.
    let mut cache = cache_of(vec![
        commit("aaa111bbb222333", "root post", 1),
        commit(
            "bbb222ccc333444",
            &social_message(
                "reply via absolute ref",
                "comment",
                Some("https://github.com/ada/project#commit:aaa111bbb222"),
                None,
            ),
            2,
        ),
    ]);

    let view = cache.thread("#commit:aaa111bbb222", ThreadSort::Oldest).unwrap();
    assert_eq!(view.children.len(), 1);
    assert_eq!(view.children[0].id, "#commit:bbb222ccc333");
}
