// Reply threading rebuilt from dot-structured comment ids

use serde::Serialize;
use std::collections::HashMap;

use super::models::Comment;

/// A comment plus its replies, in the order they were first seen.
///
/// Borrows the comment: threading is an overlay on the flat list, the
/// comments themselves are never touched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadNode<'a> {
    #[serde(flatten)]
    pub comment: &'a Comment,
    #[serde(rename = "thread_replies", skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ThreadNode<'a>>,
}

impl ThreadNode<'_> {
    /// Number of comments in this subtree, the node included
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(ThreadNode::len).sum::<usize>()
    }
}

pub struct ThreadBuilder;

impl ThreadBuilder {
    /// Root threads in stream order.
    ///
    /// A reply whose parent id is not in `comments` is dropped. When an id
    /// occurs twice only the first record counts.
    pub fn build(comments: &[Comment]) -> Vec<ThreadNode<'_>> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(comments.len());
        for (pos, comment) in comments.iter().enumerate() {
            index.entry(comment.id.as_str()).or_insert(pos);
        }

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); comments.len()];
        let mut roots = Vec::new();
        let mut orphans = 0usize;

        for (pos, comment) in comments.iter().enumerate() {
            if index.get(comment.id.as_str()) != Some(&pos) {
                continue;
            }

            if !comment.is_reply {
                roots.push(pos);
                continue;
            }

            match comment.parent_id().and_then(|parent| index.get(parent)) {
                Some(&parent) => children[parent].push(pos),
                None => orphans += 1,
            }
        }

        if orphans > 0 {
            tracing::debug!("[Threads] Dropped {} repl(ies) without a retrieved parent", orphans);
        }

        roots
            .into_iter()
            .map(|pos| Self::materialize(comments, &children, pos))
            .collect()
    }

    // Recursion depth is bounded by the number of dot-segments in an id.
    fn materialize<'a>(comments: &'a [Comment], children: &[Vec<usize>], pos: usize) -> ThreadNode<'a> {
        ThreadNode {
            comment: &comments[pos],
            children: children[pos]
                .iter()
                .map(|&child| Self::materialize(comments, children, child))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::testing::comment;

    fn ids(nodes: &[ThreadNode<'_>]) -> Vec<String> {
        nodes.iter().map(|n| n.comment.id.clone()).collect()
    }

    #[test]
    fn test_roots_and_children() {
        let comments = vec![
            comment("p", "U", false),
            comment("p.1", "U", true),
            comment("q", "V", false),
        ];

        let roots = ThreadBuilder::build(&comments);
        assert_eq!(ids(&roots), vec!["p", "q"]);
        assert_eq!(ids(&roots[0].children), vec!["p.1"]);
        assert!(roots[1].children.is_empty());
    }

    #[test]
    fn test_replies_keep_arrival_order() {
        let comments = vec![
            comment("a", "U", false),
            comment("b", "U", false),
            comment("a.2", "U", true),
            comment("b.1", "U", true),
            comment("a.1", "U", true),
        ];

        let roots = ThreadBuilder::build(&comments);
        assert_eq!(ids(&roots[0].children), vec!["a.2", "a.1"]);
        assert_eq!(ids(&roots[1].children), vec!["b.1"]);
    }

    #[test]
    fn test_orphan_reply_is_dropped() {
        let comments = vec![comment("a", "U", false), comment("missing.1", "U", true)];

        let roots = ThreadBuilder::build(&comments);
        assert_eq!(ids(&roots), vec!["a"]);
        assert_eq!(roots.iter().map(ThreadNode::len).sum::<usize>(), 1);
    }

    #[test]
    fn test_reply_before_parent_still_attaches() {
        let comments = vec![comment("a.1", "U", true), comment("a", "U", false)];

        let roots = ThreadBuilder::build(&comments);
        assert_eq!(ids(&roots), vec!["a"]);
        assert_eq!(ids(&roots[0].children), vec!["a.1"]);
    }

    #[test]
    fn test_deeper_nesting() {
        let comments = vec![
            comment("a", "U", false),
            comment("a.1", "U", true),
            comment("a.1.x", "U", true),
        ];

        let roots = ThreadBuilder::build(&comments);
        assert_eq!(roots[0].len(), 3);
        assert_eq!(ids(&roots[0].children[0].children), vec!["a.1.x"]);
    }

    #[test]
    fn test_every_reply_with_parent_appears_once() {
        let comments = vec![
            comment("a", "U", false),
            comment("a.1", "U", true),
            comment("b", "U", false),
            comment("a.1", "U", true),
            comment("c.9", "U", true),
            comment("b.1", "U", true),
        ];

        let roots = ThreadBuilder::build(&comments);
        assert!(roots.iter().all(|r| !r.comment.is_reply));
        let total: usize = roots.iter().map(ThreadNode::len).sum();
        // a, a.1, b, b.1 (duplicate a.1 and orphan c.9 excluded)
        assert_eq!(total, 4);
    }

    #[test]
    fn test_serializes_thread_replies() {
        let comments = vec![comment("a", "U", false), comment("a.1", "V", true)];
        let roots = ThreadBuilder::build(&comments);

        let json = serde_json::to_value(&roots).unwrap();
        assert_eq!(json[0]["cid"], "a");
        assert_eq!(json[0]["thread_replies"][0]["cid"], "a.1");
        assert!(json[0]["thread_replies"][0].get("thread_replies").is_none());
    }
}
