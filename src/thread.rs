//! Comment threads: the nested reply tree handed out by the store, and the
//! two-level display view derived from it.
//!
//! Storage allows replies to any comment at any depth. Readers get the full
//! tree; the display view collapses everything under a top-level comment into
//! one flat, subtree-ordered list.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorSummary {
    pub id: i32,
    pub name: String,
    pub avatar_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorSummary {
    pub id: i32,
    pub nickname: String,
    pub avatar_url: Option<String>,
    pub site: Option<String>,
}

/// Identity of the comment a reply was written against.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentSummary {
    pub id: i32,
    pub author: Option<AuthorSummary>,
    pub visitor: Option<VisitorSummary>,
}

/// A single comment row together with the display data of its owner.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRecord {
    pub id: i32,
    pub content: String,
    pub post_id: i32,
    pub parent_id: Option<i32>,
    pub author_id: Option<i32>,
    pub visitor_id: Option<i32>,
    pub is_approved: bool,
    pub created_at: DateTime<Utc>,
    pub author: Option<AuthorSummary>,
    pub visitor: Option<VisitorSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentSummary>,
}

impl CommentRecord {
    pub fn summary(&self) -> ParentSummary {
        ParentSummary {
            id: self.id,
            author: self.author.clone(),
            visitor: self.visitor.clone(),
        }
    }

    fn sort_key(&self) -> (DateTime<Utc>, i32) {
        (self.created_at, self.id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: CommentRecord,
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    pub fn leaf(comment: CommentRecord) -> Self {
        Self {
            comment,
            replies: Vec::new(),
        }
    }
}

/// Deepest nesting level a reply is rendered at below its top-level comment.
/// Replies further down are hoisted to this level, right after the ancestor
/// they hang under, so pre-order (and thus [`flatten`]) is unchanged.
pub const MAX_NESTING: usize = 32;

/// Rebuilds the reply forest of one post from its flat comment rows.
///
/// Replies are grouped by parent once, then each top-level comment pulls its
/// children out of that map. Replies whose parent is not among `rows` (deleted,
/// unapproved, or on another post) are never attached and so never returned.
/// Children stay oldest first; top-level comments come back newest first.
pub fn build_forest(mut rows: Vec<CommentRecord>) -> Vec<CommentNode> {
    rows.sort_by_key(CommentRecord::sort_key);

    let mut top_level = Vec::new();
    let mut children: HashMap<i32, Vec<CommentRecord>> = HashMap::new();
    for row in rows {
        match row.parent_id {
            None => top_level.push(row),
            Some(parent_id) => children.entry(parent_id).or_default().push(row),
        }
    }

    let mut forest: Vec<CommentNode> = top_level
        .into_iter()
        .map(|top| build_thread(top, &mut children))
        .collect();
    forest.sort_by(|a, b| b.comment.sort_key().cmp(&a.comment.sort_key()));
    forest
}

/// Builds one thread without recursion: replies are popped off an explicit
/// stack in pre-order, and `open` holds the chain of nodes still receiving
/// children (`open[i]` sits at depth `i + 1`).
fn build_thread(top: CommentRecord, children: &mut HashMap<i32, Vec<CommentRecord>>) -> CommentNode {
    let mut pending: Vec<(CommentRecord, usize)> = Vec::new();
    push_children(&mut pending, children.remove(&top.id), 1);
    let mut root = CommentNode::leaf(top);
    let mut open: Vec<CommentNode> = Vec::new();

    while let Some((comment, depth)) = pending.pop() {
        push_children(&mut pending, children.remove(&comment.id), depth + 1);
        close_until(&mut root, &mut open, depth.min(MAX_NESTING) - 1);
        open.push(CommentNode::leaf(comment));
    }
    close_until(&mut root, &mut open, 0);
    root
}

fn push_children(pending: &mut Vec<(CommentRecord, usize)>, replies: Option<Vec<CommentRecord>>, depth: usize) {
    // reversed so the oldest reply is popped first
    if let Some(replies) = replies {
        pending.extend(replies.into_iter().rev().map(|r| (r, depth)));
    }
}

fn close_until(root: &mut CommentNode, open: &mut Vec<CommentNode>, len: usize) {
    while open.len() > len {
        let Some(node) = open.pop() else { break };
        match open.last_mut() {
            Some(parent) => parent.replies.push(node),
            None => root.replies.push(node),
        }
    }
}

/// Pre-order walk of a reply tree: each reply is followed by its whole
/// subtree before the next sibling.
pub fn flatten(replies: &[CommentNode]) -> Vec<&CommentNode> {
    let mut out = Vec::new();
    let mut stack = vec![replies.iter()];
    while let Some(level) = stack.last_mut() {
        match level.next() {
            Some(node) => {
                out.push(node);
                stack.push(node.replies.iter());
            }
            None => {
                stack.pop();
            }
        }
    }
    out
}

/// The comment a flattened reply is shown as "replying to".
///
/// The display has a single reply level, so the only displayed ancestor of
/// any reply under `thread` is the thread's top-level comment, whatever its
/// real parent is.
pub fn nearest_displayed_ancestor<'a>(_reply: &CommentNode, thread: &'a CommentNode) -> &'a CommentNode {
    thread
}

/// What a flattened reply quotes from its displayed ancestor.
#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyTarget<'a> {
    pub id: i32,
    pub content: &'a str,
    pub author: Option<&'a AuthorSummary>,
    pub visitor: Option<&'a VisitorSummary>,
}

impl<'a> From<&'a CommentRecord> for ReplyTarget<'a> {
    fn from(c: &'a CommentRecord) -> Self {
        Self {
            id: c.id,
            content: &c.content,
            author: c.author.as_ref(),
            visitor: c.visitor.as_ref(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyView<'a> {
    #[serde(flatten)]
    pub comment: &'a CommentRecord,
    pub reply_to: ReplyTarget<'a>,
}

#[derive(Debug, Serialize)]
pub struct ThreadView<'a> {
    #[serde(flatten)]
    pub comment: &'a CommentRecord,
    pub replies: Vec<ReplyView<'a>>,
}

/// Two-level view of a forest: each top-level comment with all of its
/// descendants flattened beneath it.
pub fn display_threads(forest: &[CommentNode]) -> Vec<ThreadView<'_>> {
    forest
        .iter()
        .map(|thread| ThreadView {
            comment: &thread.comment,
            replies: flatten(&thread.replies)
                .into_iter()
                .map(|reply| ReplyView {
                    comment: &reply.comment,
                    reply_to: ReplyTarget::from(&nearest_displayed_ancestor(reply, thread).comment),
                })
                .collect(),
        })
        .collect()
}
