//! Recursive walks over a forest of posts.
//!
//! Every update returns a new top-level `Forest`. Only the nodes on the
//! path from a root to a changed node are copied; every other subtree is
//! shared with the input through its `Arc`.

use std::sync::Arc;

use crate::models::PostNode;

pub type Forest = Vec<Arc<PostNode>>;

/// Depth-first, pre-order lookup. Stops at the first match.
pub fn find_post<'a>(post_id: &str, posts: &'a [Arc<PostNode>]) -> Option<&'a Arc<PostNode>> {
    for post in posts {
        if post.id == post_id {
            return Some(post);
        }
        if let Some(children) = &post.children {
            if let Some(found) = find_post(post_id, children) {
                return Some(found);
            }
        }
    }
    None
}

pub fn contains_post(post_id: &str, posts: &[Arc<PostNode>]) -> bool {
    find_post(post_id, posts).is_some()
}

/// Applies `mutation` to the node with `post_id`, wherever it sits.
pub fn mutate_post<F>(post_id: &str, mut mutation: F, posts: &[Arc<PostNode>]) -> Forest
where
    F: FnMut(&mut PostNode),
{
    let mut remaining = 1;
    rebuild_matching(posts, &|post: &PostNode| post.id == post_id, &mut mutation, &mut remaining)
        .unwrap_or_else(|| posts.to_vec())
}

/// Applies `mutation` to every node accepted by `matches`.
pub fn mutate_where<P, F>(matches: P, mut mutation: F, posts: &[Arc<PostNode>]) -> Forest
where
    P: Fn(&PostNode) -> bool,
    F: FnMut(&mut PostNode),
{
    let mut remaining = usize::MAX;
    rebuild_matching(posts, &matches, &mut mutation, &mut remaining)
        .unwrap_or_else(|| posts.to_vec())
}

/// Drops the node with `post_id` and, with it, its whole subtree.
///
/// Nodes whose children were never loaded keep `children: None`.
pub fn filter_out_post(post_id: &str, posts: &[Arc<PostNode>]) -> Forest {
    filter_out(post_id, posts).unwrap_or_else(|| posts.to_vec())
}

pub fn count_nodes(posts: &[Arc<PostNode>]) -> usize {
    posts
        .iter()
        .map(|post| 1 + post.children.as_deref().map_or(0, count_nodes))
        .sum()
}

/// Every id in pre-order.
pub fn collect_ids(posts: &[Arc<PostNode>]) -> Vec<String> {
    let mut ids = Vec::new();
    collect_into(posts, &mut ids);
    ids
}

fn collect_into(posts: &[Arc<PostNode>], ids: &mut Vec<String>) {
    for post in posts {
        ids.push(post.id.clone());
        if let Some(children) = &post.children {
            collect_into(children, ids);
        }
    }
}

fn rebuild_matching<P, F>(
    posts: &[Arc<PostNode>],
    matches: &P,
    mutation: &mut F,
    remaining: &mut usize,
) -> Option<Forest>
where
    P: Fn(&PostNode) -> bool,
    F: FnMut(&mut PostNode),
{
    let mut rebuilt: Option<Forest> = None;
    for (index, post) in posts.iter().enumerate() {
        if *remaining == 0 {
            break;
        }
        if let Some(node) = rebuild_node(post, matches, mutation, remaining) {
            rebuilt.get_or_insert_with(|| posts.to_vec())[index] = node;
        }
    }
    rebuilt
}

fn rebuild_node<P, F>(
    post: &Arc<PostNode>,
    matches: &P,
    mutation: &mut F,
    remaining: &mut usize,
) -> Option<Arc<PostNode>>
where
    P: Fn(&PostNode) -> bool,
    F: FnMut(&mut PostNode),
{
    let mut updated: Option<PostNode> = None;
    if matches(post) {
        let mut node = PostNode::clone(post);
        mutation(&mut node);
        *remaining -= 1;
        updated = Some(node);
    }

    if *remaining > 0 {
        let children = updated.as_ref().map_or(&post.children, |node| &node.children);
        let new_children = match children {
            Some(children) => rebuild_matching(children, matches, mutation, remaining),
            None => None,
        };
        if let Some(children) = new_children {
            updated.get_or_insert_with(|| PostNode::clone(post)).children = Some(children);
        }
    }

    updated.map(Arc::new)
}

fn filter_out(post_id: &str, posts: &[Arc<PostNode>]) -> Option<Forest> {
    if let Some(index) = posts.iter().position(|post| post.id == post_id) {
        let mut forest = posts.to_vec();
        forest.remove(index);
        return Some(forest);
    }

    for (index, post) in posts.iter().enumerate() {
        let Some(children) = &post.children else {
            continue;
        };
        if let Some(children) = filter_out(post_id, children) {
            let mut node = PostNode::clone(post);
            node.children = Some(children);
            let mut forest = posts.to_vec();
            forest[index] = Arc::new(node);
            return Some(forest);
        }
    }
    None
}
