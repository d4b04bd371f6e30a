//! In-memory stand-in for the persistence side of the reply tree.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use reply_tree::error::RemoteError;
use reply_tree::models::{AuthorSnapshot, ChildPage, NewPost, PostNode, UpdatePost};
use reply_tree::remote::PostRemote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Fetch,
    Like,
    Follow,
    Delete,
    Update,
    Create,
}

#[derive(Default)]
struct State {
    posts: Vec<PostNode>,
    failing: HashSet<Op>,
    calls: HashMap<Op, usize>,
    last_page: Option<ChildPage>,
}

pub struct MemoryRemote {
    viewer: AuthorSnapshot,
    state: Mutex<State>,
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

pub fn author(id: &str) -> AuthorSnapshot {
    AuthorSnapshot {
        id: id.to_string(),
        name: Some(format!("{} name", id)),
        surname: None,
        username: id.to_string(),
        avatar: None,
        gender: None,
        followings: vec![],
        follow_requests_received: vec![],
    }
}

/// A stored post written `minutes_ago` minutes before [`base_time`].
pub fn post(id: &str, author_id: &str, parent_id: Option<&str>, minutes_ago: i64) -> PostNode {
    let created_at = base_time() - Duration::minutes(minutes_ago);
    PostNode {
        id: id.to_string(),
        text: format!("text of {}", id),
        images: vec![],
        author_id: author_id.to_string(),
        author: author(author_id),
        parent_id: parent_id.map(str::to_string),
        children: None,
        like_count: 0,
        reply_count: 0,
        likes: vec![],
        created_at,
        updated_at: created_at,
    }
}

impl MemoryRemote {
    pub fn new(viewer_id: &str) -> Self {
        Self {
            viewer: author(viewer_id),
            state: Mutex::new(State::default()),
        }
    }

    pub fn viewer(&self) -> AuthorSnapshot {
        self.viewer.clone()
    }

    pub fn insert(&self, post: PostNode) {
        self.state.lock().unwrap().posts.push(post);
    }

    pub fn fail(&self, op: Op) {
        self.state.lock().unwrap().failing.insert(op);
    }

    pub fn recover(&self, op: Op) {
        self.state.lock().unwrap().failing.remove(&op);
    }

    pub fn calls(&self, op: Op) -> usize {
        self.state.lock().unwrap().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn last_page(&self) -> Option<ChildPage> {
        self.state.lock().unwrap().last_page.clone()
    }

    pub fn get(&self, post_id: &str) -> Option<PostNode> {
        let state = self.state.lock().unwrap();
        state.posts.iter().find(|p| p.id == post_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().posts.len()
    }

    fn enter(&self, op: Op) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(op).or_default() += 1;
        if state.failing.contains(&op) {
            return Err(RemoteError::Other(format!("injected {:?} failure", op)));
        }
        Ok(())
    }

    fn snapshot(state: &State, post: &PostNode) -> PostNode {
        let mut node = post.clone();
        node.children = None;
        node.like_count = node.likes.len() as i64;
        node.reply_count = state
            .posts
            .iter()
            .filter(|p| p.parent_id.as_deref() == Some(post.id.as_str()))
            .count() as i64;
        node
    }
}

#[async_trait]
impl PostRemote for MemoryRemote {
    async fn fetch_children(&self, page: ChildPage) -> Result<Vec<PostNode>, RemoteError> {
        self.enter(Op::Fetch)?;
        let mut state = self.state.lock().unwrap();
        state.last_page = Some(page.clone());

        let mut matching: Vec<&PostNode> = state
            .posts
            .iter()
            .filter(|p| p.parent_id == page.parent_id)
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(matching
            .into_iter()
            .skip(page.skip)
            .take(page.take)
            .map(|p| Self::snapshot(&state, p))
            .collect())
    }

    async fn toggle_like(&self, post_id: &str) -> Result<(), RemoteError> {
        self.enter(Op::Like)?;
        let viewer_id = self.viewer.id.clone();
        let mut state = self.state.lock().unwrap();
        let post = state
            .posts
            .iter_mut()
            .find(|p| p.id == post_id)
            .ok_or_else(|| RemoteError::NotFound("Post".to_string()))?;
        post.toggle_like(&viewer_id);
        Ok(())
    }

    async fn toggle_follow(&self, user_id: &str) -> Result<(), RemoteError> {
        self.enter(Op::Follow)?;
        let viewer_id = self.viewer.id.clone();
        let mut state = self.state.lock().unwrap();
        for post in state.posts.iter_mut().filter(|p| p.author_id == user_id) {
            post.author.toggle_follow(&viewer_id);
        }
        Ok(())
    }

    async fn delete_post(&self, post_id: &str) -> Result<(), RemoteError> {
        self.enter(Op::Delete)?;
        let mut state = self.state.lock().unwrap();
        let mut doomed = vec![post_id.to_string()];
        let mut index = 0;
        while index < doomed.len() {
            let parent = doomed[index].clone();
            doomed.extend(
                state
                    .posts
                    .iter()
                    .filter(|p| p.parent_id.as_deref() == Some(parent.as_str()))
                    .map(|p| p.id.clone()),
            );
            index += 1;
        }
        state.posts.retain(|p| !doomed.contains(&p.id));
        Ok(())
    }

    async fn update_post(&self, update: UpdatePost) -> Result<PostNode, RemoteError> {
        self.enter(Op::Update)?;
        let mut state = self.state.lock().unwrap();
        let post = state
            .posts
            .iter_mut()
            .find(|p| p.id == update.post_id)
            .ok_or_else(|| RemoteError::NotFound("Post".to_string()))?;
        post.text = update.text;
        post.images = update.images;
        post.updated_at = base_time() + Duration::minutes(1);
        let post = post.clone();
        Ok(Self::snapshot(&state, &post))
    }

    async fn create_post(&self, new_post: NewPost) -> Result<PostNode, RemoteError> {
        self.enter(Op::Create)?;
        let mut state = self.state.lock().unwrap();
        let now = base_time() + Duration::minutes(1);
        let post = PostNode {
            id: Uuid::new_v4().to_string(),
            text: new_post.text,
            images: new_post.images,
            author_id: self.viewer.id.clone(),
            author: self.viewer.clone(),
            parent_id: new_post.parent_id,
            children: None,
            like_count: 0,
            reply_count: 0,
            likes: vec![],
            created_at: now,
            updated_at: now,
        };
        state.posts.push(post.clone());
        Ok(post)
    }
}
