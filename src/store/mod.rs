//! Optimistic state for a forest of posts and their replies.
//!
//! A [`PostStore`] keeps two copies of the forest. The confirmed view only
//! changes when a remote call settles successfully. The optimistic view is
//! what the UI renders: speculative mutations (likes, follows, deletes) land
//! there immediately and are replayed onto the confirmed view once the
//! remote agrees. A failed speculative mutation is logged and left standing
//! in the optimistic view until [`PostStore::resync`] is called.
//!
//! Drafts are not speculative, so their edits go to both views at once.
//!
//! Remote calls are spawned onto the tokio runtime as soon as they are
//! issued, so every mutating method must be called from within a runtime.
//! Their outcomes are applied when the owner drives the store with
//! [`PostStore::next_completion`] or [`PostStore::settle`], each one as a
//! single state transition. Dropping the store discards outcomes that have
//! not been applied yet. The calls themselves still run to completion.

mod draft;

pub use draft::Draft;

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{RemoteError, StoreError};
use crate::models::{
    AuthorSnapshot, ChildPage, DRAFT_ID_PREFIX, DraftPayload, NewPost, PostNode, SubmitPayload,
    UpdatePost,
};
use crate::remote::PostRemote;
use crate::tree::{
    Forest, collect_ids, contains_post, filter_out_post, find_post, mutate_post, mutate_where,
};
use crate::validation::validate_post;

pub const DELETE_FAILED_NOTICE: &str = "Failed to delete post!";

/// A dismissible, user-visible message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub message: String,
}

enum Completion {
    LikeToggled {
        post_id: String,
        result: Result<(), RemoteError>,
    },
    FollowToggled {
        author_id: String,
        result: Result<(), RemoteError>,
    },
    /// `parent_id: None` is a page of root posts.
    ChildrenLoaded {
        parent_id: Option<String>,
        result: Result<Vec<PostNode>, RemoteError>,
    },
    Deleted {
        post_id: String,
        parent_id: Option<String>,
        result: Result<(), RemoteError>,
    },
    ReplyCreated {
        draft_id: String,
        parent_id: String,
        result: Result<PostNode, RemoteError>,
    },
    EditSaved {
        post_id: String,
        result: Result<PostNode, RemoteError>,
    },
}

pub struct PostStore<R: PostRemote + ?Sized + 'static> {
    remote: Arc<R>,
    current_user: AuthorSnapshot,
    confirmed: Forest,
    optimistic: Forest,
    draft: Option<Draft>,
    submitting_draft: Option<String>,
    loading_children: HashSet<String>,
    loading_posts: bool,
    pending: FuturesUnordered<JoinHandle<Completion>>,
    notices: Vec<Notice>,
    version: u64,
    batch_depth: usize,
    dirty: bool,
}

impl<R: PostRemote + ?Sized + 'static> PostStore<R> {
    /// Builds a store for `current_user`, refusing to run without one.
    pub fn new(
        remote: Arc<R>,
        current_user: Option<AuthorSnapshot>,
        initial_posts: Vec<PostNode>,
    ) -> Result<Self, StoreError> {
        let current_user = current_user.ok_or(StoreError::Unauthenticated)?;

        let mut confirmed = Forest::new();
        append_unique(&mut confirmed, initial_posts, &mut HashSet::new());

        Ok(Self {
            remote,
            current_user,
            optimistic: confirmed.clone(),
            confirmed,
            draft: None,
            submitting_draft: None,
            loading_children: HashSet::new(),
            loading_posts: false,
            pending: FuturesUnordered::new(),
            notices: Vec::new(),
            version: 0,
            batch_depth: 0,
            dirty: false,
        })
    }

    /// The forest as the UI should render it.
    pub fn posts(&self) -> &[Arc<PostNode>] {
        &self.optimistic
    }

    /// The forest as last acknowledged by the remote.
    pub fn confirmed_posts(&self) -> &[Arc<PostNode>] {
        &self.confirmed
    }

    pub fn find(&self, post_id: &str) -> Option<&Arc<PostNode>> {
        find_post(post_id, &self.optimistic)
    }

    pub fn current_user(&self) -> &AuthorSnapshot {
        &self.current_user
    }

    pub fn draft(&self) -> Option<&Draft> {
        self.draft.as_ref()
    }

    /// Bumped once per observable change, or once per [`transition`](Self::transition).
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_loading_children(&self, post_id: &str) -> bool {
        self.loading_children.contains(post_id)
    }

    pub fn is_loading_posts(&self) -> bool {
        self.loading_posts
    }

    pub fn is_edit_post(&self, post_id: &str) -> bool {
        self.draft.as_ref().is_some_and(|draft| draft.is_edit(post_id))
    }

    pub fn is_reply_post(&self, post_id: &str) -> bool {
        self.draft.as_ref().is_some_and(|draft| draft.is_reply(post_id))
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Runs `f` as one batch: however many mutations it performs, observers
    /// see a single version bump.
    pub fn transition<F, T>(&mut self, f: F) -> T
    where
        F: FnOnce(&mut Self) -> T,
    {
        self.batch_depth += 1;
        let output = f(self);
        self.batch_depth -= 1;
        if self.batch_depth == 0 && self.dirty {
            self.dirty = false;
            self.version += 1;
        }
        output
    }

    /// Throws away unconfirmed mutations.
    pub fn resync(&mut self) {
        self.optimistic = self.confirmed.clone();
        self.commit();
    }

    pub fn toggle_like(&mut self, post_id: &str) {
        match self.find(post_id) {
            Some(post) if !post.is_draft() => {}
            _ => {
                tracing::debug!(post_id, "Ignoring like on unknown or draft post");
                return;
            }
        }

        let viewer_id = self.current_user.id.clone();
        self.optimistic = mutate_post(post_id, |post| post.toggle_like(&viewer_id), &self.optimistic);
        self.commit();

        let remote = Arc::clone(&self.remote);
        let post_id = post_id.to_string();
        self.dispatch(async move {
            let result = remote.toggle_like(&post_id).await;
            Completion::LikeToggled { post_id, result }
        });
    }

    /// Toggles the viewer's follow of the author of `post_id`, on every
    /// node that author wrote.
    pub fn toggle_follow(&mut self, post_id: &str) {
        let Some(author_id) = self.find(post_id).map(|post| post.author_id.clone()) else {
            tracing::debug!(post_id, "Ignoring follow on unknown post");
            return;
        };
        if author_id == self.current_user.id {
            tracing::debug!(post_id, "Ignoring follow of own post");
            return;
        }

        self.optimistic = toggle_follow_in(&self.optimistic, &author_id, &self.current_user.id);
        self.commit();

        let remote = Arc::clone(&self.remote);
        self.dispatch(async move {
            let result = remote.toggle_follow(&author_id).await;
            Completion::FollowToggled { author_id, result }
        });
    }

    /// Requests the next `page_size` replies of `post_id`.
    ///
    /// A node whose replies are already loading is left alone.
    pub fn load_more_children(&mut self, post_id: &str, page_size: usize) {
        let skip = match find_post(post_id, &self.confirmed) {
            Some(post) if !post.is_draft() => persisted_children(post),
            _ => {
                tracing::debug!(post_id, "Ignoring child load for unknown post");
                return;
            }
        };
        if !self.loading_children.insert(post_id.to_string()) {
            tracing::debug!(post_id, "Children already loading");
            return;
        }
        self.commit();

        let remote = Arc::clone(&self.remote);
        let parent_id = post_id.to_string();
        self.dispatch(async move {
            let page = ChildPage {
                parent_id: Some(parent_id.clone()),
                take: page_size,
                skip,
            };
            let result = remote.fetch_children(page).await;
            Completion::ChildrenLoaded {
                parent_id: Some(parent_id),
                result,
            }
        });
    }

    /// Requests the next page of root posts.
    pub fn load_more_posts(&mut self, page_size: usize) {
        if self.loading_posts {
            tracing::debug!("Posts already loading");
            return;
        }
        self.loading_posts = true;
        self.commit();

        let remote = Arc::clone(&self.remote);
        let skip = self.confirmed.len();
        self.dispatch(async move {
            let page = ChildPage {
                parent_id: None,
                take: page_size,
                skip,
            };
            let result = remote.fetch_children(page).await;
            Completion::ChildrenLoaded {
                parent_id: None,
                result,
            }
        });
    }

    pub fn delete_post(&mut self, post_id: &str) {
        let Some(post) = self.find(post_id).cloned() else {
            tracing::debug!(post_id, "Ignoring delete of unknown post");
            return;
        };

        if post.is_draft() || self.is_reply_post(post_id) {
            self.discard_draft();
            self.commit();
            return;
        }

        let draft_in_subtree = self
            .draft
            .as_ref()
            .is_some_and(|draft| contains_post(draft.post_id(), std::slice::from_ref(&post)));
        if draft_in_subtree {
            self.discard_draft();
        }

        self.optimistic = filter_out_post(post_id, &self.optimistic);
        self.commit();

        let remote = Arc::clone(&self.remote);
        let post_id = post_id.to_string();
        let parent_id = post.parent_id.clone();
        self.dispatch(async move {
            let result = remote.delete_post(&post_id).await;
            Completion::Deleted {
                post_id,
                parent_id,
                result,
            }
        });
    }

    /// Opens a reply under `post_id`, replacing any other draft.
    pub fn init_reply(&mut self, post_id: &str) {
        if let Some(Draft::Reply {
            post_id: draft_id,
            parent_id,
            ..
        }) = &self.draft
        {
            if draft_id == post_id || parent_id == post_id {
                return;
            }
        }

        if self.find(post_id).is_none() {
            tracing::debug!(post_id, "Ignoring reply to unknown post");
            return;
        }

        self.discard_draft();

        let parent_was_loaded = self
            .find(post_id)
            .is_some_and(|post| post.children.is_some());
        let draft_id = format!("{}{}", DRAFT_ID_PREFIX, Uuid::new_v4());
        let placeholder = Arc::new(PostNode::draft(
            draft_id.clone(),
            post_id,
            self.current_user.clone(),
        ));

        self.update_both(post_id, |post| {
            let mut children = vec![Arc::clone(&placeholder)];
            children.extend(post.children.take().unwrap_or_default());
            post.children = Some(children);
        });
        self.draft = Some(Draft::Reply {
            post_id: draft_id,
            parent_id: post_id.to_string(),
            parent_was_loaded,
        });
        self.commit();
    }

    pub fn set_reply_state(&mut self, post_id: &str, payload: DraftPayload) {
        if !self.is_reply_post(post_id) {
            return;
        }
        let text = payload.text.unwrap_or_default();
        self.update_both(post_id, |post| post.text = text.clone());
        self.commit();
    }

    /// Persists the reply draft `post_id`. The placeholder is swapped for
    /// the stored post once the remote answers.
    pub fn submit_reply(&mut self, post_id: &str, payload: SubmitPayload) {
        let Some(Draft::Reply { parent_id, .. }) = &self.draft else {
            return;
        };
        if !self.is_reply_post(post_id) || self.submitting_draft.as_deref() == Some(post_id) {
            return;
        }
        let parent_id = parent_id.clone();
        let Some(placeholder) = find_post(post_id, &self.confirmed) else {
            return;
        };

        let text = payload
            .text
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| placeholder.text.clone());
        let images = payload.images.unwrap_or_else(|| placeholder.images.clone());
        if let Err(error) = validate_post(&text, &images) {
            tracing::warn!(post_id, %error, "Refusing to submit invalid reply");
            return;
        }

        self.submitting_draft = Some(post_id.to_string());

        let remote = Arc::clone(&self.remote);
        let draft_id = post_id.to_string();
        self.dispatch(async move {
            let new_post = NewPost {
                text,
                images,
                parent_id: Some(parent_id.clone()),
            };
            let result = remote.create_post(new_post).await;
            Completion::ReplyCreated {
                draft_id,
                parent_id,
                result,
            }
        });
    }

    pub fn init_edit(&mut self, post_id: &str) {
        if self.is_edit_post(post_id) {
            return;
        }
        match self.find(post_id) {
            Some(post) if !post.is_draft() => {}
            _ => {
                tracing::debug!(post_id, "Ignoring edit of unknown or draft post");
                return;
            }
        }

        self.discard_draft();
        self.draft = Some(Draft::Edit {
            post_id: post_id.to_string(),
        });
        self.commit();
    }

    pub fn set_edit_state(&mut self, post_id: &str, payload: DraftPayload) {
        if !self.is_edit_post(post_id) {
            return;
        }
        if let Some(text) = payload.text {
            self.update_both(post_id, |post| post.text = text.clone());
            self.commit();
        }
    }

    /// Saves the edit draft `post_id`. Missing payload fields fall back to
    /// the node's current text and images.
    pub fn submit_edit(&mut self, post_id: &str, payload: SubmitPayload) {
        if !self.is_edit_post(post_id) {
            return;
        }
        let Some(post) = find_post(post_id, &self.confirmed) else {
            return;
        };

        let update = UpdatePost {
            post_id: post_id.to_string(),
            text: payload
                .text
                .filter(|text| !text.is_empty())
                .unwrap_or_else(|| post.text.clone()),
            images: payload.images.unwrap_or_else(|| post.images.clone()),
        };
        if let Err(error) = validate_post(&update.text, &update.images) {
            tracing::warn!(post_id, %error, "Refusing to submit invalid edit");
            return;
        }

        let remote = Arc::clone(&self.remote);
        let post_id = post_id.to_string();
        self.dispatch(async move {
            let result = remote.update_post(update).await;
            Completion::EditSaved { post_id, result }
        });
    }

    /// Drops whatever draft is active.
    pub fn cancel_edit(&mut self) {
        if self.draft.is_some() {
            self.discard_draft();
            self.commit();
        }
    }

    /// Waits for one in-flight remote call and applies its outcome.
    /// Returns `false` when nothing was in flight.
    pub async fn next_completion(&mut self) -> bool {
        match self.pending.next().await {
            Some(Ok(completion)) => {
                self.apply(completion);
                true
            }
            Some(Err(error)) => {
                tracing::error!(%error, "Remote call task failed");
                true
            }
            None => false,
        }
    }

    /// Drives every in-flight remote call to completion.
    pub async fn settle(&mut self) {
        while self.next_completion().await {}
    }

    /// Starts the call right away. Dropping the handle later only detaches it.
    fn dispatch<F>(&mut self, future: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        self.pending.push(tokio::spawn(future));
    }

    fn commit(&mut self) {
        if self.batch_depth > 0 {
            self.dirty = true;
        } else {
            self.version += 1;
        }
    }

    fn update_both<F>(&mut self, post_id: &str, mut mutation: F)
    where
        F: FnMut(&mut PostNode),
    {
        self.confirmed = mutate_post(post_id, &mut mutation, &self.confirmed);
        self.optimistic = mutate_post(post_id, &mut mutation, &self.optimistic);
    }

    fn discard_draft(&mut self) {
        let Some(Draft::Reply {
            post_id,
            parent_id,
            parent_was_loaded,
        }) = self.draft.take()
        else {
            return;
        };

        self.confirmed = filter_out_post(&post_id, &self.confirmed);
        self.optimistic = filter_out_post(&post_id, &self.optimistic);
        if !parent_was_loaded {
            self.update_both(&parent_id, |post| {
                if post.children.as_ref().is_some_and(Vec::is_empty) {
                    post.children = None;
                }
            });
        }
        if self.submitting_draft.as_deref() == Some(post_id.as_str()) {
            self.submitting_draft = None;
        }
    }

    fn apply(&mut self, completion: Completion) {
        match completion {
            Completion::LikeToggled { post_id, result } => match result {
                Ok(()) => {
                    let viewer_id = self.current_user.id.clone();
                    self.confirmed =
                        mutate_post(&post_id, |post| post.toggle_like(&viewer_id), &self.confirmed);
                }
                Err(error) => {
                    tracing::warn!(%post_id, %error, "Failed to toggle like");
                    return;
                }
            },
            Completion::FollowToggled { author_id, result } => match result {
                Ok(()) => {
                    self.confirmed =
                        toggle_follow_in(&self.confirmed, &author_id, &self.current_user.id);
                }
                Err(error) => {
                    tracing::warn!(%author_id, %error, "Failed to toggle follow");
                    return;
                }
            },
            Completion::ChildrenLoaded { parent_id, result } => {
                match &parent_id {
                    Some(parent_id) => {
                        self.loading_children.remove(parent_id);
                    }
                    None => self.loading_posts = false,
                }
                match result {
                    Ok(page) => self.append_page(parent_id.as_deref(), page),
                    Err(error) => {
                        tracing::error!(?parent_id, %error, "Failed to load more children");
                    }
                }
            }
            Completion::Deleted {
                post_id,
                parent_id,
                result,
            } => match result {
                Ok(()) => {
                    self.confirmed = filter_out_post(&post_id, &self.confirmed);
                    if let Some(parent_id) = parent_id {
                        self.update_both(&parent_id, |post| {
                            post.reply_count = (post.reply_count - 1).max(0);
                        });
                    }
                }
                Err(error) => {
                    tracing::error!(%post_id, %error, "Failed to delete post");
                    self.notices.push(Notice {
                        message: DELETE_FAILED_NOTICE.to_string(),
                    });
                }
            },
            Completion::ReplyCreated {
                draft_id,
                parent_id,
                result,
            } => {
                if self.submitting_draft.as_deref() == Some(draft_id.as_str()) {
                    self.submitting_draft = None;
                }
                match result {
                    Ok(reply) => self.place_reply(&draft_id, &parent_id, reply),
                    Err(error) => {
                        tracing::error!(%draft_id, %error, "Failed to submit reply");
                        return;
                    }
                }
            }
            Completion::EditSaved { post_id, result } => match result {
                Ok(saved) => {
                    self.update_both(&post_id, |post| {
                        post.text = saved.text.clone();
                        post.images = saved.images.clone();
                        post.updated_at = saved.updated_at;
                    });
                    if self.is_edit_post(&post_id) {
                        self.draft = None;
                    }
                }
                Err(error) => {
                    tracing::error!(%post_id, %error, "Failed to submit edit");
                    return;
                }
            },
        }
        self.commit();
    }

    fn append_page(&mut self, parent_id: Option<&str>, page: Vec<PostNode>) {
        let mut seen: HashSet<String> = collect_ids(&self.confirmed).into_iter().collect();
        seen.extend(collect_ids(&self.optimistic));

        let mut fresh = Forest::new();
        append_unique(&mut fresh, page, &mut seen);

        match parent_id {
            Some(parent_id) => {
                if let Some(Draft::Reply {
                    parent_id: draft_parent,
                    parent_was_loaded,
                    ..
                }) = self.draft.as_mut()
                {
                    if draft_parent == parent_id {
                        *parent_was_loaded = true;
                    }
                }
                self.update_both(parent_id, |post| {
                    post.children
                        .get_or_insert_with(Vec::new)
                        .extend(fresh.iter().cloned());
                });
            }
            None => {
                self.confirmed.extend(fresh.iter().cloned());
                self.optimistic.extend(fresh);
            }
        }
    }

    fn place_reply(&mut self, draft_id: &str, parent_id: &str, mut reply: PostNode) {
        reply.children.get_or_insert_with(Vec::new);
        let reply = Arc::new(reply);

        for view in [&mut self.confirmed, &mut self.optimistic] {
            let current = view.as_slice();
            let updated = if contains_post(&reply.id, current) {
                filter_out_post(draft_id, current)
            } else if contains_post(draft_id, current) {
                mutate_post(draft_id, |post| *post = PostNode::clone(&reply), current)
            } else {
                mutate_post(
                    parent_id,
                    |post| {
                        if let Some(children) = post.children.as_mut() {
                            children.insert(0, Arc::clone(&reply));
                        }
                    },
                    current,
                )
            };
            *view = updated;
        }
        self.update_both(parent_id, |post| post.reply_count += 1);

        if self.is_reply_post(draft_id) {
            self.draft = None;
        }
    }
}

/// Replies that exist on the server, i.e. the offset for the next page.
fn persisted_children(post: &PostNode) -> usize {
    post.children
        .as_ref()
        .map_or(0, |children| children.iter().filter(|child| !child.is_draft()).count())
}

fn toggle_follow_in(posts: &[Arc<PostNode>], author_id: &str, viewer_id: &str) -> Forest {
    mutate_where(
        |post| post.author_id == author_id,
        |post| post.author.toggle_follow(viewer_id),
        posts,
    )
}

fn append_unique(target: &mut Forest, page: Vec<PostNode>, seen: &mut HashSet<String>) {
    for post in page {
        if seen.insert(post.id.clone()) {
            target.push(Arc::new(post));
        } else {
            tracing::debug!(post_id = %post.id, "Skipping duplicate post");
        }
    }
}
