//! The networked operations a [`PostStore`](crate::store::PostStore) relies on.

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::models::{ChildPage, NewPost, PostNode, UpdatePost};

/// Persistence side of the reply tree, always acting as one viewer.
#[async_trait]
pub trait PostRemote: Send + Sync {
    /// Page of posts, newest first. Returned nodes have `children: None`.
    async fn fetch_children(&self, page: ChildPage) -> Result<Vec<PostNode>, RemoteError>;

    async fn toggle_like(&self, post_id: &str) -> Result<(), RemoteError>;

    /// Follow, unfollow or cancel a pending request, depending on the
    /// viewer's current relationship with `user_id`.
    async fn toggle_follow(&self, user_id: &str) -> Result<(), RemoteError>;

    async fn delete_post(&self, post_id: &str) -> Result<(), RemoteError>;

    async fn update_post(&self, update: UpdatePost) -> Result<PostNode, RemoteError>;

    async fn create_post(&self, post: NewPost) -> Result<PostNode, RemoteError>;
}
