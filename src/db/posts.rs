use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use super::users::load_author;
use crate::error::RemoteError;
use crate::models::{ChildPage, NewPost, PostNode, UpdatePost};
use crate::remote::PostRemote;
use crate::validation::validate_post;

#[derive(Debug, FromRow)]
struct PostRow {
    id: String,
    text: String,
    images: String,
    author_id: String,
    parent_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// [`PostRemote`] over the SQLite schema, acting as one viewer.
#[derive(Debug, Clone)]
pub struct SqlRemote {
    pub(super) pool: SqlitePool,
    viewer_id: Option<String>,
}

impl SqlRemote {
    pub fn new(pool: SqlitePool, viewer_id: impl Into<String>) -> Self {
        Self {
            pool,
            viewer_id: Some(viewer_id.into()),
        }
    }

    /// A remote with nobody signed in. Every call fails with
    /// [`RemoteError::Unauthenticated`].
    pub fn anonymous(pool: SqlitePool) -> Self {
        Self {
            pool,
            viewer_id: None,
        }
    }

    pub(super) fn viewer(&self) -> Result<&str, RemoteError> {
        self.viewer_id.as_deref().ok_or(RemoteError::Unauthenticated)
    }

    async fn load_node(&self, row: PostRow) -> Result<PostNode, RemoteError> {
        let author = load_author(&self.pool, &row.author_id)
            .await?
            .ok_or_else(|| RemoteError::NotFound("Author".to_string()))?;

        let likes: Vec<String> = sqlx::query_scalar("SELECT user_id FROM likes WHERE post_id = ?")
            .bind(&row.id)
            .fetch_all(&self.pool)
            .await?;

        let (reply_count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM posts WHERE parent_id = ?")
                .bind(&row.id)
                .fetch_one(&self.pool)
                .await?;

        let images: Vec<String> = serde_json::from_str(&row.images).map_err(|e| {
            tracing::error!(post_id = %row.id, error = %e, "Unreadable image list");
            RemoteError::Other(e.to_string())
        })?;

        Ok(PostNode {
            id: row.id,
            text: row.text,
            images,
            author_id: row.author_id,
            author,
            parent_id: row.parent_id,
            children: None,
            like_count: likes.len() as i64,
            reply_count,
            likes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    async fn find_row(&self, post_id: &str) -> Result<Option<PostRow>, sqlx::Error> {
        sqlx::query_as::<_, PostRow>("SELECT * FROM posts WHERE id = ?")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Inserts a post with an explicit timestamp.
    pub async fn insert_post_at(
        &self,
        post: NewPost,
        created_at: DateTime<Utc>,
    ) -> Result<PostNode, RemoteError> {
        let viewer_id = self.viewer()?;
        let text = post.text.trim();
        validate_post(text, &post.images)?;

        if let Some(parent_id) = &post.parent_id {
            if self.find_row(parent_id).await?.is_none() {
                return Err(RemoteError::NotFound("Parent post".to_string()));
            }
        }

        let post_id = Uuid::new_v4().to_string();
        let images = serde_json::to_string(&post.images)
            .map_err(|e| RemoteError::Other(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO posts (id, text, images, author_id, parent_id, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&post_id)
        .bind(text)
        .bind(&images)
        .bind(viewer_id)
        .bind(&post.parent_id)
        .bind(created_at)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        let row = self
            .find_row(&post_id)
            .await?
            .ok_or_else(|| RemoteError::NotFound("Post".to_string()))?;
        self.load_node(row).await
    }
}

#[async_trait]
impl PostRemote for SqlRemote {
    async fn fetch_children(&self, page: ChildPage) -> Result<Vec<PostNode>, RemoteError> {
        self.viewer()?;

        let rows = match &page.parent_id {
            Some(parent_id) => {
                sqlx::query_as::<_, PostRow>(
                    "SELECT * FROM posts WHERE parent_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
                )
                .bind(parent_id)
                .bind(page.take as i64)
                .bind(page.skip as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, PostRow>(
                    "SELECT * FROM posts WHERE parent_id IS NULL ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
                )
                .bind(page.take as i64)
                .bind(page.skip as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut nodes = Vec::with_capacity(rows.len());
        for row in rows {
            nodes.push(self.load_node(row).await?);
        }
        Ok(nodes)
    }

    async fn toggle_like(&self, post_id: &str) -> Result<(), RemoteError> {
        let viewer_id = self.viewer()?;

        if self.find_row(post_id).await?.is_none() {
            return Err(RemoteError::NotFound("Post".to_string()));
        }

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM likes WHERE post_id = ? AND user_id = ?")
                .bind(post_id)
                .bind(viewer_id)
                .fetch_optional(&self.pool)
                .await?;

        if let Some(like_id) = existing {
            sqlx::query("DELETE FROM likes WHERE id = ?")
                .bind(like_id)
                .execute(&self.pool)
                .await?;
        } else {
            sqlx::query("INSERT INTO likes (post_id, user_id, created_at) VALUES (?, ?, ?)")
                .bind(post_id)
                .bind(viewer_id)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    async fn toggle_follow(&self, user_id: &str) -> Result<(), RemoteError> {
        let viewer_id = self.viewer()?;
        if viewer_id == user_id {
            return Err(RemoteError::Forbidden("Cannot follow yourself".to_string()));
        }

        let existing_follow: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM follows WHERE follower_id = ? AND following_id = ?",
        )
        .bind(viewer_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(follow_id) = existing_follow {
            sqlx::query("DELETE FROM follows WHERE id = ?")
                .bind(follow_id)
                .execute(&self.pool)
                .await?;
            return Ok(());
        }

        let existing_request: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM follow_requests WHERE sender_id = ? AND receiver_id = ?",
        )
        .bind(viewer_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(request_id) = existing_request {
            sqlx::query("DELETE FROM follow_requests WHERE id = ?")
                .bind(request_id)
                .execute(&self.pool)
                .await?;
        } else {
            sqlx::query(
                "INSERT INTO follow_requests (sender_id, receiver_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(viewer_id)
            .bind(user_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn delete_post(&self, post_id: &str) -> Result<(), RemoteError> {
        let viewer_id = self.viewer()?;

        let post = self
            .find_row(post_id)
            .await?
            .ok_or_else(|| RemoteError::NotFound("Post".to_string()))?;

        if post.author_id != viewer_id {
            return Err(RemoteError::Forbidden(
                "Not authorized to delete this post".to_string(),
            ));
        }

        // Replies go with it through ON DELETE CASCADE.
        sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(post_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_post(&self, update: UpdatePost) -> Result<PostNode, RemoteError> {
        let viewer_id = self.viewer()?;
        let text = update.text.trim();
        validate_post(text, &update.images)?;

        let post = self
            .find_row(&update.post_id)
            .await?
            .ok_or_else(|| RemoteError::NotFound("Post".to_string()))?;

        if post.author_id != viewer_id {
            return Err(RemoteError::Forbidden(
                "Not authorized to edit this post".to_string(),
            ));
        }

        let images = serde_json::to_string(&update.images)
            .map_err(|e| RemoteError::Other(e.to_string()))?;

        sqlx::query("UPDATE posts SET text = ?, images = ?, updated_at = ? WHERE id = ?")
            .bind(text)
            .bind(&images)
            .bind(Utc::now())
            .bind(&update.post_id)
            .execute(&self.pool)
            .await?;

        let row = self
            .find_row(&update.post_id)
            .await?
            .ok_or_else(|| RemoteError::NotFound("Post".to_string()))?;
        self.load_node(row).await
    }

    async fn create_post(&self, post: NewPost) -> Result<PostNode, RemoteError> {
        self.insert_post_at(post, Utc::now()).await
    }
}
