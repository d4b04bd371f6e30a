use chrono::Utc;

use super::posts::SqlRemote;
use crate::error::RemoteError;

impl SqlRemote {
    /// Blocks `user_id`, or lifts an existing block.
    pub async fn toggle_block(&self, user_id: &str) -> Result<(), RemoteError> {
        let viewer_id = self.viewer()?;
        if viewer_id == user_id {
            return Err(RemoteError::Forbidden("Cannot block yourself".to_string()));
        }

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM blocks WHERE blocker_id = ? AND blocked_id = ?")
                .bind(viewer_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        if let Some(block_id) = existing {
            sqlx::query("DELETE FROM blocks WHERE id = ?")
                .bind(block_id)
                .execute(&self.pool)
                .await?;
        } else {
            sqlx::query("INSERT INTO blocks (blocker_id, blocked_id, created_at) VALUES (?, ?, ?)")
                .bind(viewer_id)
                .bind(user_id)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    pub async fn is_blocked(&self, user_id: &str) -> Result<bool, RemoteError> {
        let viewer_id = self.viewer()?;
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM blocks WHERE blocker_id = ? AND blocked_id = ?")
                .bind(viewer_id)
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    /// Turns the pending request from `sender_id` into a follow of the viewer.
    /// Does nothing when there is no such request.
    pub async fn accept_follow_request(&self, sender_id: &str) -> Result<(), RemoteError> {
        let viewer_id = self.viewer()?;

        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(
            "DELETE FROM follow_requests WHERE sender_id = ? AND receiver_id = ?",
        )
        .bind(sender_id)
        .bind(viewer_id)
        .execute(&mut *tx)
        .await?;

        if deleted.rows_affected() > 0 {
            sqlx::query(
                r#"INSERT OR IGNORE INTO follows (follower_id, following_id, created_at)
                   VALUES (?, ?, ?)"#,
            )
            .bind(sender_id)
            .bind(viewer_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn decline_follow_request(&self, sender_id: &str) -> Result<(), RemoteError> {
        let viewer_id = self.viewer()?;

        sqlx::query("DELETE FROM follow_requests WHERE sender_id = ? AND receiver_id = ?")
            .bind(sender_id)
            .bind(viewer_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Ids of users waiting for the viewer to answer their follow request,
    /// oldest first.
    pub async fn received_follow_requests(&self) -> Result<Vec<String>, RemoteError> {
        let viewer_id = self.viewer()?;

        let senders: Vec<String> = sqlx::query_scalar(
            "SELECT sender_id FROM follow_requests WHERE receiver_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(viewer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(senders)
    }
}
