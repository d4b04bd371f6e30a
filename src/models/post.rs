use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::AuthorSnapshot;

/// Prefix of the client-generated ids given to reply placeholders.
pub const DRAFT_ID_PREFIX: &str = "temp-";

/// One post or reply in the forest.
///
/// `children` carries load state: `None` means the replies were never
/// fetched, `Some(vec![])` means they were fetched and there are none.
/// `like_count` and `reply_count` are server totals and do not track how
/// many likes or children are materialized locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostNode {
    pub id: String,
    pub text: String,
    pub images: Vec<String>,
    pub author_id: String,
    pub author: AuthorSnapshot,
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Arc<PostNode>>>,
    pub like_count: i64,
    pub reply_count: i64,
    pub likes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PostNode {
    /// Empty reply placeholder under `parent_id`, authored by the viewer.
    pub fn draft(id: String, parent_id: &str, author: AuthorSnapshot) -> Self {
        let now = Utc::now();
        Self {
            id,
            text: String::new(),
            images: Vec::new(),
            author_id: author.id.clone(),
            author,
            parent_id: Some(parent_id.to_string()),
            children: None,
            like_count: 0,
            reply_count: 0,
            likes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_draft(&self) -> bool {
        self.id.starts_with(DRAFT_ID_PREFIX)
    }

    pub fn is_liked_by(&self, user_id: &str) -> bool {
        self.likes.iter().any(|id| id == user_id)
    }

    /// Flips `user_id`'s like and moves the count with it.
    pub fn toggle_like(&mut self, user_id: &str) {
        if self.is_liked_by(user_id) {
            self.likes.retain(|id| id != user_id);
            self.like_count -= 1;
        } else {
            self.likes.push(user_id.to_string());
            self.like_count += 1;
        }
    }

    pub fn loaded_children(&self) -> usize {
        self.children.as_ref().map_or(0, Vec::len)
    }

    /// True while the server reports more replies than are materialized.
    pub fn has_more_children(&self) -> bool {
        let materialized = self
            .children
            .as_ref()
            .map_or(0, |children| children.iter().filter(|c| !c.is_draft()).count());
        (materialized as i64) < self.reply_count
    }
}

/// One page request against the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildPage {
    /// `None` asks for a page of root posts instead of replies.
    pub parent_id: Option<String>,
    pub take: usize,
    pub skip: usize,
}

/// Partial text update for a draft.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftPayload {
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitPayload {
    pub text: Option<String>,
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePost {
    pub post_id: String,
    pub text: String,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPost {
    pub text: String,
    pub images: Vec<String>,
    pub parent_id: Option<String>,
}
