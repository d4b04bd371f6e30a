use serde::{Deserialize, Serialize};

use super::posts::SqlRemote;
use super::users::load_author;
use crate::error::RemoteError;
use crate::models::AuthorSnapshot;

pub const USERS_PER_PAGE: usize = 10;
pub const MEDIA_PER_PAGE: usize = 24;

/// Who shows up in a search, from the viewer's point of view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SearchFilters {
    /// Case-insensitive substring. Empty matches everything.
    pub query: String,
    /// Keep users the viewer has blocked.
    pub include_blocked: bool,
    /// Keep users who follow the viewer.
    pub include_followers: bool,
    /// Keep users the viewer follows.
    pub include_followings: bool,
}

/// One page of results. `page` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchPage<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub total_pages: usize,
}

impl<T> SearchPage<T> {
    fn slice(all: Vec<T>, page: usize, per_page: usize) -> Self {
        let page = page.max(1);
        let total_pages = all.len().div_ceil(per_page);
        let items = all
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .collect();
        Self {
            items,
            page,
            total_pages,
        }
    }
}

// Binds, in order: viewer, include_blocked, viewer, include_followers,
// viewer, include_followings, viewer.
const AUDIENCE_FILTER: &str = r#"
    (? OR NOT EXISTS (SELECT 1 FROM blocks b WHERE b.blocker_id = ? AND b.blocked_id = u.id))
    AND (? OR NOT EXISTS (SELECT 1 FROM follows f WHERE f.follower_id = u.id AND f.following_id = ?))
    AND (? OR NOT EXISTS (SELECT 1 FROM follows f WHERE f.follower_id = ? AND f.following_id = u.id))
"#;

const NAME_MATCH: &str = r#"
    LOWER(u.username) LIKE ? ESCAPE '\'
    OR LOWER(COALESCE(u.name, '')) LIKE ? ESCAPE '\'
    OR LOWER(COALESCE(u.surname, '')) LIKE ? ESCAPE '\'
"#;

fn like_pattern(query: &str) -> String {
    let mut pattern = String::from("%");
    for c in query.trim().to_lowercase().chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

impl SqlRemote {
    /// Other users whose username, name or surname contains the query.
    pub async fn search_users(
        &self,
        page: usize,
        filters: &SearchFilters,
    ) -> Result<SearchPage<AuthorSnapshot>, RemoteError> {
        let viewer_id = self.viewer()?;
        let pattern = like_pattern(&filters.query);

        let sql = format!(
            "SELECT u.id FROM users u WHERE u.id != ? AND {} AND ({}) ORDER BY u.username ASC",
            AUDIENCE_FILTER, NAME_MATCH
        );
        let ids: Vec<String> = sqlx::query_scalar(&sql)
            .bind(viewer_id)
            .bind(filters.include_blocked)
            .bind(viewer_id)
            .bind(filters.include_followers)
            .bind(viewer_id)
            .bind(filters.include_followings)
            .bind(viewer_id)
            .bind(&pattern)
            .bind(&pattern)
            .bind(&pattern)
            .fetch_all(&self.pool)
            .await?;

        let ids = SearchPage::slice(ids, page, USERS_PER_PAGE);
        let mut users = Vec::with_capacity(ids.items.len());
        for id in &ids.items {
            if let Some(user) = load_author(&self.pool, id).await? {
                users.push(user);
            }
        }

        Ok(SearchPage {
            items: users,
            page: ids.page,
            total_pages: ids.total_pages,
        })
    }

    /// Image urls from matching posts, newest post first. The query is
    /// matched against the author's names and the post text.
    pub async fn search_media(
        &self,
        page: usize,
        filters: &SearchFilters,
    ) -> Result<SearchPage<String>, RemoteError> {
        let viewer_id = self.viewer()?;
        let pattern = like_pattern(&filters.query);

        let sql = format!(
            r#"SELECT p.images FROM posts p JOIN users u ON u.id = p.author_id
               WHERE p.images != '[]' AND {} AND ({} OR LOWER(p.text) LIKE ? ESCAPE '\')
               ORDER BY p.created_at DESC, p.rowid DESC"#,
            AUDIENCE_FILTER, NAME_MATCH
        );
        let rows: Vec<String> = sqlx::query_scalar(&sql)
            .bind(filters.include_blocked)
            .bind(viewer_id)
            .bind(filters.include_followers)
            .bind(viewer_id)
            .bind(filters.include_followings)
            .bind(viewer_id)
            .bind(&pattern)
            .bind(&pattern)
            .bind(&pattern)
            .bind(&pattern)
            .fetch_all(&self.pool)
            .await?;

        let mut media = Vec::new();
        for row in rows {
            let images: Vec<String> =
                serde_json::from_str(&row).map_err(|e| RemoteError::Other(e.to_string()))?;
            media.extend(images);
        }

        Ok(SearchPage::slice(media, page, MEDIA_PER_PAGE))
    }
}
