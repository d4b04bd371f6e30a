use chrono::Utc;
use serde::Deserialize;
use sqlx::{FromRow, SqlitePool};

use super::posts::SqlRemote;
use crate::error::RemoteError;
use crate::models::{AuthorSnapshot, Gender};
use crate::validation::require;

#[derive(Debug, FromRow)]
struct UserRow {
    id: String,
    username: String,
    name: Option<String>,
    surname: Option<String>,
    avatar: Option<String>,
    gender: Option<String>,
}

/// A user as pushed by the identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub id: String,
    pub username: String,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub avatar: Option<String>,
    pub gender: Option<Gender>,
}

/// Profile fields the viewer may change about themselves.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileUpdate {
    pub username: String,
    pub name: String,
    pub surname: String,
    pub avatar: Option<String>,
    pub gender: Option<Gender>,
}

pub async fn upsert_user(pool: &SqlitePool, user: &NewUser) -> Result<(), sqlx::Error> {
    let now = Utc::now();
    sqlx::query(
        r#"INSERT INTO users (id, username, name, surname, avatar, gender, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT(id) DO UPDATE SET
               username = excluded.username,
               name = excluded.name,
               surname = excluded.surname,
               avatar = excluded.avatar,
               gender = excluded.gender,
               updated_at = ?"#,
    )
    .bind(&user.id)
    .bind(&user.username)
    .bind(&user.name)
    .bind(&user.surname)
    .bind(&user.avatar)
    .bind(user.gender.map(Gender::as_str))
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Author snapshot for `user_id`, relationship lists included.
pub async fn load_author(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<Option<AuthorSnapshot>, sqlx::Error> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, username, name, surname, avatar, gender FROM users WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let followings: Vec<String> =
        sqlx::query_scalar("SELECT follower_id FROM follows WHERE following_id = ?")
            .bind(&row.id)
            .fetch_all(pool)
            .await?;

    let follow_requests_received: Vec<String> =
        sqlx::query_scalar("SELECT sender_id FROM follow_requests WHERE receiver_id = ?")
            .bind(&row.id)
            .fetch_all(pool)
            .await?;

    Ok(Some(AuthorSnapshot {
        id: row.id,
        username: row.username,
        name: row.name,
        surname: row.surname,
        avatar: row.avatar,
        gender: row.gender.as_deref().and_then(Gender::parse),
        followings,
        follow_requests_received,
    }))
}

impl SqlRemote {
    /// Rewrites the viewer's profile and returns the fresh snapshot.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<AuthorSnapshot, RemoteError> {
        let viewer_id = self.viewer()?;

        let username = update.username.trim();
        let name = update.name.trim();
        let surname = update.surname.trim();
        require("username", username)?;
        require("name", name)?;
        require("surname", surname)?;

        let result = sqlx::query(
            r#"UPDATE users
               SET username = ?, name = ?, surname = ?, avatar = ?, gender = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(username)
        .bind(name)
        .bind(surname)
        .bind(&update.avatar)
        .bind(update.gender.map(Gender::as_str))
        .bind(Utc::now())
        .bind(viewer_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => {
                return Err(RemoteError::NotFound("User".to_string()));
            }
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(RemoteError::UsernameTaken);
            }
            Err(e) => return Err(e.into()),
        }

        load_author(&self.pool, viewer_id)
            .await?
            .ok_or_else(|| RemoteError::NotFound("User".to_string()))
    }
}
