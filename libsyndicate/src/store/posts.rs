//! Post storage and per-platform delivery records

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::error::{DbError, Result};
use crate::types::{DeliveryUpdate, Platform, Post, PostStats, PostStatus, Visibility};

use super::Database;

/// One page of posts plus the unpaginated total
#[derive(Debug, Clone)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub total: i64,
}

/// Fields replaced by a post update
///
/// `content`, `visibility`, `scheduled_time`, and `media_ids` are always
/// written; the remaining fields keep their stored value when `None`.
#[derive(Debug, Clone)]
pub struct PostPatch {
    pub content: String,
    pub visibility: Visibility,
    pub scheduled_time: Option<i64>,
    pub media_ids: Vec<String>,
    pub bluesky_media: Option<Vec<serde_json::Value>>,
    pub platforms: Option<Vec<Platform>>,
    pub status: Option<PostStatus>,
}

const POST_COLUMNS: &str = "id, user_id, content, visibility, media_ids, bluesky_media, \
     platforms, status, scheduled_time, created_at, \
     mastodon_id, mastodon_url, bluesky_uri, bluesky_cid, bluesky_url";

fn post_from_row(row: &SqliteRow) -> Post {
    Post {
        id: row.get("id"),
        user_id: row.get("user_id"),
        content: row.get("content"),
        visibility: row
            .get::<String, _>("visibility")
            .parse()
            .unwrap_or(Visibility::Public),
        media_ids: serde_json::from_str(&row.get::<String, _>("media_ids")).unwrap_or_default(),
        bluesky_media: serde_json::from_str(&row.get::<String, _>("bluesky_media"))
            .unwrap_or_default(),
        platforms: serde_json::from_str(&row.get::<String, _>("platforms")).unwrap_or_default(),
        status: row
            .get::<String, _>("status")
            .parse()
            .unwrap_or(PostStatus::Draft),
        scheduled_time: row.get("scheduled_time"),
        created_at: row.get("created_at"),
        mastodon_id: row.get("mastodon_id"),
        mastodon_url: row.get("mastodon_url"),
        bluesky_uri: row.get("bluesky_uri"),
        bluesky_cid: row.get("bluesky_cid"),
        bluesky_url: row.get("bluesky_url"),
    }
}

fn json_column<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "[]".to_string())
}

impl Database {
    /// Create a new post
    pub async fn create_post(&self, post: &Post) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO posts (
                id, user_id, content, visibility, media_ids, bluesky_media,
                platforms, status, scheduled_time, created_at,
                mastodon_id, mastodon_url, bluesky_uri, bluesky_cid, bluesky_url
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.user_id)
        .bind(&post.content)
        .bind(post.visibility.as_str())
        .bind(json_column(&post.media_ids))
        .bind(json_column(&post.bluesky_media))
        .bind(json_column(&post.platforms))
        .bind(post.status.as_str())
        .bind(post.scheduled_time)
        .bind(post.created_at)
        .bind(&post.mastodon_id)
        .bind(&post.mastodon_url)
        .bind(&post.bluesky_uri)
        .bind(&post.bluesky_cid)
        .bind(&post.bluesky_url)
        .execute(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Get a post by ID
    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS))
            .bind(post_id)
            .fetch_optional(self.pool())
            .await
            .map_err(DbError::SqlxError)?;

        Ok(row.as_ref().map(post_from_row))
    }

    /// Pending posts whose scheduled time has passed, oldest first
    pub async fn due_posts(&self, now: i64) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM posts \
             WHERE status = 'pending' AND scheduled_time IS NOT NULL AND scheduled_time <= ? \
             ORDER BY scheduled_time ASC",
            POST_COLUMNS
        ))
        .bind(now)
        .fetch_all(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(post_from_row).collect())
    }

    /// Update post status
    pub async fn set_status(&self, post_id: &str, status: PostStatus) -> Result<()> {
        sqlx::query("UPDATE posts SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(post_id)
            .execute(self.pool())
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Record delivery results, touching only the columns that are set
    ///
    /// A partial write here is what keeps one platform's delivery from
    /// disturbing another's across retries.
    pub async fn update_delivery(&self, post_id: &str, update: &DeliveryUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }

        let mut sets = Vec::new();
        if update.mastodon_id.is_some() {
            sets.push("mastodon_id = ?");
        }
        if update.mastodon_url.is_some() {
            sets.push("mastodon_url = ?");
        }
        if update.bluesky_uri.is_some() {
            sets.push("bluesky_uri = ?");
        }
        if update.bluesky_cid.is_some() {
            sets.push("bluesky_cid = ?");
        }
        if update.bluesky_url.is_some() {
            sets.push("bluesky_url = ?");
        }

        let sql = format!("UPDATE posts SET {} WHERE id = ?", sets.join(", "));
        let mut query = sqlx::query(&sql);
        if let Some(v) = &update.mastodon_id {
            query = query.bind(v);
        }
        if let Some(v) = &update.mastodon_url {
            query = query.bind(v);
        }
        if let Some(v) = &update.bluesky_uri {
            query = query.bind(v);
        }
        if let Some(v) = &update.bluesky_cid {
            query = query.bind(v);
        }
        if let Some(v) = &update.bluesky_url {
            query = query.bind(v);
        }

        query
            .bind(post_id)
            .execute(self.pool())
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// All posts, newest schedule first
    pub async fn list_all(&self, limit: i64, offset: i64) -> Result<PostPage> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(self.pool())
            .await
            .map_err(DbError::SqlxError)?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM posts ORDER BY scheduled_time DESC LIMIT ? OFFSET ?",
            POST_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(PostPage {
            posts: rows.iter().map(post_from_row).collect(),
            total,
        })
    }

    /// One user's posts, newest schedule first
    pub async fn list_owned(&self, user_id: &str, limit: i64, offset: i64) -> Result<PostPage> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(self.pool())
            .await
            .map_err(DbError::SqlxError)?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM posts WHERE user_id = ? ORDER BY scheduled_time DESC LIMIT ? OFFSET ?",
            POST_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(PostPage {
            posts: rows.iter().map(post_from_row).collect(),
            total,
        })
    }

    /// Status breakdown, optionally scoped to one user
    pub async fn post_stats(&self, user_id: Option<&str>) -> Result<PostStats> {
        let base = "SELECT COUNT(*) AS total, \
             COALESCE(SUM(CASE WHEN status = 'sent' THEN 1 ELSE 0 END), 0) AS sent, \
             COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0) AS pending, \
             COALESCE(SUM(CASE WHEN status = 'canceled' THEN 1 ELSE 0 END), 0) AS canceled \
             FROM posts";

        let row = match user_id {
            Some(user) => sqlx::query(&format!("{} WHERE user_id = ?", base))
                .bind(user)
                .fetch_one(self.pool())
                .await
                .map_err(DbError::SqlxError)?,
            None => sqlx::query(base)
                .fetch_one(self.pool())
                .await
                .map_err(DbError::SqlxError)?,
        };

        Ok(PostStats {
            total: row.get("total"),
            sent: row.get("sent"),
            pending: row.get("pending"),
            canceled: row.get("canceled"),
        })
    }

    /// Replace a post's editable fields; sent posts are immutable
    ///
    /// Returns `None` when nothing matched: unknown id or already sent.
    pub async fn update_post(&self, post_id: &str, patch: &PostPatch) -> Result<Option<Post>> {
        self.apply_patch(post_id, None, patch).await
    }

    /// Like [`update_post`](Self::update_post) but also requires ownership
    pub async fn update_owned(
        &self,
        post_id: &str,
        user_id: &str,
        patch: &PostPatch,
    ) -> Result<Option<Post>> {
        self.apply_patch(post_id, Some(user_id), patch).await
    }

    async fn apply_patch(
        &self,
        post_id: &str,
        owner: Option<&str>,
        patch: &PostPatch,
    ) -> Result<Option<Post>> {
        let mut sql = String::from(
            "UPDATE posts SET content = ?, visibility = ?, scheduled_time = ?, media_ids = ?, \
             bluesky_media = COALESCE(?, bluesky_media), \
             platforms = COALESCE(?, platforms), \
             status = COALESCE(?, status) \
             WHERE id = ? AND status != 'sent'",
        );
        if owner.is_some() {
            sql.push_str(" AND user_id = ?");
        }

        let mut query = sqlx::query(&sql)
            .bind(&patch.content)
            .bind(patch.visibility.as_str())
            .bind(patch.scheduled_time)
            .bind(json_column(&patch.media_ids))
            .bind(patch.bluesky_media.as_ref().map(json_column))
            .bind(patch.platforms.as_ref().map(json_column))
            .bind(patch.status.map(|s| s.as_str()))
            .bind(post_id);
        if let Some(user) = owner {
            query = query.bind(user);
        }

        let result = query
            .execute(self.pool())
            .await
            .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_post(post_id).await
    }

    /// Delete a post by ID; returns whether a row was removed
    pub async fn delete_post(&self, post_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(post_id)
            .execute(self.pool())
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a post the user owns; returns whether a row was removed
    pub async fn delete_owned(&self, post_id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ? AND user_id = ?")
            .bind(post_id)
            .bind(user_id)
            .execute(self.pool())
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }
}
