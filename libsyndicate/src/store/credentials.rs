//! Per-user platform credential storage
//!
//! One row per (user, platform) pair; storing a new credential replaces any
//! prior one atomically. Refresh logic lives in the platform clients, not here.

use sqlx::Row;

use crate::error::{DbError, Result};
use crate::types::{BlueskySession, Credential, Platform};

use super::Database;

impl Database {
    /// Store a credential, replacing any existing one for the pair
    pub async fn put_credential(&self, user_id: &str, credential: &Credential) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        let (access_token, refresh_token, did, handle, expires_at) = match credential {
            Credential::Mastodon { access_token } => {
                (access_token.as_str(), None, None, None, None)
            }
            Credential::Bluesky(session) => (
                session.access_jwt.as_str(),
                Some(session.refresh_jwt.as_str()),
                Some(session.did.as_str()),
                Some(session.handle.as_str()),
                session.expires_at,
            ),
        };

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO credentials
                (user_id, platform, access_token, refresh_token, did, handle, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(credential.platform().as_str())
        .bind(access_token)
        .bind(refresh_token)
        .bind(did)
        .bind(handle)
        .bind(expires_at)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Load the stored credential for a (user, platform) pair
    pub async fn get_credential(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Option<Credential>> {
        let row = sqlx::query(
            "SELECT access_token, refresh_token, did, handle, expires_at \
             FROM credentials WHERE user_id = ? AND platform = ?",
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let credential = match platform {
            Platform::Mastodon => Credential::Mastodon {
                access_token: row.get("access_token"),
            },
            Platform::Bluesky => Credential::Bluesky(BlueskySession {
                did: row.get::<Option<String>, _>("did").unwrap_or_default(),
                handle: row.get::<Option<String>, _>("handle").unwrap_or_default(),
                access_jwt: row.get("access_token"),
                refresh_jwt: row
                    .get::<Option<String>, _>("refresh_token")
                    .unwrap_or_default(),
                expires_at: row.get("expires_at"),
            }),
        };

        Ok(Some(credential))
    }

    /// Remove a credential; returns whether one existed
    pub async fn remove_credential(&self, user_id: &str, platform: Platform) -> Result<bool> {
        let result = sqlx::query("DELETE FROM credentials WHERE user_id = ? AND platform = ?")
            .bind(user_id)
            .bind(platform.as_str())
            .execute(self.pool())
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    /// Whether the user has a stored credential for the platform
    pub async fn has_credential(&self, user_id: &str, platform: Platform) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM credentials WHERE user_id = ? AND platform = ?",
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_one(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(count > 0)
    }
}
