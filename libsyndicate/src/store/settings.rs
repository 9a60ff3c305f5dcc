//! Deployment-wide integration flags
//!
//! Stored as `app_settings` key/value rows so adding a setting never needs a
//! schema change. Both platform flags default to enabled on first read.

use sqlx::Row;

use crate::error::{DbError, Result};
use crate::types::IntegrationFlags;

use super::Database;

const MASTODON_KEY: &str = "mastodon_enabled";
const BLUESKY_KEY: &str = "bluesky_enabled";

impl Database {
    /// Read the integration flags, seeding the defaults on first use
    pub async fn ensure_integrations(&self) -> Result<IntegrationFlags> {
        sqlx::query(
            "INSERT OR IGNORE INTO app_settings (key, value, updated_at) VALUES (?, 1, ?), (?, 1, ?)",
        )
        .bind(MASTODON_KEY)
        .bind(chrono::Utc::now().timestamp())
        .bind(BLUESKY_KEY)
        .bind(chrono::Utc::now().timestamp())
        .execute(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        self.read_integrations().await
    }

    /// Overwrite both flags and return the new state
    pub async fn update_integrations(&self, flags: &IntegrationFlags) -> Result<IntegrationFlags> {
        let now = chrono::Utc::now().timestamp();

        for (key, value) in [
            (MASTODON_KEY, flags.mastodon_enabled),
            (BLUESKY_KEY, flags.bluesky_enabled),
        ] {
            sqlx::query(
                "INSERT INTO app_settings (key, value, updated_at) VALUES (?, ?, ?) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            )
            .bind(key)
            .bind(value as i64)
            .bind(now)
            .execute(self.pool())
            .await
            .map_err(DbError::SqlxError)?;
        }

        self.read_integrations().await
    }

    async fn read_integrations(&self) -> Result<IntegrationFlags> {
        let rows = sqlx::query("SELECT key, value FROM app_settings WHERE key IN (?, ?)")
            .bind(MASTODON_KEY)
            .bind(BLUESKY_KEY)
            .fetch_all(self.pool())
            .await
            .map_err(DbError::SqlxError)?;

        let mut flags = IntegrationFlags::default();
        for row in rows {
            let key: String = row.get("key");
            let value: i64 = row.get("value");
            match key.as_str() {
                MASTODON_KEY => flags.mastodon_enabled = value != 0,
                BLUESKY_KEY => flags.bluesky_enabled = value != 0,
                _ => {}
            }
        }

        Ok(flags)
    }
}
