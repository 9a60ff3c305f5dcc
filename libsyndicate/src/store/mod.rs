//! Persistent storage for posts, credentials, and integration settings
//!
//! All storage lives in a single SQLite database. Each concern gets its own
//! submodule extending [`Database`]: posts and their per-platform delivery
//! records, platform credentials, and the deployment-wide integration flags.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;

use crate::error::Result;

pub mod credentials;
pub mod posts;
pub mod settings;

pub use posts::{PostPatch, PostPage};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at the given path and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let pool = if db_path == ":memory:" {
            // A shared in-memory database only exists as long as its single
            // connection, so the pool must not open more than one.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await
                .map_err(crate::error::DbError::SqlxError)?
        } else {
            // Expand path and create parent directories
            let expanded_path = shellexpand::tilde(db_path).to_string();
            let path = Path::new(&expanded_path);

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(crate::error::DbError::IoError)?;
            }

            // Forward slashes work in SQLite URLs on all platforms; mode=rwc
            // creates the file if it does not exist.
            let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

            SqlitePool::connect(&db_url)
                .await
                .map_err(crate::error::DbError::SqlxError)?
        };

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(crate::error::DbError::MigrationError)?;

        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
