//! Platform clients and their shared trait
//!
//! Each supported platform gets one client implementing [`PlatformClient`].
//! Clients read credentials from the store at call time, so a token rotated
//! or revoked between calls is picked up without restarting anything.
//!
//! Delivery and metric calls deliberately return `Option`/empty instead of
//! errors: a missing credential and an upstream failure both mean "nothing
//! happened for this platform", the cause is logged, and the caller moves on.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::store::Database;
use crate::types::{Delivery, EngagementCounts, IntegrationFlags, MediaRef, Platform, Post};

pub mod bluesky;
pub mod mastodon;

// Mock client is available for all builds (not just tests) to support integration tests
pub mod mock;

pub use bluesky::BlueskyClient;
pub use mastodon::MastodonClient;

/// Login material for connecting an account, shaped per platform
#[derive(Debug, Clone)]
pub enum ConnectParams {
    /// Bearer token already exchanged through the instance's OAuth flow
    Mastodon { access_token: String },
    /// Handle plus app password, traded for a session pair
    Bluesky {
        handle: String,
        app_password: String,
    },
}

impl ConnectParams {
    pub fn platform(&self) -> Platform {
        match self {
            ConnectParams::Mastodon { .. } => Platform::Mastodon,
            ConnectParams::Bluesky { .. } => Platform::Bluesky,
        }
    }
}

/// Unified interface over the platforms posts are delivered to
#[async_trait]
pub trait PlatformClient: Send + Sync {
    fn platform(&self) -> Platform;

    /// Whether this platform is turned on by the deployment's flags
    fn is_enabled(&self, flags: &IntegrationFlags) -> bool {
        flags.enabled(self.platform())
    }

    /// Upper bound on a single media upload, in bytes
    fn max_media_bytes(&self) -> u64;

    /// Whether the platform accepts this media MIME type
    fn accepts_mime(&self, mime: &str) -> bool;

    /// Establish and persist credentials for a user
    ///
    /// Errors propagate here, unlike the delivery methods, because the caller
    /// is interactively connecting an account and needs to know what failed.
    async fn connect(&self, user_id: &str, params: &ConnectParams) -> Result<()>;

    /// Upload one media item for the user
    ///
    /// `None` means no usable credential or the upstream rejected the upload;
    /// the cause is logged.
    async fn upload_media(
        &self,
        user_id: &str,
        bytes: Vec<u8>,
        mime: &str,
        file_name: &str,
    ) -> Option<MediaRef>;

    /// Publish the post for its owner
    ///
    /// `None` means the post was not delivered (no credential, expired
    /// session, upstream rejection); the dispatcher retries on a later tick.
    async fn send_post(&self, post: &Post) -> Option<Delivery>;

    /// Fetch engagement counts for delivered posts, keyed by platform post id
    ///
    /// Posts without a delivery on this platform are skipped. Failures degrade
    /// to missing entries, never to an error.
    async fn get_counts(&self, posts: &[Post]) -> HashMap<String, EngagementCounts>;
}

/// The fixed set of platform clients for a deployment
///
/// Iteration order is stable (Mastodon, then Bluesky) so dispatch and
/// enrichment behave deterministically.
#[derive(Clone)]
pub struct PlatformRegistry {
    clients: Vec<Arc<dyn PlatformClient>>,
}

impl PlatformRegistry {
    pub fn from_config(config: &Config, db: &Database) -> Result<Self> {
        Ok(Self {
            clients: vec![
                Arc::new(MastodonClient::new(&config.mastodon, db.clone())?),
                Arc::new(BlueskyClient::new(&config.bluesky, db.clone())?),
            ],
        })
    }

    /// Build a registry from arbitrary clients (used by tests)
    pub fn with_clients(clients: Vec<Arc<dyn PlatformClient>>) -> Self {
        Self { clients }
    }

    pub fn get(&self, platform: Platform) -> Option<&Arc<dyn PlatformClient>> {
        self.clients.iter().find(|c| c.platform() == platform)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn PlatformClient>> {
        self.clients.iter()
    }
}
