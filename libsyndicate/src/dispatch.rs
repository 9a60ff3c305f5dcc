//! Due-post dispatcher
//!
//! One tick: snapshot the integration flags, load the due posts, and walk
//! them in schedule order. Each target platform is attempted independently;
//! a success is persisted immediately so a crash or a failing sibling
//! platform never loses it. A post flips to `sent` only once every target
//! is delivered, otherwise it stays `pending` and is retried next tick.

use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::platforms::PlatformRegistry;
use crate::store::Database;
use crate::types::{DeliveryUpdate, IntegrationFlags, Post, PostStatus};

pub struct Dispatcher {
    db: Database,
    registry: PlatformRegistry,
}

impl Dispatcher {
    pub fn new(db: Database, registry: PlatformRegistry) -> Self {
        Self { db, registry }
    }

    /// Process everything currently due; returns how many posts became `sent`
    pub async fn run_tick(&self) -> Result<usize> {
        let flags = self.db.ensure_integrations().await?;
        let now = chrono::Utc::now().timestamp();
        let due = self.db.due_posts(now).await?;

        if due.is_empty() {
            return Ok(0);
        }
        info!(count = due.len(), "processing due posts");

        let mut sent = 0;
        for post in due {
            match self.dispatch_post(&post, &flags).await {
                Ok(true) => sent += 1,
                Ok(false) => {}
                // One bad post must not take down the tick
                Err(e) => error!(post_id = %post.id, error = %e, "dispatch failed"),
            }
        }

        if sent > 0 {
            info!(sent, "posts fully delivered");
        }
        Ok(sent)
    }

    /// Deliver one post to its remaining targets; true if it became `sent`
    async fn dispatch_post(&self, post: &Post, flags: &IntegrationFlags) -> Result<bool> {
        let mut all_delivered = true;

        for platform in post.target_platforms() {
            if post.is_delivered(platform) {
                continue;
            }

            let Some(client) = self.registry.get(platform) else {
                warn!(post_id = %post.id, %platform, "no client for platform");
                all_delivered = false;
                continue;
            };

            if !client.is_enabled(flags) {
                // Disabled is not an error; the post waits for the flag
                debug!(post_id = %post.id, %platform, "platform disabled, skipping");
                all_delivered = false;
                continue;
            }

            match client.send_post(post).await {
                Some(delivery) => {
                    let update = DeliveryUpdate::for_platform(platform, &delivery);
                    self.db.update_delivery(&post.id, &update).await?;
                    info!(post_id = %post.id, %platform, platform_post_id = %delivery.platform_post_id, "delivered");
                }
                None => {
                    warn!(post_id = %post.id, %platform, "delivery failed, will retry next tick");
                    all_delivered = false;
                }
            }
        }

        if all_delivered && post.status != PostStatus::Sent {
            self.db.set_status(&post.id, PostStatus::Sent).await?;
            return Ok(true);
        }

        Ok(false)
    }
}
