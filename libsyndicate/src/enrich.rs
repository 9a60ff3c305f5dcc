//! Read-time engagement enrichment
//!
//! Decorates posts with live reply/favorite/repost counts fetched from every
//! enabled platform. Counters start at zero and each platform's numbers are
//! added on top, so a post delivered to both Mastodon and Bluesky shows the
//! combined engagement. Only posts already marked `sent` are looked up;
//! drafts and partially-delivered pending posts keep zero counters. Nothing here writes to the store; a platform outage
//! just means its share of the counts is missing this read.

use crate::platforms::PlatformRegistry;
use crate::types::{IntegrationFlags, Post, PostStatus, PostView};

pub async fn enrich_posts(
    registry: &PlatformRegistry,
    flags: &IntegrationFlags,
    posts: &[Post],
) -> Vec<PostView> {
    let mut views: Vec<PostView> = posts.iter().cloned().map(PostView::new).collect();

    for client in registry.iter() {
        if !client.is_enabled(flags) {
            continue;
        }
        let platform = client.platform();

        // Only sent posts carry counts worth fetching; skip the platform
        // entirely when this page has none for it.
        let wanted = posts
            .iter()
            .any(|p| p.status == PostStatus::Sent && p.is_delivered(platform));
        if !wanted {
            continue;
        }

        let counts = client.get_counts(posts).await;
        if counts.is_empty() {
            continue;
        }

        for view in &mut views {
            if view.post.status != PostStatus::Sent {
                continue;
            }
            let Some(id) = view.post.delivery_id(platform) else {
                continue;
            };
            if let Some(c) = counts.get(id) {
                view.replies_count += c.replies;
                view.favorites_count += c.favorites;
                view.reposts_count += c.reposts;
                // Back-fill a missing creation time from the first platform
                // that reports one
                if view.post.created_at.is_none() {
                    view.post.created_at = c.created_at;
                }
            }
        }
    }

    views
}
