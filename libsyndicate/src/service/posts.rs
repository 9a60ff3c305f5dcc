//! Post scheduling, listing, editing, and media upload operations

use serde::Serialize;

use crate::enrich::enrich_posts;
use crate::error::{PlatformError, Result, SyndicateError};
use crate::store::PostPatch;
use crate::types::{
    derive_status, Caller, IntegrationFlags, MediaRef, Platform, Post, PostStats, PostStatus,
    PostView, Visibility,
};

use super::SyndicateService;

const MAX_CONTENT_CHARS: usize = 255;
const MAX_PAGE_SIZE: i64 = 100;

/// Input for creating a post
#[derive(Debug, Clone)]
pub struct NewPost {
    pub content: String,
    pub visibility: Visibility,
    pub scheduled_time: Option<i64>,
    pub platforms: Vec<Platform>,
    pub media_ids: Vec<String>,
    pub bluesky_media: Vec<serde_json::Value>,
    pub status: Option<PostStatus>,
}

impl Default for NewPost {
    fn default() -> Self {
        Self {
            content: String::new(),
            visibility: Visibility::Public,
            scheduled_time: None,
            platforms: Vec::new(),
            media_ids: Vec::new(),
            bluesky_media: Vec::new(),
            status: None,
        }
    }
}

/// Input for editing a post
#[derive(Debug, Clone)]
pub struct UpdatePost {
    pub content: String,
    pub visibility: Visibility,
    pub scheduled_time: Option<i64>,
    pub media_ids: Vec<String>,
    pub bluesky_media: Option<Vec<serde_json::Value>>,
    pub platforms: Option<Vec<Platform>>,
    pub status: Option<PostStatus>,
}

/// One page of enriched posts with pagination and stats
#[derive(Debug, Serialize)]
pub struct PostListing {
    pub posts: Vec<PostView>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub stats: PostStats,
}

fn validate_content(content: &str) -> Result<String> {
    let trimmed = content.trim();
    let len = trimmed.chars().count();
    if len == 0 {
        return Err(SyndicateError::InvalidInput(
            "content cannot be empty".to_string(),
        ));
    }
    if len > MAX_CONTENT_CHARS {
        return Err(SyndicateError::InvalidInput(format!(
            "content exceeds {} character limit (got {})",
            MAX_CONTENT_CHARS, len
        )));
    }
    Ok(trimmed.to_string())
}

fn check_platforms_enabled(flags: &IntegrationFlags, platforms: &[Platform]) -> Result<()> {
    let disabled: Vec<&str> = platforms
        .iter()
        .filter(|p| !flags.enabled(**p))
        .map(|p| p.as_str())
        .collect();

    if disabled.is_empty() {
        Ok(())
    } else {
        Err(SyndicateError::PlatformDisabled(disabled.join(", ")))
    }
}

impl SyndicateService {
    /// Create a post; a scheduled time makes it eligible for dispatch
    pub async fn schedule_post(&self, caller: &Caller, new: NewPost) -> Result<Post> {
        let content = validate_content(&new.content)?;

        let flags = self.db.ensure_integrations().await?;
        let targets = if new.platforms.is_empty() {
            vec![Platform::Mastodon]
        } else {
            new.platforms.clone()
        };
        check_platforms_enabled(&flags, &targets)?;

        let mut post = Post::new(caller.user_id.clone(), content);
        post.visibility = new.visibility;
        post.scheduled_time = new.scheduled_time;
        post.platforms = new.platforms;
        post.media_ids = new.media_ids;
        post.bluesky_media = new.bluesky_media;
        post.status = derive_status(new.scheduled_time.is_some(), new.status);

        self.db.create_post(&post).await?;
        Ok(post)
    }

    /// List posts with live engagement counts, scoped to the caller
    ///
    /// Admins see every user's posts; everyone else sees their own.
    pub async fn list_posts(&self, caller: &Caller, page: i64, limit: i64) -> Result<PostListing> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let page = page.max(1);
        let offset = (page - 1) * limit;

        let (page_data, stats) = if caller.is_admin() {
            (
                self.db.list_all(limit, offset).await?,
                self.db.post_stats(None).await?,
            )
        } else {
            (
                self.db.list_owned(&caller.user_id, limit, offset).await?,
                self.db.post_stats(Some(&caller.user_id)).await?,
            )
        };

        let flags = self.db.ensure_integrations().await?;
        let posts = enrich_posts(&self.registry, &flags, &page_data.posts).await;

        Ok(PostListing {
            posts,
            page,
            limit,
            total: page_data.total,
            stats,
        })
    }

    /// Edit a post the caller may edit; sent posts are immutable
    pub async fn update_post(
        &self,
        caller: &Caller,
        post_id: &str,
        update: UpdatePost,
    ) -> Result<Post> {
        let content = validate_content(&update.content)?;

        if let Some(platforms) = &update.platforms {
            let flags = self.db.ensure_integrations().await?;
            check_platforms_enabled(&flags, platforms)?;
        }

        let patch = PostPatch {
            content,
            visibility: update.visibility,
            scheduled_time: update.scheduled_time,
            media_ids: update.media_ids,
            bluesky_media: update.bluesky_media,
            platforms: update.platforms,
            status: Some(derive_status(update.scheduled_time.is_some(), update.status)),
        };

        let result = if caller.is_admin() {
            self.db.update_post(post_id, &patch).await?
        } else {
            self.db.update_owned(post_id, &caller.user_id, &patch).await?
        };

        result.ok_or_else(|| {
            SyndicateError::InvalidInput("post not found or already sent".to_string())
        })
    }

    /// Delete a post the caller may delete
    pub async fn delete_post(&self, caller: &Caller, post_id: &str) -> Result<()> {
        let deleted = if caller.is_admin() {
            self.db.delete_post(post_id).await?
        } else {
            self.db.delete_owned(post_id, &caller.user_id).await?
        };

        if deleted {
            Ok(())
        } else {
            Err(SyndicateError::InvalidInput("post not found".to_string()))
        }
    }

    /// Upload one media item to every target platform
    ///
    /// Size and MIME type are checked against every target before any bytes
    /// go over the wire, so a violation costs nothing upstream.
    pub async fn upload_media(
        &self,
        caller: &Caller,
        targets: &[Platform],
        bytes: Vec<u8>,
        mime: &str,
        file_name: &str,
    ) -> Result<Vec<MediaRef>> {
        if targets.is_empty() {
            return Err(SyndicateError::InvalidInput(
                "no target platforms".to_string(),
            ));
        }

        let flags = self.db.ensure_integrations().await?;
        check_platforms_enabled(&flags, targets)?;

        let mut clients = Vec::new();
        for platform in targets {
            let client = self.registry.get(*platform).ok_or_else(|| {
                SyndicateError::InvalidInput(format!("unknown platform: {}", platform))
            })?;
            clients.push((*platform, client));
        }

        // The strictest target sets the ceiling
        let ceiling = clients
            .iter()
            .map(|(_, c)| c.max_media_bytes())
            .min()
            .unwrap_or(u64::MAX);
        if bytes.len() as u64 > ceiling {
            return Err(SyndicateError::InvalidInput(format!(
                "media exceeds {} byte limit",
                ceiling
            )));
        }

        for (platform, client) in &clients {
            if !client.accepts_mime(mime) {
                return Err(SyndicateError::InvalidInput(format!(
                    "{} does not accept {}",
                    platform, mime
                )));
            }
        }

        let mut refs = Vec::new();
        for (platform, client) in &clients {
            match client
                .upload_media(&caller.user_id, bytes.clone(), mime, file_name)
                .await
            {
                Some(media_ref) => refs.push(media_ref),
                None => {
                    return Err(PlatformError::Posting(format!(
                        "{} media upload failed",
                        platform
                    ))
                    .into())
                }
            }
        }

        Ok(refs)
    }
}
