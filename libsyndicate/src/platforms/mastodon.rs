//! Mastodon platform client
//!
//! Talks to one Mastodon instance (configured per deployment) using each
//! user's stored OAuth bearer token. Media goes through `/api/v2/media`,
//! statuses through `/api/v1/statuses`, and engagement counts come from
//! per-status lookups.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::MastodonConfig;
use crate::error::{PlatformError, Result};
use crate::store::Database;
use crate::types::{
    Credential, Delivery, EngagementCounts, MediaRef, Platform, Post, PostStatus, Visibility,
};

use super::{ConnectParams, PlatformClient};

const MAX_MEDIA_BYTES: u64 = 40 * 1024 * 1024;

pub struct MastodonClient {
    http: reqwest::Client,
    base_url: String,
    db: Database,
}

#[derive(Debug, Deserialize)]
struct MediaResponse {
    id: String,
    preview_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    id: String,
    url: Option<String>,
    created_at: Option<String>,
    #[serde(default)]
    replies_count: i64,
    #[serde(default)]
    favourites_count: i64,
    #[serde(default)]
    reblogs_count: i64,
}

impl MastodonClient {
    pub fn new(config: &MastodonConfig, db: Database) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PlatformError::Network(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            db,
        })
    }

    /// The user's bearer token, if connected
    async fn token(&self, user_id: &str) -> Option<String> {
        match self.db.get_credential(user_id, Platform::Mastodon).await {
            Ok(Some(Credential::Mastodon { access_token })) => Some(access_token),
            Ok(_) => {
                debug!(user_id, "no mastodon credential");
                None
            }
            Err(e) => {
                warn!(user_id, error = %e, "failed to load mastodon credential");
                None
            }
        }
    }

    async fn fetch_status(&self, token: &str, status_id: &str) -> Option<StatusResponse> {
        let url = format!("{}/api/v1/statuses/{}", self.base_url, status_id);
        let response = match self.http.get(&url).bearer_auth(token).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(status_id, error = %e, "mastodon status lookup failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(status_id, status = %response.status(), "mastodon status lookup rejected");
            return None;
        }

        match response.json::<StatusResponse>().await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(status_id, error = %e, "mastodon status response malformed");
                None
            }
        }
    }
}

fn parse_rfc3339(timestamp: Option<&str>) -> Option<i64> {
    timestamp
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp())
}

#[async_trait]
impl PlatformClient for MastodonClient {
    fn platform(&self) -> Platform {
        Platform::Mastodon
    }

    fn max_media_bytes(&self) -> u64 {
        MAX_MEDIA_BYTES
    }

    fn accepts_mime(&self, mime: &str) -> bool {
        mime.starts_with("image/") || mime.starts_with("video/") || mime.starts_with("audio/")
    }

    async fn connect(&self, user_id: &str, params: &ConnectParams) -> Result<()> {
        let ConnectParams::Mastodon { access_token } = params else {
            return Err(PlatformError::Validation(
                "mastodon connect requires an access token".to_string(),
            )
            .into());
        };

        if access_token.trim().is_empty() {
            return Err(
                PlatformError::Authentication("empty access token".to_string()).into(),
            );
        }

        self.db
            .put_credential(
                user_id,
                &Credential::Mastodon {
                    access_token: access_token.clone(),
                },
            )
            .await
    }

    async fn upload_media(
        &self,
        user_id: &str,
        bytes: Vec<u8>,
        mime: &str,
        file_name: &str,
    ) -> Option<MediaRef> {
        let token = self.token(user_id).await?;

        let part = match reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime)
        {
            Ok(part) => part,
            Err(e) => {
                warn!(user_id, mime, error = %e, "invalid media mime type");
                return None;
            }
        };
        let form = reqwest::multipart::Form::new().part("file", part);

        let url = format!("{}/api/v2/media", self.base_url);
        let response = match self
            .http
            .post(&url)
            .bearer_auth(&token)
            .multipart(form)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(user_id, error = %e, "mastodon media upload failed");
                return None;
            }
        };

        // 202 means the instance is still processing the attachment; the id
        // is already valid for status creation.
        if !response.status().is_success() {
            warn!(user_id, status = %response.status(), "mastodon media upload rejected");
            return None;
        }

        match response.json::<MediaResponse>().await {
            Ok(media) => Some(MediaRef::Mastodon {
                id: media.id,
                preview_url: media.preview_url,
            }),
            Err(e) => {
                warn!(user_id, error = %e, "mastodon media response malformed");
                None
            }
        }
    }

    async fn send_post(&self, post: &Post) -> Option<Delivery> {
        let token = self.token(&post.user_id).await?;

        let visibility = match post.visibility {
            Visibility::Public => "public",
            Visibility::Private => "private",
        };
        let body = serde_json::json!({
            "status": post.content,
            "visibility": visibility,
            "media_ids": post.media_ids,
        });

        let url = format!("{}/api/v1/statuses", self.base_url);
        let response = match self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(post_id = %post.id, error = %e, "mastodon publish failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(post_id = %post.id, status = %response.status(), "mastodon publish rejected");
            return None;
        }

        match response.json::<StatusResponse>().await {
            Ok(status) => Some(Delivery {
                platform_post_id: status.id,
                cid: None,
                url: status.url,
                created_at: parse_rfc3339(status.created_at.as_deref()),
            }),
            Err(e) => {
                warn!(post_id = %post.id, error = %e, "mastodon publish response malformed");
                None
            }
        }
    }

    async fn get_counts(&self, posts: &[Post]) -> HashMap<String, EngagementCounts> {
        // Group sent posts by owner so each user's token is looked up once.
        // Posts still pending never reach upstream even if partially delivered.
        let mut by_user: HashMap<&str, Vec<&str>> = HashMap::new();
        for post in posts {
            if post.status != PostStatus::Sent {
                continue;
            }
            if let Some(status_id) = post.mastodon_id.as_deref() {
                by_user.entry(&post.user_id).or_default().push(status_id);
            }
        }

        let mut counts = HashMap::new();
        for (user_id, status_ids) in by_user {
            let Some(token) = self.token(user_id).await else {
                continue;
            };

            let lookups = status_ids
                .iter()
                .map(|id| self.fetch_status(&token, id));
            for status in futures::future::join_all(lookups).await.into_iter().flatten() {
                let created_at = parse_rfc3339(status.created_at.as_deref());
                counts.insert(
                    status.id.clone(),
                    EngagementCounts {
                        replies: status.replies_count,
                        favorites: status.favourites_count,
                        reposts: status.reblogs_count,
                        created_at,
                    },
                );
            }
        }

        counts
    }
}
