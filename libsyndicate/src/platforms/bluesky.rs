//! Bluesky (AT Protocol) platform client
//!
//! Sessions are a JWT pair. The access token is short-lived, so every read of
//! a stored session checks its decoded expiry and refreshes through
//! `refreshSession` when it is inside the leeway window, persisting the
//! rotated pair before use. A failed refresh is treated the same as a missing
//! credential.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::BlueskyConfig;
use crate::error::{PlatformError, Result};
use crate::store::Database;
use crate::types::{
    BlueskySession, Credential, Delivery, EngagementCounts, MediaRef, Platform, Post, PostStatus,
};

use super::{ConnectParams, PlatformClient};

/// Refresh the access token this close to its expiry
const REFRESH_LEEWAY_SECS: i64 = 60;
/// `app.bsky.feed.getPosts` caps the uris parameter at 25
const GET_POSTS_MAX: usize = 25;
/// An image embed carries at most four images
const MAX_EMBED_IMAGES: usize = 4;
/// PDS blob size ceiling for images
const MAX_MEDIA_BYTES: u64 = 1_000_000;

pub struct BlueskyClient {
    http: reqwest::Client,
    service: String,
    db: Database,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    did: String,
    handle: String,
    access_jwt: String,
    refresh_jwt: String,
}

#[derive(Debug, Deserialize)]
struct UploadBlobResponse {
    blob: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CreateRecordResponse {
    uri: String,
    cid: String,
}

#[derive(Debug, Deserialize)]
struct GetPostsResponse {
    posts: Vec<FeedPostView>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedPostView {
    uri: String,
    #[serde(default)]
    reply_count: i64,
    #[serde(default)]
    like_count: i64,
    #[serde(default)]
    repost_count: i64,
    record: Option<serde_json::Value>,
}

/// Decode the `exp` claim from a JWT without verifying it
///
/// We only need the expiry to decide when to refresh; the PDS is the one
/// verifying signatures.
fn decode_jwt_expiry(jwt: &str) -> Option<i64> {
    let payload = jwt.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("exp")?.as_i64()
}

impl BlueskyClient {
    pub fn new(config: &BlueskyConfig, db: Database) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PlatformError::Network(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            http,
            service: config.service.trim_end_matches('/').to_string(),
            db,
        })
    }

    fn xrpc(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.service, method)
    }

    /// Trade a handle and app password for a fresh session pair
    pub async fn create_session(&self, handle: &str, app_password: &str) -> Result<BlueskySession> {
        let response = self
            .http
            .post(self.xrpc("com.atproto.server.createSession"))
            .json(&serde_json::json!({
                "identifier": handle,
                "password": app_password,
            }))
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("createSession failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(PlatformError::Authentication(format!(
                "createSession returned {}",
                response.status()
            ))
            .into());
        }

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Network(format!("createSession response malformed: {}", e)))?;

        let expires_at = decode_jwt_expiry(&session.access_jwt);
        Ok(BlueskySession {
            did: session.did,
            handle: session.handle,
            access_jwt: session.access_jwt,
            refresh_jwt: session.refresh_jwt,
            expires_at,
        })
    }

    /// The user's session, refreshed and re-persisted if near expiry
    async fn session(&self, user_id: &str) -> Option<BlueskySession> {
        let stored = match self.db.get_credential(user_id, Platform::Bluesky).await {
            Ok(Some(Credential::Bluesky(session))) => session,
            Ok(_) => {
                debug!(user_id, "no bluesky credential");
                return None;
            }
            Err(e) => {
                warn!(user_id, error = %e, "failed to load bluesky credential");
                return None;
            }
        };

        let now = chrono::Utc::now().timestamp();
        let fresh = stored
            .expires_at
            .map(|exp| exp - now > REFRESH_LEEWAY_SECS)
            .unwrap_or(false);
        if fresh {
            return Some(stored);
        }

        self.refresh_session(user_id, &stored).await
    }

    async fn refresh_session(
        &self,
        user_id: &str,
        stored: &BlueskySession,
    ) -> Option<BlueskySession> {
        let response = match self
            .http
            .post(self.xrpc("com.atproto.server.refreshSession"))
            .bearer_auth(&stored.refresh_jwt)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(user_id, error = %e, "bluesky session refresh failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(user_id, status = %response.status(), "bluesky session refresh rejected");
            return None;
        }

        let refreshed: SessionResponse = match response.json().await {
            Ok(r) => r,
            Err(e) => {
                warn!(user_id, error = %e, "bluesky refresh response malformed");
                return None;
            }
        };

        let session = BlueskySession {
            did: refreshed.did,
            handle: refreshed.handle,
            expires_at: decode_jwt_expiry(&refreshed.access_jwt),
            access_jwt: refreshed.access_jwt,
            refresh_jwt: refreshed.refresh_jwt,
        };

        // Persist the rotated pair; the old refresh token is now burned.
        if let Err(e) = self
            .db
            .put_credential(user_id, &Credential::Bluesky(session.clone()))
            .await
        {
            warn!(user_id, error = %e, "failed to persist refreshed bluesky session");
        }

        Some(session)
    }

    async fn fetch_counts_batch(
        &self,
        session: &BlueskySession,
        uris: &[&str],
    ) -> Option<GetPostsResponse> {
        let query: Vec<(&str, &str)> = uris.iter().map(|uri| ("uris", *uri)).collect();

        let response = match self
            .http
            .get(self.xrpc("app.bsky.feed.getPosts"))
            .bearer_auth(&session.access_jwt)
            .query(&query)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "bluesky getPosts failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "bluesky getPosts rejected");
            return None;
        }

        match response.json::<GetPostsResponse>().await {
            Ok(batch) => Some(batch),
            Err(e) => {
                warn!(error = %e, "bluesky getPosts response malformed");
                None
            }
        }
    }
}

fn record_created_at(record: Option<&serde_json::Value>) -> Option<i64> {
    record
        .and_then(|r| r.get("createdAt"))
        .and_then(|v| v.as_str())
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp())
}

/// Permalink on the bsky.app frontend for a feed post record
fn post_url(handle: &str, uri: &str) -> String {
    let rkey = uri.rsplit('/').next().unwrap_or_default();
    format!("https://bsky.app/profile/{}/post/{}", handle, rkey)
}

#[async_trait]
impl PlatformClient for BlueskyClient {
    fn platform(&self) -> Platform {
        Platform::Bluesky
    }

    fn max_media_bytes(&self) -> u64 {
        MAX_MEDIA_BYTES
    }

    fn accepts_mime(&self, mime: &str) -> bool {
        mime.starts_with("image/")
    }

    async fn connect(&self, user_id: &str, params: &ConnectParams) -> Result<()> {
        let ConnectParams::Bluesky {
            handle,
            app_password,
        } = params
        else {
            return Err(PlatformError::Validation(
                "bluesky connect requires a handle and app password".to_string(),
            )
            .into());
        };

        let session = self.create_session(handle, app_password).await?;
        self.db
            .put_credential(user_id, &Credential::Bluesky(session))
            .await
    }

    async fn upload_media(
        &self,
        user_id: &str,
        bytes: Vec<u8>,
        mime: &str,
        _file_name: &str,
    ) -> Option<MediaRef> {
        let session = self.session(user_id).await?;

        let response = match self
            .http
            .post(self.xrpc("com.atproto.repo.uploadBlob"))
            .bearer_auth(&session.access_jwt)
            .header(reqwest::header::CONTENT_TYPE, mime)
            .body(bytes)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(user_id, error = %e, "bluesky blob upload failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(user_id, status = %response.status(), "bluesky blob upload rejected");
            return None;
        }

        match response.json::<UploadBlobResponse>().await {
            Ok(upload) => Some(MediaRef::Bluesky { blob: upload.blob }),
            Err(e) => {
                warn!(user_id, error = %e, "bluesky blob response malformed");
                None
            }
        }
    }

    async fn send_post(&self, post: &Post) -> Option<Delivery> {
        let session = self.session(&post.user_id).await?;

        let now = chrono::Utc::now();
        let mut record = serde_json::json!({
            "$type": "app.bsky.feed.post",
            "text": post.content,
            "createdAt": now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        });

        if !post.bluesky_media.is_empty() {
            let images: Vec<serde_json::Value> = post
                .bluesky_media
                .iter()
                .take(MAX_EMBED_IMAGES)
                .map(|blob| serde_json::json!({ "image": blob, "alt": "" }))
                .collect();
            record["embed"] = serde_json::json!({
                "$type": "app.bsky.embed.images",
                "images": images,
            });
        }

        let response = match self
            .http
            .post(self.xrpc("com.atproto.repo.createRecord"))
            .bearer_auth(&session.access_jwt)
            .json(&serde_json::json!({
                "repo": session.did,
                "collection": "app.bsky.feed.post",
                "record": record,
            }))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(post_id = %post.id, error = %e, "bluesky publish failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(post_id = %post.id, status = %response.status(), "bluesky publish rejected");
            return None;
        }

        match response.json::<CreateRecordResponse>().await {
            Ok(created) => Some(Delivery {
                url: Some(post_url(&session.handle, &created.uri)),
                platform_post_id: created.uri,
                cid: Some(created.cid),
                created_at: Some(now.timestamp()),
            }),
            Err(e) => {
                warn!(post_id = %post.id, error = %e, "bluesky publish response malformed");
                None
            }
        }
    }

    async fn get_counts(&self, posts: &[Post]) -> HashMap<String, EngagementCounts> {
        // Only fully sent posts are looked up; a pending post keeps zero counts
        let mut by_user: HashMap<&str, Vec<&str>> = HashMap::new();
        for post in posts {
            if post.status != PostStatus::Sent {
                continue;
            }
            if let Some(uri) = post.bluesky_uri.as_deref() {
                by_user.entry(&post.user_id).or_default().push(uri);
            }
        }

        let mut counts = HashMap::new();
        for (user_id, uris) in by_user {
            let Some(session) = self.session(user_id).await else {
                continue;
            };

            let batches = uris
                .chunks(GET_POSTS_MAX)
                .map(|chunk| self.fetch_counts_batch(&session, chunk));
            for batch in futures::future::join_all(batches).await.into_iter().flatten() {
                for view in batch.posts {
                    let created_at = record_created_at(view.record.as_ref());
                    counts.insert(
                        view.uri,
                        EngagementCounts {
                            replies: view.reply_count,
                            favorites: view.like_count,
                            reposts: view.repost_count,
                            created_at,
                        },
                    );
                }
            }
        }

        counts
    }
}
