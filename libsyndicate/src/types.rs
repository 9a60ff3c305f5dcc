//! Core types for Syndicate

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// A platform posts can be delivered to
///
/// The set is closed: adding a platform means adding a client implementation,
/// delivery columns, and an integration flag, so there is no dynamic registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Mastodon,
    Bluesky,
}

impl Platform {
    /// All supported platforms, in stable dispatch/enrichment order
    pub const ALL: [Platform; 2] = [Platform::Mastodon, Platform::Bluesky];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Mastodon => "mastodon",
            Platform::Bluesky => "bluesky",
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mastodon" => Ok(Platform::Mastodon),
            "bluesky" => Ok(Platform::Bluesky),
            _ => Err(format!(
                "Unknown platform: '{}'. Valid options: mastodon, bluesky",
                s
            )),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Pending,
    Sent,
    Canceled,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Pending => "pending",
            PostStatus::Sent => "sent",
            PostStatus::Canceled => "canceled",
        }
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "pending" => Ok(PostStatus::Pending),
            "sent" => Ok(PostStatus::Sent),
            "canceled" => Ok(PostStatus::Canceled),
            _ => Err(format!("Unknown post status: '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            _ => Err(format!("Unknown visibility: '{}'", s)),
        }
    }
}

/// Derive the stored status for a post from its schedule and any explicit request
///
/// Explicit `canceled` and `draft` requests always win. Otherwise a post with a
/// schedule becomes `pending` (eligible for dispatch) and one without stays `draft`.
pub fn derive_status(has_schedule: bool, requested: Option<PostStatus>) -> PostStatus {
    match requested {
        Some(PostStatus::Canceled) => PostStatus::Canceled,
        Some(PostStatus::Draft) => PostStatus::Draft,
        _ => {
            if has_schedule {
                PostStatus::Pending
            } else {
                PostStatus::Draft
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub visibility: Visibility,
    /// Mastodon media attachment ids, uploaded ahead of publishing
    pub media_ids: Vec<String>,
    /// Bluesky blob refs as returned by the upload endpoint
    pub bluesky_media: Vec<serde_json::Value>,
    /// Target platforms; empty means the default target set
    pub platforms: Vec<Platform>,
    pub status: PostStatus,
    pub scheduled_time: Option<i64>,
    pub created_at: Option<i64>,
    // Per-platform delivery records. The id field being set means delivered.
    pub mastodon_id: Option<String>,
    pub mastodon_url: Option<String>,
    pub bluesky_uri: Option<String>,
    pub bluesky_cid: Option<String>,
    pub bluesky_url: Option<String>,
}

impl Post {
    pub fn new(user_id: String, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            content,
            visibility: Visibility::Public,
            media_ids: Vec::new(),
            bluesky_media: Vec::new(),
            platforms: Vec::new(),
            status: PostStatus::Draft,
            scheduled_time: None,
            created_at: Some(chrono::Utc::now().timestamp()),
            mastodon_id: None,
            mastodon_url: None,
            bluesky_uri: None,
            bluesky_cid: None,
            bluesky_url: None,
        }
    }

    /// The platforms this post should be delivered to
    ///
    /// An empty stored list falls back to Mastodon, the historical default.
    pub fn target_platforms(&self) -> Vec<Platform> {
        if self.platforms.is_empty() {
            vec![Platform::Mastodon]
        } else {
            self.platforms.clone()
        }
    }

    /// The platform-native post id, if this post was delivered there
    pub fn delivery_id(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Mastodon => self.mastodon_id.as_deref(),
            Platform::Bluesky => self.bluesky_uri.as_deref(),
        }
    }

    pub fn is_delivered(&self, platform: Platform) -> bool {
        self.delivery_id(platform).is_some()
    }
}

/// A successful publish on one platform
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Platform-native post id (Mastodon status id, Bluesky AT URI)
    pub platform_post_id: String,
    /// Content hash, Bluesky only
    pub cid: Option<String>,
    /// Human-facing permalink
    pub url: Option<String>,
    pub created_at: Option<i64>,
}

/// Partial update of a post's delivery columns
///
/// Only the fields that are `Some` are written, so a Mastodon delivery can
/// never clobber Bluesky columns and vice versa.
#[derive(Debug, Clone, Default)]
pub struct DeliveryUpdate {
    pub mastodon_id: Option<String>,
    pub mastodon_url: Option<String>,
    pub bluesky_uri: Option<String>,
    pub bluesky_cid: Option<String>,
    pub bluesky_url: Option<String>,
}

impl DeliveryUpdate {
    /// Build the column update for a delivery on the given platform
    pub fn for_platform(platform: Platform, delivery: &Delivery) -> Self {
        match platform {
            Platform::Mastodon => Self {
                mastodon_id: Some(delivery.platform_post_id.clone()),
                mastodon_url: delivery.url.clone(),
                ..Default::default()
            },
            Platform::Bluesky => Self {
                bluesky_uri: Some(delivery.platform_post_id.clone()),
                bluesky_cid: delivery.cid.clone(),
                bluesky_url: delivery.url.clone(),
                ..Default::default()
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mastodon_id.is_none()
            && self.mastodon_url.is_none()
            && self.bluesky_uri.is_none()
            && self.bluesky_cid.is_none()
            && self.bluesky_url.is_none()
    }
}

/// Engagement metrics for one platform-native post
#[derive(Debug, Clone, Default)]
pub struct EngagementCounts {
    pub replies: i64,
    pub favorites: i64,
    pub reposts: i64,
    pub created_at: Option<i64>,
}

/// A post decorated with aggregated engagement counts for read responses
#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub replies_count: i64,
    pub favorites_count: i64,
    pub reposts_count: i64,
}

impl PostView {
    pub fn new(post: Post) -> Self {
        Self {
            post,
            replies_count: 0,
            favorites_count: 0,
            reposts_count: 0,
        }
    }
}

/// Aggregate post counts for a listing response
#[derive(Debug, Clone, Default, Serialize)]
pub struct PostStats {
    pub total: i64,
    pub sent: i64,
    pub pending: i64,
    pub canceled: i64,
}

/// A Bluesky session pair, refreshable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueskySession {
    pub did: String,
    pub handle: String,
    pub access_jwt: String,
    pub refresh_jwt: String,
    /// Access token expiry (epoch seconds), decoded from the JWT
    pub expires_at: Option<i64>,
}

/// Stored credentials for one (user, platform) pair
#[derive(Debug, Clone)]
pub enum Credential {
    /// Static bearer token obtained from the instance's OAuth flow
    Mastodon { access_token: String },
    Bluesky(BlueskySession),
}

impl Credential {
    pub fn platform(&self) -> Platform {
        match self {
            Credential::Mastodon { .. } => Platform::Mastodon,
            Credential::Bluesky(_) => Platform::Bluesky,
        }
    }
}

/// Per-deployment integration flags
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IntegrationFlags {
    pub mastodon_enabled: bool,
    pub bluesky_enabled: bool,
}

impl IntegrationFlags {
    pub fn enabled(&self, platform: Platform) -> bool {
        match platform {
            Platform::Mastodon => self.mastodon_enabled,
            Platform::Bluesky => self.bluesky_enabled,
        }
    }
}

impl Default for IntegrationFlags {
    fn default() -> Self {
        Self {
            mastodon_enabled: true,
            bluesky_enabled: true,
        }
    }
}

/// A reference to media uploaded to one platform
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum MediaRef {
    Mastodon {
        id: String,
        preview_url: Option<String>,
    },
    Bluesky {
        blob: serde_json::Value,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// The authenticated identity an operation runs as
///
/// Authentication itself lives outside this crate; callers hand us the
/// already-verified identity.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
}

impl Caller {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::User,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_from_str() {
        assert_eq!("mastodon".parse::<Platform>().unwrap(), Platform::Mastodon);
        assert_eq!("bluesky".parse::<Platform>().unwrap(), Platform::Bluesky);
        assert_eq!("Mastodon".parse::<Platform>().unwrap(), Platform::Mastodon);
        assert!("threads".parse::<Platform>().is_err());
    }

    #[test]
    fn test_platform_display() {
        assert_eq!(Platform::Mastodon.to_string(), "mastodon");
        assert_eq!(Platform::Bluesky.to_string(), "bluesky");
    }

    #[test]
    fn test_post_status_round_trip() {
        for status in [
            PostStatus::Draft,
            PostStatus::Pending,
            PostStatus::Sent,
            PostStatus::Canceled,
        ] {
            assert_eq!(status.as_str().parse::<PostStatus>().unwrap(), status);
        }
        assert!("posted".parse::<PostStatus>().is_err());
    }

    #[test]
    fn test_derive_status_schedule_wins() {
        assert_eq!(derive_status(true, None), PostStatus::Pending);
        assert_eq!(derive_status(false, None), PostStatus::Draft);
        assert_eq!(derive_status(true, Some(PostStatus::Pending)), PostStatus::Pending);
        // A pending request without a schedule still lands as draft
        assert_eq!(derive_status(false, Some(PostStatus::Pending)), PostStatus::Draft);
    }

    #[test]
    fn test_derive_status_explicit_requests_win() {
        assert_eq!(
            derive_status(true, Some(PostStatus::Canceled)),
            PostStatus::Canceled
        );
        assert_eq!(derive_status(true, Some(PostStatus::Draft)), PostStatus::Draft);
        assert_eq!(
            derive_status(false, Some(PostStatus::Canceled)),
            PostStatus::Canceled
        );
    }

    #[test]
    fn test_post_new_defaults() {
        let post = Post::new("user-1".to_string(), "Hello".to_string());

        assert!(uuid::Uuid::parse_str(&post.id).is_ok());
        assert_eq!(post.user_id, "user-1");
        assert_eq!(post.status, PostStatus::Draft);
        assert_eq!(post.visibility, Visibility::Public);
        assert!(post.created_at.is_some());
        assert!(post.scheduled_time.is_none());
        assert!(post.mastodon_id.is_none());
        assert!(post.bluesky_uri.is_none());
    }

    #[test]
    fn test_target_platforms_default() {
        let post = Post::new("user-1".to_string(), "Hello".to_string());
        assert_eq!(post.target_platforms(), vec![Platform::Mastodon]);

        let mut post = post;
        post.platforms = vec![Platform::Bluesky];
        assert_eq!(post.target_platforms(), vec![Platform::Bluesky]);
    }

    #[test]
    fn test_delivery_id_per_platform() {
        let mut post = Post::new("user-1".to_string(), "Hello".to_string());
        post.mastodon_id = Some("123".to_string());

        assert_eq!(post.delivery_id(Platform::Mastodon), Some("123"));
        assert_eq!(post.delivery_id(Platform::Bluesky), None);
        assert!(post.is_delivered(Platform::Mastodon));
        assert!(!post.is_delivered(Platform::Bluesky));
    }

    #[test]
    fn test_delivery_update_for_mastodon() {
        let delivery = Delivery {
            platform_post_id: "123".to_string(),
            cid: None,
            url: Some("https://fosstodon.org/@a/123".to_string()),
            created_at: Some(1_700_000_000),
        };
        let update = DeliveryUpdate::for_platform(Platform::Mastodon, &delivery);

        assert_eq!(update.mastodon_id, Some("123".to_string()));
        assert_eq!(update.mastodon_url, delivery.url);
        assert!(update.bluesky_uri.is_none());
        assert!(update.bluesky_cid.is_none());
        assert!(!update.is_empty());
    }

    #[test]
    fn test_delivery_update_for_bluesky() {
        let delivery = Delivery {
            platform_post_id: "at://did:plc:abc/app.bsky.feed.post/xyz".to_string(),
            cid: Some("bafy123".to_string()),
            url: Some("https://bsky.app/profile/a.bsky.social/post/xyz".to_string()),
            created_at: None,
        };
        let update = DeliveryUpdate::for_platform(Platform::Bluesky, &delivery);

        assert_eq!(update.bluesky_uri.as_deref(), Some("at://did:plc:abc/app.bsky.feed.post/xyz"));
        assert_eq!(update.bluesky_cid, Some("bafy123".to_string()));
        assert!(update.mastodon_id.is_none());
        assert!(update.mastodon_url.is_none());
    }

    #[test]
    fn test_integration_flags_default_and_lookup() {
        let flags = IntegrationFlags::default();
        assert!(flags.enabled(Platform::Mastodon));
        assert!(flags.enabled(Platform::Bluesky));

        let flags = IntegrationFlags {
            mastodon_enabled: true,
            bluesky_enabled: false,
        };
        assert!(flags.enabled(Platform::Mastodon));
        assert!(!flags.enabled(Platform::Bluesky));
    }

    #[test]
    fn test_caller_roles() {
        assert!(!Caller::user("u1").is_admin());
        assert!(Caller::admin("a1").is_admin());
    }

    #[test]
    fn test_post_view_zero_initialized() {
        let view = PostView::new(Post::new("user-1".to_string(), "Hello".to_string()));
        assert_eq!(view.replies_count, 0);
        assert_eq!(view.favorites_count, 0);
        assert_eq!(view.reposts_count, 0);
    }

    #[test]
    fn test_post_serialization_round_trip() {
        let mut post = Post::new("user-1".to_string(), "Hello".to_string());
        post.platforms = vec![Platform::Mastodon, Platform::Bluesky];
        post.status = PostStatus::Pending;

        let json = serde_json::to_string(&post).unwrap();
        assert!(json.contains(r#""status":"pending""#));
        assert!(json.contains(r#""platforms":["mastodon","bluesky"]"#));

        let back: Post = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, post.id);
        assert_eq!(back.platforms, post.platforms);
        assert_eq!(back.status, post.status);
    }
}
