//! Mock platform client for testing
//!
//! A configurable client that records calls and can be scripted to succeed or
//! fail, so dispatcher, enrichment, and service logic can be exercised without
//! credentials or network access.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::Result;
use crate::types::{Delivery, EngagementCounts, MediaRef, Platform, Post, PostStatus};

use super::{ConnectParams, PlatformClient};

pub struct MockClient {
    platform: Platform,
    send_succeeds: AtomicBool,
    upload_succeeds: AtomicBool,
    max_media_bytes: u64,
    image_only: bool,
    send_calls: Mutex<Vec<String>>,
    upload_calls: AtomicUsize,
    count_calls: AtomicUsize,
    counts: Mutex<HashMap<String, EngagementCounts>>,
    connected: Mutex<Vec<String>>,
}

impl MockClient {
    /// A client where every operation succeeds
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            send_succeeds: AtomicBool::new(true),
            upload_succeeds: AtomicBool::new(true),
            max_media_bytes: 40 * 1024 * 1024,
            image_only: false,
            send_calls: Mutex::new(Vec::new()),
            upload_calls: AtomicUsize::new(0),
            count_calls: AtomicUsize::new(0),
            counts: Mutex::new(HashMap::new()),
            connected: Mutex::new(Vec::new()),
        }
    }

    /// A client whose sends and uploads fail (credential missing, upstream down)
    pub fn failing(platform: Platform) -> Self {
        let client = Self::new(platform);
        client.send_succeeds.store(false, Ordering::Relaxed);
        client.upload_succeeds.store(false, Ordering::Relaxed);
        client
    }

    pub fn with_max_media_bytes(mut self, bytes: u64) -> Self {
        self.max_media_bytes = bytes;
        self
    }

    pub fn image_only(mut self) -> Self {
        self.image_only = true;
        self
    }

    /// Pre-load the counts returned by `get_counts`, keyed by platform post id
    pub fn with_counts(self, counts: HashMap<String, EngagementCounts>) -> Self {
        *self.counts.lock().unwrap() = counts;
        self
    }

    /// Flip send behavior mid-test (e.g. recover after a failed tick)
    pub fn set_send_succeeds(&self, succeeds: bool) {
        self.send_succeeds.store(succeeds, Ordering::Relaxed);
    }

    pub fn send_call_count(&self) -> usize {
        self.send_calls.lock().unwrap().len()
    }

    /// IDs of the posts handed to `send_post`, in call order
    pub fn sent_post_ids(&self) -> Vec<String> {
        self.send_calls.lock().unwrap().clone()
    }

    pub fn upload_call_count(&self) -> usize {
        self.upload_calls.load(Ordering::Relaxed)
    }

    pub fn count_call_count(&self) -> usize {
        self.count_calls.load(Ordering::Relaxed)
    }

    pub fn connected_users(&self) -> Vec<String> {
        self.connected.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlatformClient for MockClient {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn max_media_bytes(&self) -> u64 {
        self.max_media_bytes
    }

    fn accepts_mime(&self, mime: &str) -> bool {
        if self.image_only {
            mime.starts_with("image/")
        } else {
            true
        }
    }

    async fn connect(&self, user_id: &str, _params: &ConnectParams) -> Result<()> {
        self.connected.lock().unwrap().push(user_id.to_string());
        Ok(())
    }

    async fn upload_media(
        &self,
        _user_id: &str,
        _bytes: Vec<u8>,
        _mime: &str,
        _file_name: &str,
    ) -> Option<MediaRef> {
        let n = self.upload_calls.fetch_add(1, Ordering::Relaxed);

        if !self.upload_succeeds.load(Ordering::Relaxed) {
            return None;
        }

        Some(match self.platform {
            Platform::Mastodon => MediaRef::Mastodon {
                id: format!("mock-media-{}", n),
                preview_url: None,
            },
            Platform::Bluesky => MediaRef::Bluesky {
                blob: serde_json::json!({ "$type": "blob", "ref": format!("mock-blob-{}", n) }),
            },
        })
    }

    async fn send_post(&self, post: &Post) -> Option<Delivery> {
        self.send_calls.lock().unwrap().push(post.id.clone());

        if !self.send_succeeds.load(Ordering::Relaxed) {
            return None;
        }

        let id = format!("{}-{}", self.platform, post.id);
        Some(Delivery {
            platform_post_id: id.clone(),
            cid: match self.platform {
                Platform::Bluesky => Some("mock-cid".to_string()),
                Platform::Mastodon => None,
            },
            url: Some(format!("https://example.invalid/{}", id)),
            created_at: Some(chrono::Utc::now().timestamp()),
        })
    }

    async fn get_counts(&self, posts: &[Post]) -> HashMap<String, EngagementCounts> {
        self.count_calls.fetch_add(1, Ordering::Relaxed);

        let canned = self.counts.lock().unwrap();
        posts
            .iter()
            .filter(|p| p.status == PostStatus::Sent)
            .filter_map(|p| p.delivery_id(self.platform))
            .filter_map(|id| canned.get(id).map(|c| (id.to_string(), c.clone())))
            .collect()
    }
}
