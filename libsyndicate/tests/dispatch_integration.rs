//! Dispatcher integration tests using mock platform clients

use std::sync::Arc;

use libsyndicate::dispatch::Dispatcher;
use libsyndicate::platforms::mock::MockClient;
use libsyndicate::platforms::{PlatformClient, PlatformRegistry};
use libsyndicate::store::Database;
use libsyndicate::types::{IntegrationFlags, Platform, Post, PostStatus};

async fn test_db() -> Database {
    Database::new(":memory:").await.unwrap()
}

fn due_post(user: &str, platforms: Vec<Platform>) -> Post {
    let mut post = Post::new(user.to_string(), "Scheduled hello".to_string());
    post.status = PostStatus::Pending;
    post.scheduled_time = Some(chrono::Utc::now().timestamp() - 5);
    post.platforms = platforms;
    post
}

fn registry(mastodon: &Arc<MockClient>, bluesky: &Arc<MockClient>) -> PlatformRegistry {
    PlatformRegistry::with_clients(vec![
        mastodon.clone() as Arc<dyn PlatformClient>,
        bluesky.clone() as Arc<dyn PlatformClient>,
    ])
}

#[tokio::test]
async fn test_full_delivery_marks_sent() {
    let db = test_db().await;
    let mastodon = Arc::new(MockClient::new(Platform::Mastodon));
    let bluesky = Arc::new(MockClient::new(Platform::Bluesky));

    let post = due_post("user-1", vec![Platform::Mastodon, Platform::Bluesky]);
    db.create_post(&post).await.unwrap();

    let dispatcher = Dispatcher::new(db.clone(), registry(&mastodon, &bluesky));
    let sent = dispatcher.run_tick().await.unwrap();
    assert_eq!(sent, 1);

    let stored = db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Sent);
    assert!(stored.mastodon_id.is_some());
    assert!(stored.mastodon_url.is_some());
    assert!(stored.bluesky_uri.is_some());
    assert!(stored.bluesky_cid.is_some());
    assert_eq!(mastodon.send_call_count(), 1);
    assert_eq!(bluesky.send_call_count(), 1);
}

#[tokio::test]
async fn test_partial_delivery_then_recovery() {
    let db = test_db().await;
    let mastodon = Arc::new(MockClient::new(Platform::Mastodon));
    let bluesky = Arc::new(MockClient::failing(Platform::Bluesky));

    let post = due_post("user-1", vec![Platform::Mastodon, Platform::Bluesky]);
    db.create_post(&post).await.unwrap();

    let dispatcher = Dispatcher::new(db.clone(), registry(&mastodon, &bluesky));

    // First tick: Mastodon lands, Bluesky fails, post stays pending
    let sent = dispatcher.run_tick().await.unwrap();
    assert_eq!(sent, 0);

    let stored = db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Pending);
    assert!(stored.mastodon_id.is_some());
    assert!(stored.bluesky_uri.is_none());

    // Second tick after recovery: only the missing platform is attempted
    bluesky.set_send_succeeds(true);
    let sent = dispatcher.run_tick().await.unwrap();
    assert_eq!(sent, 1);

    let stored = db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Sent);
    assert!(stored.bluesky_uri.is_some());
    assert_eq!(mastodon.send_call_count(), 1, "no duplicate mastodon publish");
    assert_eq!(bluesky.send_call_count(), 2);
}

#[tokio::test]
async fn test_disabled_platform_is_skipped_silently() {
    let db = test_db().await;
    db.update_integrations(&IntegrationFlags {
        mastodon_enabled: true,
        bluesky_enabled: false,
    })
    .await
    .unwrap();

    let mastodon = Arc::new(MockClient::new(Platform::Mastodon));
    let bluesky = Arc::new(MockClient::new(Platform::Bluesky));

    let post = due_post("user-1", vec![Platform::Mastodon, Platform::Bluesky]);
    db.create_post(&post).await.unwrap();

    let dispatcher = Dispatcher::new(db.clone(), registry(&mastodon, &bluesky));
    let sent = dispatcher.run_tick().await.unwrap();
    assert_eq!(sent, 0);

    // Delivered where allowed, waiting where not
    let stored = db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Pending);
    assert!(stored.mastodon_id.is_some());
    assert!(stored.bluesky_uri.is_none());
    assert_eq!(bluesky.send_call_count(), 0);
}

#[tokio::test]
async fn test_sent_posts_are_not_reprocessed() {
    let db = test_db().await;
    let mastodon = Arc::new(MockClient::new(Platform::Mastodon));
    let bluesky = Arc::new(MockClient::new(Platform::Bluesky));

    let post = due_post("user-1", vec![Platform::Mastodon]);
    db.create_post(&post).await.unwrap();

    let dispatcher = Dispatcher::new(db.clone(), registry(&mastodon, &bluesky));
    assert_eq!(dispatcher.run_tick().await.unwrap(), 1);
    assert_eq!(dispatcher.run_tick().await.unwrap(), 0);
    assert_eq!(mastodon.send_call_count(), 1);
}

#[tokio::test]
async fn test_default_target_is_mastodon() {
    let db = test_db().await;
    let mastodon = Arc::new(MockClient::new(Platform::Mastodon));
    let bluesky = Arc::new(MockClient::new(Platform::Bluesky));

    // Empty platform list falls back to Mastodon only
    let post = due_post("user-1", Vec::new());
    db.create_post(&post).await.unwrap();

    let dispatcher = Dispatcher::new(db.clone(), registry(&mastodon, &bluesky));
    assert_eq!(dispatcher.run_tick().await.unwrap(), 1);

    let stored = db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Sent);
    assert!(stored.mastodon_id.is_some());
    assert!(stored.bluesky_uri.is_none());
    assert_eq!(bluesky.send_call_count(), 0);
}

#[tokio::test]
async fn test_predelivered_platform_is_not_resent() {
    let db = test_db().await;
    let mastodon = Arc::new(MockClient::new(Platform::Mastodon));
    let bluesky = Arc::new(MockClient::new(Platform::Bluesky));

    let mut post = due_post("user-1", vec![Platform::Mastodon, Platform::Bluesky]);
    post.mastodon_id = Some("already-there".to_string());
    db.create_post(&post).await.unwrap();

    let dispatcher = Dispatcher::new(db.clone(), registry(&mastodon, &bluesky));
    assert_eq!(dispatcher.run_tick().await.unwrap(), 1);

    let stored = db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Sent);
    assert_eq!(stored.mastodon_id, Some("already-there".to_string()));
    assert_eq!(mastodon.send_call_count(), 0);
    assert_eq!(bluesky.send_call_count(), 1);
}

#[tokio::test]
async fn test_drafts_and_future_posts_untouched() {
    let db = test_db().await;
    let mastodon = Arc::new(MockClient::new(Platform::Mastodon));
    let bluesky = Arc::new(MockClient::new(Platform::Bluesky));

    let draft = Post::new("user-1".to_string(), "Draft".to_string());
    db.create_post(&draft).await.unwrap();

    let mut future = due_post("user-1", vec![Platform::Mastodon]);
    future.scheduled_time = Some(chrono::Utc::now().timestamp() + 3600);
    db.create_post(&future).await.unwrap();

    let dispatcher = Dispatcher::new(db.clone(), registry(&mastodon, &bluesky));
    assert_eq!(dispatcher.run_tick().await.unwrap(), 0);
    assert_eq!(mastodon.send_call_count(), 0);
}

#[tokio::test]
async fn test_one_failing_post_does_not_block_others() {
    let db = test_db().await;
    let mastodon = Arc::new(MockClient::new(Platform::Mastodon));
    let bluesky = Arc::new(MockClient::failing(Platform::Bluesky));

    let stuck = due_post("user-1", vec![Platform::Bluesky]);
    let fine = due_post("user-2", vec![Platform::Mastodon]);
    db.create_post(&stuck).await.unwrap();
    db.create_post(&fine).await.unwrap();

    let dispatcher = Dispatcher::new(db.clone(), registry(&mastodon, &bluesky));
    assert_eq!(dispatcher.run_tick().await.unwrap(), 1);

    assert_eq!(
        db.get_post(&fine.id).await.unwrap().unwrap().status,
        PostStatus::Sent
    );
    assert_eq!(
        db.get_post(&stuck.id).await.unwrap().unwrap().status,
        PostStatus::Pending
    );
}
