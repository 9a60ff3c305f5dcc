//! Integration tests for the synd-send daemon

use assert_cmd::Command;
use libsyndicate::types::PostStatus;
use libsyndicate::{Database, Post};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Setup test environment with config and database
async fn setup_test_env() -> (TempDir, String, String) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("test.db");

    let config_content = format!(
        r#"
[database]
path = "{}"

[dispatch]
poll_interval = 1
"#,
        db_path.display().to_string().replace('\\', "/")
    );

    fs::write(&config_path, config_content).unwrap();

    // Initialize database
    let _db = Database::new(db_path.to_str().unwrap()).await.unwrap();

    (
        temp_dir,
        config_path.to_str().unwrap().to_string(),
        db_path.to_str().unwrap().to_string(),
    )
}

/// Create a pending post that is due for dispatch
async fn create_due_post(db_path: &str) -> String {
    let db = Database::new(db_path).await.unwrap();
    let now = chrono::Utc::now().timestamp();

    let mut post = Post::new(
        uuid::Uuid::new_v4().to_string(),
        "Test scheduled post".to_string(),
    );
    post.status = PostStatus::Pending;
    post.scheduled_time = Some(now - 10);

    let post_id = post.id.clone();
    db.create_post(&post).await.unwrap();
    post_id
}

#[tokio::test]
async fn test_daemon_starts_with_config() {
    let (_temp_dir, config_path, _db_path) = setup_test_env().await;

    let mut cmd = Command::cargo_bin("synd-send").unwrap();

    // --once exits after a single tick
    cmd.env("SYNDICATE_CONFIG", &config_path)
        .arg("--once")
        .assert()
        .success();
}

#[tokio::test]
async fn test_daemon_requires_valid_config() {
    let temp_dir = TempDir::new().unwrap();
    let invalid_config = temp_dir.path().join("invalid.toml");

    fs::write(&invalid_config, "invalid toml content [[[").unwrap();

    let mut cmd = Command::cargo_bin("synd-send").unwrap();

    cmd.env("SYNDICATE_CONFIG", invalid_config.to_str().unwrap())
        .arg("--once")
        .assert()
        .failure();
}

#[tokio::test]
async fn test_once_leaves_unconnected_post_pending() {
    let (_temp_dir, config_path, db_path) = setup_test_env().await;
    let post_id = create_due_post(&db_path).await;

    let mut cmd = Command::cargo_bin("synd-send").unwrap();
    cmd.env("SYNDICATE_CONFIG", &config_path)
        .arg("--once")
        .assert()
        .success();

    // No credentials exist, so the post must survive the tick untouched
    let db = Database::new(&db_path).await.unwrap();
    let post = db.get_post(&post_id).await.unwrap().unwrap();
    assert_eq!(post.status, PostStatus::Pending);
    assert!(post.mastodon_id.is_none());
}

#[tokio::test]
async fn test_verbose_flag_accepted() {
    let (_temp_dir, config_path, _db_path) = setup_test_env().await;

    let mut cmd = Command::cargo_bin("synd-send").unwrap();
    cmd.env("SYNDICATE_CONFIG", &config_path)
        .arg("--once")
        .arg("--verbose")
        .assert()
        .success();
}

#[test]
fn test_help_describes_daemon() {
    let mut cmd = Command::cargo_bin("synd-send").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("scheduled posting"));
}
