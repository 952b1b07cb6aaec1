//! Integration tests for shop-sync

use assert_cmd::Command;
use libshopcast::{Database, Platform, PlatformToken, PostStatus, Published, ScheduledPost};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn setup_test_env(graph_url: &str) -> (TempDir, String, Database) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("posts.db");

    let config_content = format!(
        r#"
[database]
path = "{}"

[instagram]
graph_base_url = "{}"
account_id = "1784"
"#,
        db_path.display().to_string().replace('\\', "/"),
        graph_url
    );
    fs::write(&config_path, config_content).unwrap();

    let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
    db.save_token(Platform::Instagram, &PlatformToken::new("ig-token"))
        .await
        .unwrap();
    (temp_dir, config_path.to_str().unwrap().to_string(), db)
}

async fn create_posted(db: &Database, media_id: &str) -> String {
    let posted_at = chrono::Utc::now().timestamp() - 86_400;
    let mut post = ScheduledPost::new(Platform::Instagram, "Linen".to_string(), posted_at);
    post.hashtags = vec!["linen".to_string()];
    db.create_post(&post).await.unwrap();
    db.claim_post(&post.id, posted_at, posted_at + 600).await.unwrap();
    db.mark_posted(
        &post.id,
        &Published {
            external_id: media_id.to_string(),
            permalink: format!("https://www.instagram.com/p/{}/", media_id),
        },
        posted_at,
    )
    .await
    .unwrap();
    post.id
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sync_is_idempotent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/1789"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "1789",
            "like_count": 40,
            "comments_count": 6,
            "permalink": "https://www.instagram.com/p/abc/"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/1789/insights"))
        .and(query_param("metric", "impressions,reach,saved"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {"name": "impressions", "values": [{"value": 1500}]},
                {"name": "reach", "values": [{"value": 1000}]},
                {"name": "saved", "values": [{"value": 4}]}
            ]
        })))
        .mount(&server)
        .await;

    let (_temp_dir, config_path, db) = setup_test_env(&server.uri()).await;
    let post_id = create_posted(&db, "1789").await;

    for _ in 0..2 {
        Command::cargo_bin("shop-sync")
            .unwrap()
            .env("SHOPCAST_CONFIG", &config_path)
            .arg("--all")
            .assert()
            .success()
            .stdout(predicate::str::contains("checked 1, updated 1, failed 0, deleted 0"));

        let post = db.get_post(&post_id).await.unwrap().unwrap();
        assert_eq!(post.engagement.likes, 40);
        assert_eq!(post.engagement.comments, 6);
        assert_eq!(post.engagement.saves, 4);
        assert_eq!(post.engagement.reach, 1000);
        assert!((post.engagement.engagement_rate - 5.0).abs() < 1e-9);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_deleted_media_marks_post_deleted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/999"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": {
                "message": "Unsupported get request. Object with ID '999' does not exist, cannot be loaded due to missing permissions, or does not support this operation",
                "type": "GraphMethodException",
                "code": 100,
                "error_subcode": 33
            }
        })))
        .mount(&server)
        .await;

    let (_temp_dir, config_path, db) = setup_test_env(&server.uri()).await;
    let post_id = create_posted(&db, "999").await;

    Command::cargo_bin("shop-sync")
        .unwrap()
        .env("SHOPCAST_CONFIG", &config_path)
        .args(["--post", &post_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("deleted 1"));

    let post = db.get_post(&post_id).await.unwrap().unwrap();
    assert_eq!(post.status, PostStatus::Deleted);
    assert_eq!(post.engagement.likes, 0);
    assert!(post.external_id.is_none());
}

#[tokio::test]
async fn test_single_post_must_exist() {
    let (_temp_dir, config_path, _db) = setup_test_env("http://127.0.0.1:9").await;

    Command::cargo_bin("shop-sync")
        .unwrap()
        .env("SHOPCAST_CONFIG", &config_path)
        .args(["--post", "no-such-post"])
        .assert()
        .failure()
        .code(3);
}
