//! Dispatcher against mock platform APIs
//!
//! Publishers are built from stored tokens exactly as `shop-send` builds
//! them, with base URLs pointing at a wiremock server.

use libshopcast::config::Config;
use libshopcast::platforms::{create_publishers, Publishers};
use libshopcast::{
    Database, DispatchStatus, Dispatcher, Platform, PlatformToken, PostStatus, ScheduledPost,
};
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NOW: i64 = 1_750_000_000;

async fn setup(server: &MockServer) -> (TempDir, Database, Config) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("dispatch.db");
    let db = Database::new(db_path.to_str().unwrap()).await.unwrap();

    let mut config = Config::with_database(db_path.to_str().unwrap());
    config.instagram.graph_base_url = server.uri();
    config.instagram.account_id = Some("1784".to_string());
    config.instagram.poll_interval_ms = 0;
    config.facebook.graph_base_url = server.uri();
    config.facebook.page_id = Some("page-1".to_string());
    config.pinterest.api_base_url = server.uri();
    config.pinterest.default_board_id = Some("board-1".to_string());

    for platform in Platform::ALL {
        db.save_token(platform, &PlatformToken::new(format!("{}-token", platform)))
            .await
            .unwrap();
    }
    (temp_dir, db, config)
}

async fn publishers(db: &Database, config: &Config) -> Publishers {
    let credentials = db.load_credentials(&Platform::ALL, NOW).await.unwrap();
    create_publishers(config, credentials).unwrap()
}

async fn queue(db: &Database, platform: Platform, images: usize) -> ScheduledPost {
    let mut post = ScheduledPost::new(platform, "Linen season is here".to_string(), NOW - 60);
    post.hashtags = vec!["linen".to_string()];
    post.link = Some("https://shop.example.com/products/linen-shirt".to_string());
    post.media_urls = (0..images)
        .map(|i| format!("https://cdn.example.com/linen-{}.jpg", i))
        .collect();
    db.create_post(&post).await.unwrap();
    post
}

async fn mount_container_status(server: &MockServer, container: &str, status: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/{}", container)))
        .and(query_param("fields", "status_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status_code": status,
            "id": container
        })))
        .mount(server)
        .await;
}

async fn mount_publish(server: &MockServer, media_id: &str) {
    Mock::given(method("POST"))
        .and(path("/1784/media_publish"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": media_id })),
        )
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/{}", media_id)))
        .and(query_param("fields", "permalink"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "permalink": format!("https://www.instagram.com/p/{}/", media_id)
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_instagram_single_image() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1784/media"))
        .and(body_string_contains("image_url=https%3A%2F%2Fcdn.example.com%2Flinen-0.jpg"))
        .and(body_string_contains("access_token=instagram-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "c-1" })))
        .expect(1)
        .mount(&server)
        .await;
    mount_container_status(&server, "c-1", "FINISHED").await;
    mount_publish(&server, "m-1").await;

    let (_dir, db, config) = setup(&server).await;
    let post = queue(&db, Platform::Instagram, 1).await;
    let publishers = publishers(&db, &config).await;

    let result = Dispatcher::new(&db, &publishers, &config.shop)
        .process_due(NOW)
        .await
        .unwrap();
    assert_eq!(result.posted, 1);

    let stored = db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Posted);
    assert_eq!(stored.external_id.as_deref(), Some("m-1"));
    assert_eq!(stored.permalink.as_deref(), Some("https://www.instagram.com/p/m-1/"));
    assert_eq!(stored.posted_at, Some(NOW));
}

#[tokio::test]
async fn test_container_that_never_finishes_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1784/media"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "c-slow" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/c-slow"))
        .and(query_param("fields", "status_code"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "status_code": "IN_PROGRESS" })),
        )
        .expect(30)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/1784/media_publish"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (_dir, db, config) = setup(&server).await;
    let post = queue(&db, Platform::Instagram, 1).await;
    let publishers = publishers(&db, &config).await;

    let result = Dispatcher::new(&db, &publishers, &config.shop)
        .process_due(NOW)
        .await
        .unwrap();
    assert_eq!(result.failed, 1);

    let stored = db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Failed);
    assert!(stored.external_id.is_none());
    let message = stored.error_message.unwrap();
    assert!(message.contains("timed out"), "unexpected error: {}", message);
    assert!(message.contains("c-slow"));
}

#[tokio::test]
async fn test_container_error_status_fails_post() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1784/media"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "c-bad" })),
        )
        .mount(&server)
        .await;
    mount_container_status(&server, "c-bad", "ERROR").await;

    let (_dir, db, config) = setup(&server).await;
    let post = queue(&db, Platform::Instagram, 1).await;
    let publishers = publishers(&db, &config).await;

    Dispatcher::new(&db, &publishers, &config.shop)
        .process_due(NOW)
        .await
        .unwrap();

    let stored = db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Failed);
    assert!(stored.error_message.unwrap().contains("ERROR"));
}

#[tokio::test]
async fn test_carousel_publishes_children_then_parent() {
    let server = MockServer::start().await;
    for i in 0..3 {
        Mock::given(method("POST"))
            .and(path("/1784/media"))
            .and(body_string_contains(format!("linen-{}.jpg", i)))
            .and(body_string_contains("is_carousel_item=true"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": format!("child-{}", i) })),
            )
            .expect(1)
            .mount(&server)
            .await;
        mount_container_status(&server, &format!("child-{}", i), "FINISHED").await;
    }
    Mock::given(method("POST"))
        .and(path("/1784/media"))
        .and(body_string_contains("media_type=CAROUSEL"))
        .and(body_string_contains("children=child-0%2Cchild-1%2Cchild-2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "parent" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_container_status(&server, "parent", "FINISHED").await;
    mount_publish(&server, "m-carousel").await;

    let (_dir, db, config) = setup(&server).await;
    let post = queue(&db, Platform::Instagram, 3).await;
    let publishers = publishers(&db, &config).await;

    let result = Dispatcher::new(&db, &publishers, &config.shop)
        .process_due(NOW)
        .await
        .unwrap();
    assert_eq!(result.posted, 1);
    assert_eq!(
        db.get_post(&post.id).await.unwrap().unwrap().external_id.as_deref(),
        Some("m-carousel")
    );
}

#[tokio::test]
async fn test_failed_carousel_child_fails_whole_post() {
    let server = MockServer::start().await;
    for (i, status) in ["FINISHED", "ERROR", "FINISHED"].into_iter().enumerate() {
        Mock::given(method("POST"))
            .and(path("/1784/media"))
            .and(body_string_contains(format!("linen-{}.jpg", i)))
            .and(body_string_contains("is_carousel_item=true"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": format!("child-{}", i) })),
            )
            .mount(&server)
            .await;
        mount_container_status(&server, &format!("child-{}", i), status).await;
    }
    Mock::given(method("POST"))
        .and(path("/1784/media"))
        .and(body_string_contains("media_type=CAROUSEL"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "parent" })),
        )
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/1784/media_publish"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "m-x" })))
        .expect(0)
        .mount(&server)
        .await;

    let (_dir, db, config) = setup(&server).await;
    let post = queue(&db, Platform::Instagram, 3).await;
    let publishers = publishers(&db, &config).await;

    let result = Dispatcher::new(&db, &publishers, &config.shop)
        .process_due(NOW)
        .await
        .unwrap();
    assert_eq!(result.failed, 1);
    assert_eq!(result.posted, 0);

    let stored = db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Failed);
    assert!(stored.external_id.is_none());
    assert!(stored.permalink.is_none());
    let message = stored.error_message.unwrap();
    assert!(message.contains("child-1"), "unexpected error: {}", message);
    assert!(message.contains("ERROR"));
}

#[tokio::test]
async fn test_carousel_size_is_checked_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (_dir, db, config) = setup(&server).await;
    let oversized = queue(&db, Platform::Instagram, 11).await;
    let publishers = publishers(&db, &config).await;

    let result = Dispatcher::new(&db, &publishers, &config.shop)
        .process_due(NOW)
        .await
        .unwrap();
    assert_eq!(result.failed, 1);
    let stored = db.get_post(&oversized.id).await.unwrap().unwrap();
    assert!(stored.error_message.unwrap().contains("got 11"));

    let instagram = libshopcast::platforms::instagram::InstagramPublisher::new(
        &config.instagram,
        PlatformToken::new("t"),
    )
    .unwrap();
    let single = vec!["https://cdn.example.com/only.jpg".to_string()];
    let err = instagram.publish_carousel(&single, "caption").await.unwrap_err();
    assert!(matches!(err, libshopcast::PlatformError::Validation(_)));
}

#[tokio::test]
async fn test_pinterest_and_facebook() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pins"))
        .and(body_string_contains("\"board_id\":\"board-1\""))
        .and(body_string_contains("\"link\":\"https://shop.example.com/products/linen-shirt\""))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": "pin-1" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/page-1/photos"))
        .and(body_string_contains("url=https%3A%2F%2Fcdn.example.com%2Flinen-0.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "photo-1",
            "post_id": "page-1_555"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, db, config) = setup(&server).await;
    let pin = queue(&db, Platform::Pinterest, 1).await;
    let fb = queue(&db, Platform::Facebook, 1).await;
    let publishers = publishers(&db, &config).await;

    let result = Dispatcher::new(&db, &publishers, &config.shop)
        .process_due(NOW)
        .await
        .unwrap();
    assert_eq!(result.posted, 2);

    let pin = db.get_post(&pin.id).await.unwrap().unwrap();
    assert_eq!(pin.permalink.as_deref(), Some("https://www.pinterest.com/pin/pin-1/"));
    let fb = db.get_post(&fb.id).await.unwrap().unwrap();
    assert_eq!(fb.external_id.as_deref(), Some("page-1_555"));
    assert_eq!(fb.permalink.as_deref(), Some("https://www.facebook.com/page-1_555"));
}

#[tokio::test]
async fn test_platform_error_message_is_kept_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pins"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "code": 1,
            "message": "Invalid board_id: board-1 not found"
        })))
        .mount(&server)
        .await;

    let (_dir, db, config) = setup(&server).await;
    let post = queue(&db, Platform::Pinterest, 1).await;
    let publishers = publishers(&db, &config).await;

    Dispatcher::new(&db, &publishers, &config.shop)
        .process_due(NOW)
        .await
        .unwrap();

    let stored = db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Failed);
    assert!(stored
        .error_message
        .unwrap()
        .contains("Invalid board_id: board-1 not found"));
}

#[tokio::test]
async fn test_concurrent_dispatchers_publish_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pins"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": "pin-once" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, db, config) = setup(&server).await;
    queue(&db, Platform::Pinterest, 1).await;
    let publishers = publishers(&db, &config).await;

    let first = Dispatcher::new(&db, &publishers, &config.shop);
    let second = Dispatcher::new(&db, &publishers, &config.shop);
    let (a, b) = tokio::join!(first.process_due(NOW), second.process_due(NOW));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.posted + b.posted, 1);
    let skipped_or_absent = a.outcomes.iter().chain(b.outcomes.iter()).all(|o| {
        matches!(o.status, DispatchStatus::Posted(_) | DispatchStatus::Skipped)
    });
    assert!(skipped_or_absent);
}

#[tokio::test]
async fn test_every_due_post_ends_posted_or_failed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pins"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": "pin-ok" })),
        )
        .mount(&server)
        .await;

    let (_dir, db, config) = setup(&server).await;
    queue(&db, Platform::Pinterest, 1).await;
    queue(&db, Platform::Pinterest, 0).await;
    let mut unknown = ScheduledPost::new(Platform::Pinterest, "?".to_string(), NOW - 5);
    unknown.platform = "tiktok".to_string();
    db.create_post(&unknown).await.unwrap();
    let publishers = publishers(&db, &config).await;

    Dispatcher::new(&db, &publishers, &config.shop)
        .process_due(NOW)
        .await
        .unwrap();

    assert!(db
        .list_posts(Some(PostStatus::Queued), None, 10)
        .await
        .unwrap()
        .is_empty());
    assert!(db
        .list_posts(Some(PostStatus::Processing), None, 10)
        .await
        .unwrap()
        .is_empty());
}
