//! Autopilot and repost planning against a real database

use libshopcast::generation::mock::MockCaptionGenerator;
use libshopcast::planner::{
    generate_reposts, run_autopilot, AutopilotOutcome, DirectGenerator, RepostRequest,
};
use libshopcast::{
    AutopilotSettings, Config, Database, Platform, PostStatus, Product, Published, ScheduledPost,
};
use tempfile::TempDir;

const NOW: i64 = 1_750_000_000;
const DAY: i64 = 86_400;

async fn setup() -> (TempDir, Database, Config) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("planner.db");
    let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
    let config = Config::with_database(db_path.to_str().unwrap());
    (temp_dir, db, config)
}

async fn seed_products(db: &Database) {
    for (id, name) in [("linen-shirt", "Linen Shirt"), ("straw-hat", "Straw Hat")] {
        db.upsert_product(&Product {
            id: id.to_string(),
            name: name.to_string(),
            category: "Summer".to_string(),
            slug: id.to_string(),
            image_url: Some(format!("https://cdn.example.com/{}.jpg", id)),
            active: true,
        })
        .await
        .unwrap();
    }
}

async fn posted(db: &Database, product_id: &str, posted_at: i64) -> ScheduledPost {
    let mut post = ScheduledPost::new(Platform::Instagram, "Back in stock".to_string(), posted_at);
    post.product_id = Some(product_id.to_string());
    post.hashtags = vec!["linen".to_string()];
    db.create_post(&post).await.unwrap();
    db.claim_post(&post.id, posted_at, posted_at + 600).await.unwrap();
    db.mark_posted(
        &post.id,
        &Published {
            external_id: format!("ig-{}", post.id),
            permalink: "https://www.instagram.com/p/x/".to_string(),
        },
        posted_at,
    )
    .await
    .unwrap();
    post
}

#[tokio::test]
async fn test_autopilot_tops_up_to_target_then_stops() {
    let (_dir, db, config) = setup().await;
    seed_products(&db).await;

    for i in 0..10 {
        let scheduled_for = NOW + 3600 + i * 1800;
        let post = ScheduledPost::new(Platform::Instagram, format!("queued {}", i), scheduled_for);
        db.create_post(&post).await.unwrap();
    }

    let settings = AutopilotSettings {
        enabled: true,
        days_ahead: 7,
        posts_per_day: 2,
        platforms: vec!["instagram".to_string()],
        ..AutopilotSettings::default()
    };
    let mock = MockCaptionGenerator::new();
    let generator = DirectGenerator::new(&db, &mock, &config.shop);

    let outcome = run_autopilot(&db, &generator, &settings, false, NOW).await.unwrap();
    assert_eq!(
        outcome,
        AutopilotOutcome::ToppedUp {
            target: 14,
            current: 10,
            requested: 4,
            generated: 4,
            queue_size: 14,
        }
    );

    let queued = db
        .list_posts(Some(PostStatus::Queued), Some("instagram"), 50)
        .await
        .unwrap();
    assert_eq!(queued.len(), 14);
    assert!(queued
        .iter()
        .all(|p| p.scheduled_for >= NOW && p.scheduled_for <= NOW + 7 * DAY));

    let again = run_autopilot(&db, &generator, &settings, false, NOW).await.unwrap();
    assert_eq!(again.generated(), 0);
    assert_eq!(
        again,
        AutopilotOutcome::Satisfied {
            target: 14,
            current: 14
        }
    );

    let runs = db.autopilot_runs(10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].generated, 4);
}

#[tokio::test]
async fn test_autopilot_drafts_count_toward_window() {
    let (_dir, db, config) = setup().await;
    seed_products(&db).await;

    let settings = AutopilotSettings {
        enabled: true,
        days_ahead: 2,
        posts_per_day: 1,
        platforms: vec!["pinterest".to_string()],
        ..AutopilotSettings::default()
    };
    let mock = MockCaptionGenerator::new();
    let generator = DirectGenerator::new(&db, &mock, &config.shop);

    let outcome = run_autopilot(&db, &generator, &settings, true, NOW).await.unwrap();
    assert_eq!(outcome.generated(), 2);

    let drafts = db.list_posts(Some(PostStatus::Draft), None, 10).await.unwrap();
    assert_eq!(drafts.len(), 2);
    assert!(drafts.iter().all(|p| p.platform == "pinterest"));

    let again = run_autopilot(&db, &generator, &settings, true, NOW).await.unwrap();
    assert_eq!(again.generated(), 0);
}

#[tokio::test]
async fn test_reposts_one_per_product() {
    let (_dir, db, config) = setup().await;
    seed_products(&db).await;

    let old = NOW - 60 * DAY;
    let first = posted(&db, "linen-shirt", old).await;
    posted(&db, "linen-shirt", old + 10).await;
    posted(&db, "straw-hat", old + 20).await;
    posted(&db, "straw-hat", NOW - DAY).await;

    let request = RepostRequest {
        count: 5,
        platforms: vec![Platform::Instagram, Platform::Pinterest],
        tone: "casual".to_string(),
        min_days_old: 30,
        preview: false,
        start: NOW,
    };
    let report = generate_reposts(&db, &config.shop, &request).await.unwrap();

    assert_eq!(report.selected, 2);
    assert_eq!(report.posts.len(), 4);
    assert!(report.persisted);

    let products: std::collections::HashSet<_> = report
        .posts
        .iter()
        .filter(|p| p.platform == "instagram")
        .filter_map(|p| p.product_id.clone())
        .collect();
    assert_eq!(products.len(), 2);

    let linen = report
        .posts
        .iter()
        .find(|p| p.product_id.as_deref() == Some("linen-shirt"))
        .unwrap();
    assert!(linen.is_repost);
    assert_eq!(linen.source_post_id.as_deref(), Some(first.id.as_str()));
    assert_eq!(linen.hashtags, vec!["linen".to_string()]);

    let queued = db.list_posts(Some(PostStatus::Queued), None, 20).await.unwrap();
    assert_eq!(queued.len(), 4);
    assert!(queued.iter().all(|p| p.scheduled_for > NOW));
}

#[tokio::test]
async fn test_repost_preview_leaves_queue_untouched() {
    let (_dir, db, config) = setup().await;
    seed_products(&db).await;
    posted(&db, "straw-hat", NOW - 40 * DAY).await;

    let request = RepostRequest {
        count: 1,
        platforms: vec![Platform::Facebook],
        tone: "playful".to_string(),
        min_days_old: 30,
        preview: true,
        start: NOW,
    };
    let report = generate_reposts(&db, &config.shop, &request).await.unwrap();

    assert_eq!(report.posts.len(), 1);
    assert!(!report.persisted);
    assert!(report.posts[0]
        .caption
        .contains(&config.shop.product_link("straw-hat")));
    assert!(db
        .list_posts(Some(PostStatus::Queued), None, 10)
        .await
        .unwrap()
        .is_empty());
}
