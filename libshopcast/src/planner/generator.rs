//! Direct generator: fresh posts for catalog products

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::config::ShopConfig;
use crate::db::Database;
use crate::error::{Result, ShopcastError};
use crate::generation::{
    normalize_hashtags, CaptionGenerator, GenerationKind, GenerationRequest, LearningContext,
};
use crate::planner::slots::{daily_times, free_slots};
use crate::scheduling::parse_posting_times;
use crate::types::{Platform, PostStatus, Product, ScheduledPost};

const DEFAULT_TONE: &str = "casual";
const LEARNING_HASHTAGS: usize = 10;
/// Search horizon for slots when the request has no window end
const DEFAULT_HORIZON_SECS: i64 = 366 * 86_400;

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Posts to create on each platform
    pub count: usize,
    pub platforms: Vec<Platform>,
    /// Used round-robin
    pub tones: Vec<String>,
    pub posting_times: Vec<String>,
    /// Defaults to the number of posting times
    pub posts_per_day: Option<u32>,
    pub start: i64,
    pub window_end: Option<i64>,
    pub requires_approval: bool,
}

#[derive(Debug, Default)]
pub struct GenerationReport {
    pub created: Vec<ScheduledPost>,
    pub failed: usize,
    pub errors: Vec<String>,
}

pub struct DirectGenerator<'a> {
    db: &'a Database,
    generator: &'a dyn CaptionGenerator,
    shop: &'a ShopConfig,
}

impl<'a> DirectGenerator<'a> {
    pub fn new(
        db: &'a Database,
        generator: &'a dyn CaptionGenerator,
        shop: &'a ShopConfig,
    ) -> Self {
        Self { db, generator, shop }
    }

    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerationReport> {
        let times = parse_posting_times(&request.posting_times)?;
        let per_day = request.posts_per_day.map_or(times.len(), |n| n as usize);
        let daily = daily_times(&times, per_day);

        let mut report = GenerationReport::default();
        for &platform in &request.platforms {
            if request.count == 0 {
                continue;
            }
            self.generate_for(platform, request, &daily, &mut report).await?;
        }

        info!(
            created = report.created.len(),
            failed = report.failed,
            "Generation finished"
        );
        Ok(report)
    }

    async fn generate_for(
        &self,
        platform: Platform,
        request: &GenerateRequest,
        daily: &[chrono::NaiveTime],
        report: &mut GenerationReport,
    ) -> Result<()> {
        let products = self.db.eligible_products(platform, request.count).await?;
        if products.is_empty() {
            let message = format!("{}: no eligible products", platform);
            warn!("{}", message);
            report.errors.push(message);
            return Ok(());
        }

        let horizon = request.window_end.unwrap_or(request.start + DEFAULT_HORIZON_SECS);
        let mut occupied: HashSet<i64> = self
            .db
            .occupied_slots(platform, request.start, horizon)
            .await?
            .into_iter()
            .collect();
        let slots = free_slots(
            request.start,
            daily,
            &mut occupied,
            request.count,
            request.window_end,
        );
        if slots.len() < request.count {
            let message = format!(
                "{}: only {} free slots for {} requested posts",
                platform,
                slots.len(),
                request.count
            );
            warn!("{}", message);
            report.errors.push(message);
        }

        let learning = LearningContext {
            top_hashtags: self
                .db
                .top_hashtags(platform, LEARNING_HASHTAGS)
                .await?
                .into_iter()
                .map(|s| s.hashtag)
                .collect(),
        };

        for (i, slot) in slots.into_iter().enumerate() {
            let product = &products[i % products.len()];
            let tone = request
                .tones
                .get(i % request.tones.len().max(1))
                .map(String::as_str)
                .unwrap_or(DEFAULT_TONE);

            match self.compose(product, tone, platform, &learning).await {
                Ok((caption, hashtags)) => {
                    let mut post = ScheduledPost::new(platform, caption, slot);
                    post.hashtags = hashtags;
                    post.product_id = Some(product.id.clone());
                    post.asset_id = self.db.primary_asset(&product.id).await?.map(|a| a.id);
                    post.link = Some(self.shop.product_link(&product.slug));
                    post.tone = Some(tone.to_string());
                    if request.requires_approval {
                        post.status = PostStatus::Draft;
                    }

                    self.db.create_post(&post).await?;
                    debug!(
                        post_id = %post.id,
                        platform = %platform,
                        scheduled_for = slot,
                        "Created post"
                    );
                    report.created.push(post);
                }
                Err(e) => {
                    warn!(
                        product_id = %product.id,
                        platform = %platform,
                        error = %e,
                        "Skipping post"
                    );
                    report.failed += 1;
                    report.errors.push(format!("{} on {}: {}", product.id, platform, e));
                }
            }
        }

        Ok(())
    }

    async fn compose(
        &self,
        product: &Product,
        tone: &str,
        platform: Platform,
        learning: &LearningContext,
    ) -> Result<(String, Vec<String>)> {
        let caption = self
            .generator
            .generate(
                GenerationRequest::new(GenerationKind::Caption, product, tone, platform)
                    .with_learning(learning.clone()),
            )
            .await?
            .caption
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ShopcastError::Generation("empty caption".to_string()))?;

        let hashtags = self
            .generator
            .generate(
                GenerationRequest::new(GenerationKind::Hashtags, product, tone, platform)
                    .with_learning(learning.clone()),
            )
            .await?
            .hashtags;

        Ok((caption, normalize_hashtags(hashtags)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::MockCaptionGenerator;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Database) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(temp_dir.path().join("gen.db").to_str().unwrap())
            .await
            .unwrap();
        for id in ["linen-shirt", "wool-scarf"] {
            db.upsert_product(&Product {
                id: id.to_string(),
                name: id.replace('-', " "),
                category: "Apparel".to_string(),
                slug: id.to_string(),
                image_url: Some(format!("https://cdn.example.com/{}.jpg", id)),
                active: true,
            })
            .await
            .unwrap();
        }
        (temp_dir, db)
    }

    fn request(count: usize) -> GenerateRequest {
        GenerateRequest {
            count,
            platforms: vec![Platform::Instagram],
            tones: vec!["casual".to_string(), "luxury".to_string()],
            posting_times: vec!["09:00".to_string(), "18:00".to_string()],
            posts_per_day: None,
            start: Utc.with_ymd_and_hms(2025, 6, 10, 8, 0, 0).unwrap().timestamp(),
            window_end: None,
            requires_approval: false,
        }
    }

    #[tokio::test]
    async fn test_generates_queued_posts_in_slots() {
        let (_dir, db) = setup().await;
        let generator = MockCaptionGenerator::new();
        let shop = ShopConfig::default();

        let report = DirectGenerator::new(&db, &generator, &shop)
            .generate(&request(3))
            .await
            .unwrap();

        assert_eq!(report.created.len(), 3);
        assert_eq!(report.failed, 0);
        let tones: Vec<_> = report.created.iter().map(|p| p.tone.clone().unwrap()).collect();
        assert_eq!(tones, vec!["casual", "luxury", "casual"]);
        assert!(report.created.iter().all(|p| p.status == PostStatus::Queued));
        assert_eq!(
            report.created[0].link.as_deref(),
            Some("https://shop.example.com/products/linen-shirt")
        );
        assert_eq!(report.created[0].hashtags, vec!["linenshirt".to_string(), "shop".to_string()]);

        let stored = db.get_post(&report.created[0].id).await.unwrap().unwrap();
        assert_eq!(stored.scheduled_for, request(3).start + 3600);
    }

    #[tokio::test]
    async fn test_requires_approval_creates_drafts() {
        let (_dir, db) = setup().await;
        let generator = MockCaptionGenerator::new();
        let shop = ShopConfig::default();
        let mut req = request(1);
        req.requires_approval = true;

        let report = DirectGenerator::new(&db, &generator, &shop).generate(&req).await.unwrap();
        assert_eq!(report.created[0].status, PostStatus::Draft);
    }

    #[tokio::test]
    async fn test_generation_failure_skips_only_that_post() {
        let (_dir, db) = setup().await;
        let generator = MockCaptionGenerator::new().failing_for("linen-shirt");
        let shop = ShopConfig::default();

        let report = DirectGenerator::new(&db, &generator, &shop)
            .generate(&request(2))
            .await
            .unwrap();

        assert_eq!(report.created.len(), 1);
        assert_eq!(report.created[0].product_id.as_deref(), Some("wool-scarf"));
        assert_eq!(report.failed, 1);
        let all = db.list_posts(None, None, 10).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_no_products_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(temp_dir.path().join("empty.db").to_str().unwrap())
            .await
            .unwrap();
        let generator = MockCaptionGenerator::new();
        let shop = ShopConfig::default();

        let report = DirectGenerator::new(&db, &generator, &shop)
            .generate(&request(2))
            .await
            .unwrap();
        assert!(report.created.is_empty());
        assert_eq!(report.errors.len(), 1);
    }
}
