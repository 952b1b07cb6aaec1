//! Repost generator: resurface past posts that performed well

use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::config::ShopConfig;
use crate::db::Database;
use crate::error::{Result, ShopcastError};
use crate::types::{Platform, Product, ScheduledPost};

/// Fixed daily rotation for reposts
pub const ROTATION: [(u32, u32); 3] = [(10, 0), (14, 0), (19, 0)];

const CASUAL: &[&str] = &[
    "Still can't get enough of the {name}. Grab yours: {link}",
    "Throwback to a favourite from our {category} range: the {name}. {link}",
    "In case you missed it, the {name} is still here. {link}",
];
const PROFESSIONAL: &[&str] = &[
    "Revisit the {name}, a standout in our {category} collection. {link}",
    "Customer favourite: the {name}. Discover it here: {link}",
];
const PLAYFUL: &[&str] = &[
    "Guess who's back? The {name}! {link}",
    "Plot twist: the {name} never left. {link}",
    "Your {category} shelf called. It wants the {name}. {link}",
];
const LUXURY: &[&str] = &[
    "Timeless by design. The {name}. {link}",
    "An enduring signature of our {category} collection: the {name}. {link}",
];
const DEFAULT: &[&str] = &["The {name} is back in the spotlight. {link}"];

pub fn templates_for(tone: &str) -> &'static [&'static str] {
    match tone.trim().to_lowercase().as_str() {
        "casual" => CASUAL,
        "professional" => PROFESSIONAL,
        "playful" => PLAYFUL,
        "luxury" => LUXURY,
        _ => DEFAULT,
    }
}

pub fn render_template(template: &str, name: &str, category: &str, link: &str) -> String {
    template
        .replace("{name}", name)
        .replace("{category}", category)
        .replace("{link}", link)
        .trim()
        .to_string()
}

/// Slot for the `index`-th selected post: the rotation starts the day after
/// `start` and moves to the next day once all three times are used
pub fn rotation_slot(start: i64, index: usize) -> Result<i64> {
    let start_dt = DateTime::<Utc>::from_timestamp(start, 0)
        .ok_or_else(|| ShopcastError::InvalidInput(format!("invalid start timestamp {}", start)))?;
    let (hour, minute) = ROTATION[index % ROTATION.len()];
    let day = start_dt.date_naive() + Duration::days(1 + (index / ROTATION.len()) as i64);
    let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
    Ok(day.and_time(time).and_utc().timestamp())
}

#[derive(Debug, Clone)]
pub struct RepostRequest {
    pub count: usize,
    pub platforms: Vec<Platform>,
    pub tone: String,
    pub min_days_old: u32,
    /// Build the posts without saving them
    pub preview: bool,
    pub start: i64,
}

#[derive(Debug, Default)]
pub struct RepostReport {
    pub posts: Vec<ScheduledPost>,
    /// Number of distinct source posts chosen
    pub selected: usize,
    pub persisted: bool,
}

/// Pick at most one candidate per product, in ranking order
pub fn select_distinct(candidates: Vec<ScheduledPost>, count: usize) -> Vec<ScheduledPost> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|post| {
            let key = post.product_id.clone().unwrap_or_else(|| post.id.clone());
            seen.insert(key)
        })
        .take(count)
        .collect()
}

pub async fn generate_reposts(
    db: &Database,
    shop: &ShopConfig,
    request: &RepostRequest,
) -> Result<RepostReport> {
    let threshold = request.start - i64::from(request.min_days_old) * 86_400;
    let candidates = db.repost_candidates(threshold).await?;
    let available = candidates.len();
    let selected = select_distinct(candidates, request.count);
    debug!(available, selected = selected.len(), "Repost candidates");

    let templates = templates_for(&request.tone);
    let mut posts = Vec::new();

    for (index, source) in selected.iter().enumerate() {
        let slot = rotation_slot(request.start, index)?;
        let product = match &source.product_id {
            Some(id) => db.get_product(id).await?,
            None => None,
        };

        for &platform in &request.platforms {
            let post = build_repost(
                source,
                product.as_ref(),
                platform,
                slot,
                templates,
                &request.tone,
                shop,
            );
            posts.push(post);
        }
    }

    if !request.preview {
        for post in &posts {
            db.create_post(post).await?;
        }
    }

    info!(
        selected = selected.len(),
        posts = posts.len(),
        preview = request.preview,
        "Reposts generated"
    );
    Ok(RepostReport {
        selected: selected.len(),
        persisted: !request.preview,
        posts,
    })
}

fn build_repost(
    source: &ScheduledPost,
    product: Option<&Product>,
    platform: Platform,
    slot: i64,
    templates: &[&str],
    tone: &str,
    shop: &ShopConfig,
) -> ScheduledPost {
    let name = product
        .map(|p| p.name.clone())
        .or_else(|| source.title.clone())
        .unwrap_or_else(|| "this favourite".to_string());
    let category = product.map(|p| p.category.clone()).unwrap_or_default();
    let link = product
        .map(|p| shop.product_link(&p.slug))
        .or_else(|| source.link.clone())
        .unwrap_or_default();

    let template = templates
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("{name} {link}");

    let caption = render_template(template, &name, &category, &link);
    let mut post = ScheduledPost::new(platform, caption, slot);
    post.hashtags = source.hashtags.clone();
    post.media_urls = source.media_urls.clone();
    post.link = (!link.is_empty()).then_some(link);
    post.title = source.title.clone();
    post.product_id = source.product_id.clone();
    post.asset_id = source.asset_id.clone();
    post.source_post_id = Some(source.id.clone());
    post.tone = Some(tone.to_string());
    post.is_repost = true;
    if platform == Platform::Pinterest && source.platform == Platform::Pinterest.as_str() {
        post.board_id = source.board_id.clone();
    }
    post
}
