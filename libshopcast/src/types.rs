//! Core types for Shopcast

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PlatformError;

/// Platforms a post can be published to
///
/// Closed set: adding a platform means adding a variant here and an
/// adapter in [`crate::platforms`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    Pinterest,
    Facebook,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Instagram, Platform::Pinterest, Platform::Facebook];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Pinterest => "pinterest",
            Platform::Facebook => "facebook",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "instagram" => Ok(Platform::Instagram),
            "pinterest" => Ok(Platform::Pinterest),
            "facebook" => Ok(Platform::Facebook),
            _ => Err(PlatformError::UnknownPlatform(s.to_string())),
        }
    }
}

/// Lifecycle of a scheduled post
///
/// ```text
/// draft -> queued -> processing -> posted -> deleted
///            ^            |
///            |            v
///            +-------- failed   (manual reset only)
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Queued,
    Processing,
    Posted,
    Failed,
    Deleted,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Queued => "queued",
            PostStatus::Processing => "processing",
            PostStatus::Posted => "posted",
            PostStatus::Failed => "failed",
            PostStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "queued" => Ok(PostStatus::Queued),
            "processing" => Ok(PostStatus::Processing),
            // Rows written by older tooling use "published"
            "posted" | "published" => Ok(PostStatus::Posted),
            "failed" => Ok(PostStatus::Failed),
            "deleted" => Ok(PostStatus::Deleted),
            other => Err(format!("unknown post status '{}'", other)),
        }
    }
}

/// Engagement counters populated after publishing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Engagement {
    pub likes: i64,
    pub comments: i64,
    pub saves: i64,
    pub shares: i64,
    pub impressions: i64,
    pub reach: i64,
    pub engagement_rate: f64,
    pub updated_at: Option<i64>,
}

impl Engagement {
    /// `(likes + comments + saves) / reach * 100`, zero when reach is zero
    pub fn rate(likes: i64, comments: i64, saves: i64, reach: i64) -> f64 {
        if reach <= 0 {
            return 0.0;
        }
        (likes + comments + saves) as f64 / reach as f64 * 100.0
    }
}

/// A post scheduled for one platform
///
/// `platform` is kept as stored text so rows naming an unsupported platform
/// can still be loaded and failed by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledPost {
    pub id: String,
    pub platform: String,
    pub caption: String,
    pub hashtags: Vec<String>,
    /// Per-post image override; two or more entries make an Instagram carousel
    pub media_urls: Vec<String>,
    pub link: Option<String>,
    pub board_id: Option<String>,
    pub title: Option<String>,
    pub product_id: Option<String>,
    pub asset_id: Option<String>,
    pub source_post_id: Option<String>,
    pub tone: Option<String>,
    pub is_repost: bool,
    pub scheduled_for: i64,
    pub status: PostStatus,
    pub error_message: Option<String>,
    pub external_id: Option<String>,
    pub permalink: Option<String>,
    pub posted_at: Option<i64>,
    pub claimed_at: Option<i64>,
    pub lease_expires_at: Option<i64>,
    pub engagement: Engagement,
    pub sync_error: Option<String>,
    pub created_at: i64,
}

impl ScheduledPost {
    pub fn new(platform: Platform, caption: String, scheduled_for: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            platform: platform.as_str().to_string(),
            caption,
            hashtags: Vec::new(),
            media_urls: Vec::new(),
            link: None,
            board_id: None,
            title: None,
            product_id: None,
            asset_id: None,
            source_post_id: None,
            tone: None,
            is_repost: false,
            scheduled_for,
            status: PostStatus::Queued,
            error_message: None,
            external_id: None,
            permalink: None,
            posted_at: None,
            claimed_at: None,
            lease_expires_at: None,
            engagement: Engagement::default(),
            sync_error: None,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Parse the stored platform name
    pub fn platform_kind(&self) -> Result<Platform, PlatformError> {
        self.platform.parse()
    }
}

/// Result of a successful publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Published {
    pub external_id: String,
    pub permalink: String,
}

/// Metrics fetched from a platform for one published post
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub likes: i64,
    pub comments: i64,
    pub saves: i64,
    pub shares: i64,
    pub impressions: i64,
    pub reach: i64,
    pub permalink: Option<String>,
}

impl MetricsSnapshot {
    pub fn engagement_rate(&self) -> f64 {
        Engagement::rate(self.likes, self.comments, self.saves, self.reach)
    }
}

/// Product from the shop catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub category: String,
    pub slug: String,
    pub image_url: Option<String>,
    pub active: bool,
}

/// Original media uploaded for a product
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaAsset {
    pub id: String,
    pub product_id: String,
    pub original_url: String,
}

/// Singleton autopilot configuration, edited by an operator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutopilotSettings {
    pub enabled: bool,
    pub days_ahead: u32,
    pub posts_per_day: u32,
    pub platforms: Vec<String>,
    pub tones: Vec<String>,
    pub posting_times: Vec<String>,
}

impl Default for AutopilotSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            days_ahead: 7,
            posts_per_day: 2,
            platforms: vec!["instagram".to_string()],
            tones: vec!["casual".to_string()],
            posting_times: vec!["09:00".to_string(), "13:00".to_string(), "18:00".to_string()],
        }
    }
}
