//! Platform publish adapters
//!
//! Each platform implements [`Publisher`]. The set of platforms is the closed
//! [`Platform`] enum, and [`Publishers`] holds at most one adapter per
//! variant, so routing a post is a `match`, never a string lookup.
//!
//! ```no_run
//! use libshopcast::platforms::{create_publishers, Publishers};
//! use libshopcast::{Config, Database, Platform};
//!
//! # async fn example() -> libshopcast::Result<()> {
//! let config = Config::load()?;
//! let db = Database::new(&config.database.path).await?;
//! let now = chrono::Utc::now().timestamp();
//! let credentials = db.load_credentials(&[Platform::Pinterest], now).await?;
//! let publishers: Publishers = create_publishers(&config, credentials)?;
//! assert!(publishers.get(Platform::Pinterest).is_some());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{PlatformError, Result};
use crate::settings::Credentials;
use crate::types::{MetricsSnapshot, Platform, Published, ScheduledPost};

pub(crate) mod api;
pub mod facebook;
pub(crate) mod graph;
pub mod instagram;
pub mod pinterest;

// Available outside tests so integration suites can use it
pub mod mock;

/// Publish posts to one platform and read back their metrics
#[async_trait]
pub trait Publisher: Send + Sync {
    fn platform(&self) -> Platform;

    /// Publish one post
    ///
    /// `media` holds the resolved image URLs in order, `caption` the final
    /// outbound text. Returns the platform's id and a permalink.
    async fn publish(
        &self,
        post: &ScheduledPost,
        media: &[String],
        caption: &str,
    ) -> std::result::Result<Published, PlatformError>;

    /// Current engagement for a published post
    ///
    /// A deleted post surfaces as an error for which
    /// [`PlatformError::indicates_deletion`] is true.
    async fn fetch_metrics(
        &self,
        external_id: &str,
    ) -> std::result::Result<MetricsSnapshot, PlatformError>;
}

/// One optional adapter per platform
#[derive(Default)]
pub struct Publishers {
    instagram: Option<Box<dyn Publisher>>,
    pinterest: Option<Box<dyn Publisher>>,
    facebook: Option<Box<dyn Publisher>>,
}

impl Publishers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter in the slot for its platform, replacing any previous one
    pub fn insert(&mut self, publisher: Box<dyn Publisher>) {
        let slot = match publisher.platform() {
            Platform::Instagram => &mut self.instagram,
            Platform::Pinterest => &mut self.pinterest,
            Platform::Facebook => &mut self.facebook,
        };
        *slot = Some(publisher);
    }

    pub fn with(mut self, publisher: Box<dyn Publisher>) -> Self {
        self.insert(publisher);
        self
    }

    pub fn get(&self, platform: Platform) -> Option<&dyn Publisher> {
        match platform {
            Platform::Instagram => self.instagram.as_deref(),
            Platform::Pinterest => self.pinterest.as_deref(),
            Platform::Facebook => self.facebook.as_deref(),
        }
    }

    /// Adapter for `platform`, or `NotConfigured`
    pub fn require(
        &self,
        platform: Platform,
    ) -> std::result::Result<&dyn Publisher, PlatformError> {
        self.get(platform)
            .ok_or_else(|| PlatformError::NotConfigured(platform.to_string()))
    }

    pub fn platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| self.get(*p).is_some())
            .collect()
    }
}

/// Build real adapters for every platform that has credentials
pub fn create_publishers(config: &Config, mut credentials: Credentials) -> Result<Publishers> {
    let mut publishers = Publishers::new();

    for platform in credentials.platforms() {
        let Some(token) = credentials.take(platform) else {
            continue;
        };
        let publisher: Box<dyn Publisher> = match platform {
            Platform::Instagram => {
                Box::new(instagram::InstagramPublisher::new(&config.instagram, token)?)
            }
            Platform::Pinterest => {
                Box::new(pinterest::PinterestPublisher::new(&config.pinterest, token)?)
            }
            Platform::Facebook => {
                Box::new(facebook::FacebookPublisher::new(&config.facebook, token)?)
            }
        };
        tracing::debug!(platform = %platform, "Publisher ready");
        publishers.insert(publisher);
    }

    Ok(publishers)
}
