//! Service layer for Shopcast
//!
//! [`ShopcastService`] is the single entry point the binaries use. It owns
//! the shared database and configuration, resolves per-run settings from the
//! settings store, and wires the dispatcher, planners and engagement sync
//! together with an [`EventBus`](events::EventBus).
//!
//! # Example
//!
//! ```no_run
//! use libshopcast::service::ShopcastService;
//!
//! # async fn example() -> libshopcast::Result<()> {
//! let service = ShopcastService::new().await?;
//! let now = chrono::Utc::now().timestamp();
//!
//! let batch = service.run_dispatcher(now).await?;
//! println!("{} posted, {} failed", batch.posted, batch.failed);
//! # Ok(())
//! # }
//! ```

pub mod events;

use std::sync::Arc;

use tracing::{debug, info};

use self::events::{EventBus, EventReceiver};
use crate::dispatcher::{self, BatchResult, Dispatcher};
use crate::error::{ConfigError, Result};
use crate::generation::{CaptionGenerator, HttpCaptionGenerator};
use crate::planner::{
    generate_reposts, run_autopilot, AutopilotOutcome, DirectGenerator, GenerateRequest,
    GenerationReport, RepostReport, RepostRequest,
};
use crate::platforms::{create_publishers, Publishers};
use crate::sync::{platforms_of, select_posts, EngagementSync, SyncReport, SyncScope};
use crate::types::Platform;
use crate::{Config, Database};

/// Main service facade
///
/// Per-run settings (autopilot configuration, platform tokens) are read from
/// the store at the start of each operation and passed down explicitly.
pub struct ShopcastService {
    db: Arc<Database>,
    config: Arc<Config>,
    event_bus: EventBus,
    generator: Option<Arc<dyn CaptionGenerator>>,
    /// Replaces credential lookup and real adapters when set
    publishers: Option<Arc<Publishers>>,
}

impl ShopcastService {
    /// Create a service from the default configuration file
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    /// Open the database and build the HTTP caption generator if one is configured
    pub async fn from_config(config: Config) -> Result<Self> {
        let db = Database::new(&config.database.path).await?;

        let generator: Option<Arc<dyn CaptionGenerator>> = match &config.generator.endpoint {
            Some(_) => Some(Arc::new(HttpCaptionGenerator::from_config(&config.generator)?)),
            None => None,
        };

        Ok(Self {
            db: Arc::new(db),
            config: Arc::new(config),
            event_bus: EventBus::new(100),
            generator,
            publishers: None,
        })
    }

    pub fn with_generator(mut self, generator: Arc<dyn CaptionGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Use fixed adapters instead of building them from stored credentials
    pub fn with_publishers(mut self, publishers: Publishers) -> Self {
        self.publishers = Some(Arc::new(publishers));
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Receiver for progress events from later operations
    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }

    /// Publish everything due at `now`
    ///
    /// Credentials for every platform with due work are resolved first; a
    /// missing or expired token aborts the run before any post is claimed.
    pub async fn run_dispatcher(&self, now: i64) -> Result<BatchResult> {
        let platforms: Vec<Platform> = self
            .db
            .dispatchable_platforms(now)
            .await?
            .iter()
            .filter_map(|name| name.parse().ok())
            .collect();
        let publishers = self.publishers_for(&platforms, now).await?;
        let lease = self.config.dispatcher.lease_duration()?;

        Dispatcher::new(&self.db, &publishers, &self.config.shop)
            .with_events(self.event_bus.clone())
            .with_lease(lease)
            .with_batch_size(self.config.dispatcher.batch_size)
            .process_due(now)
            .await
    }

    pub async fn run_autopilot(&self, now: i64) -> Result<AutopilotOutcome> {
        let settings = self.db.load_autopilot_settings().await?;
        if !settings.enabled {
            return Ok(AutopilotOutcome::Disabled);
        }
        let generator = self.generator()?;
        let direct = DirectGenerator::new(&self.db, generator, &self.config.shop);
        run_autopilot(
            &self.db,
            &direct,
            &settings,
            self.config.generator.requires_approval,
            now,
        )
        .await
    }

    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerationReport> {
        let generator = self.generator()?;
        DirectGenerator::new(&self.db, generator, &self.config.shop)
            .generate(request)
            .await
    }

    pub async fn reposts(&self, request: &RepostRequest) -> Result<RepostReport> {
        generate_reposts(&self.db, &self.config.shop, request).await
    }

    pub async fn reset_post(&self, post_id: &str) -> Result<()> {
        dispatcher::reset_post(&self.db, post_id).await
    }

    pub async fn approve_post(&self, post_id: &str) -> Result<()> {
        dispatcher::approve_post(&self.db, post_id).await
    }

    pub async fn run_engagement_sync(&self, scope: &SyncScope, now: i64) -> Result<SyncReport> {
        let posts = select_posts(&self.db, scope, &self.config.sync, now).await?;
        debug!(count = posts.len(), ?scope, "Posts selected for sync");
        if posts.is_empty() {
            info!("No posts need an engagement refresh");
            return Ok(SyncReport::default());
        }

        let publishers = self.publishers_for(&platforms_of(&posts), now).await?;
        EngagementSync::new(&self.db, &publishers)
            .with_events(self.event_bus.clone())
            .sync_posts(&posts, now)
            .await
    }

    fn generator(&self) -> Result<&dyn CaptionGenerator> {
        self.generator
            .as_deref()
            .ok_or_else(|| ConfigError::MissingField("generator.endpoint".to_string()).into())
    }

    async fn publishers_for(&self, platforms: &[Platform], now: i64) -> Result<Arc<Publishers>> {
        if let Some(publishers) = &self.publishers {
            return Ok(Arc::clone(publishers));
        }
        let credentials = self.db.load_credentials(platforms, now).await?;
        Ok(Arc::new(create_publishers(&self.config, credentials)?))
    }
}
