//! Dispatcher: publish due posts
//!
//! One run reclaims expired leases, then walks the due queue oldest first.
//! Each post is claimed with a conditional update before any network call,
//! published through the adapter for its platform, and its outcome written
//! back. Posts are processed one at a time; a failure on one post never
//! stops the others.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::config::ShopConfig;
use crate::db::Database;
use crate::error::{PlatformError, Result, ShopcastError};
use crate::platforms::Publishers;
use crate::service::events::{Event, EventBus};
use crate::types::{Platform, PostStatus, Published, ScheduledPost};

/// What happened to one due post
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchStatus {
    Posted(Published),
    Failed(String),
    /// Another dispatcher claimed it first
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostOutcome {
    pub post_id: String,
    pub platform: String,
    pub status: DispatchStatus,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    pub reclaimed: u64,
    pub claimed: usize,
    pub posted: usize,
    pub failed: usize,
    pub skipped: usize,
    pub outcomes: Vec<PostOutcome>,
}

pub struct Dispatcher<'a> {
    db: &'a Database,
    publishers: &'a Publishers,
    shop: &'a ShopConfig,
    events: EventBus,
    lease: Duration,
    batch_size: u32,
}

impl<'a> Dispatcher<'a> {
    pub fn new(db: &'a Database, publishers: &'a Publishers, shop: &'a ShopConfig) -> Self {
        Self {
            db,
            publishers,
            shop,
            events: EventBus::default(),
            lease: Duration::from_secs(600),
            batch_size: 50,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Publish every post that is due at `now`
    ///
    /// Only errors reading the queue abort the run. Publish errors fail the
    /// post; errors recording an outcome are logged and the run moves on.
    /// Claim times, leases and `posted_at` follow the clock as the run
    /// progresses, starting from `now`.
    pub async fn process_due(&self, now: i64) -> Result<BatchResult> {
        let clock = RunClock::start(now);
        let mut result = BatchResult {
            reclaimed: self.db.reclaim_expired_leases(now).await?,
            ..BatchResult::default()
        };
        if result.reclaimed > 0 {
            warn!(count = result.reclaimed, "Requeued posts with expired leases");
        }

        let due = self.db.due_posts(now, self.batch_size).await?;
        debug!(count = due.len(), "Due posts");

        for post in due {
            let claimed_at = clock.now();
            let lease_until = claimed_at + self.lease.as_secs() as i64;
            let status = match self.db.claim_post(&post.id, claimed_at, lease_until).await {
                Ok(true) => {
                    result.claimed += 1;
                    self.events.emit(Event::PostClaimed {
                        post_id: post.id.clone(),
                        platform: post.platform.clone(),
                    });
                    self.dispatch(&post, &clock).await
                }
                Ok(false) => {
                    debug!(post_id = %post.id, "Post already claimed, skipping");
                    DispatchStatus::Skipped
                }
                Err(e) => {
                    error!(post_id = %post.id, error = %e, "Failed to claim post");
                    DispatchStatus::Skipped
                }
            };

            match &status {
                DispatchStatus::Posted(_) => result.posted += 1,
                DispatchStatus::Failed(_) => result.failed += 1,
                DispatchStatus::Skipped => result.skipped += 1,
            }
            result.outcomes.push(PostOutcome {
                post_id: post.id,
                platform: post.platform,
                status,
            });
        }

        self.events.emit(Event::BatchCompleted {
            reclaimed: result.reclaimed,
            claimed: result.claimed,
            posted: result.posted,
            failed: result.failed,
            skipped: result.skipped,
        });
        info!(
            reclaimed = result.reclaimed,
            claimed = result.claimed,
            posted = result.posted,
            failed = result.failed,
            skipped = result.skipped,
            "Dispatch finished"
        );
        Ok(result)
    }

    /// Publish one claimed post and record the outcome
    async fn dispatch(&self, post: &ScheduledPost, clock: &RunClock) -> DispatchStatus {
        match self.publish(post).await {
            Ok(published) => {
                info!(
                    post_id = %post.id,
                    platform = %post.platform,
                    external_id = %published.external_id,
                    "Post published"
                );
                match self.db.mark_posted(&post.id, &published, clock.now()).await {
                    Ok(true) => {}
                    Ok(false) => warn!(
                        post_id = %post.id,
                        "Post was no longer processing when recording success"
                    ),
                    Err(e) => error!(
                        post_id = %post.id,
                        error = %e,
                        "Failed to record published post"
                    ),
                }
                self.events.emit(Event::PostPublished {
                    post_id: post.id.clone(),
                    platform: post.platform.clone(),
                    external_id: published.external_id.clone(),
                    permalink: published.permalink.clone(),
                });
                DispatchStatus::Posted(published)
            }
            Err(e) => {
                let message = failure_message(&e);
                warn!(
                    post_id = %post.id,
                    platform = %post.platform,
                    error = %message,
                    "Post failed"
                );
                match self.db.mark_failed(&post.id, &message).await {
                    Ok(true) => {}
                    Ok(false) => warn!(
                        post_id = %post.id,
                        "Post was no longer processing when recording failure"
                    ),
                    Err(e) => error!(
                        post_id = %post.id,
                        error = %e,
                        "Failed to record post failure"
                    ),
                }
                self.events.emit(Event::PostFailed {
                    post_id: post.id.clone(),
                    platform: post.platform.clone(),
                    error: message.clone(),
                });
                DispatchStatus::Failed(message)
            }
        }
    }

    async fn publish(&self, post: &ScheduledPost) -> Result<Published> {
        let platform = post.platform_kind()?;
        let publisher = self.publishers.require(platform)?;

        let media = self.resolve_media(post).await?;
        let link = self.resolve_link(post).await?;
        let caption = compose_caption(&post.caption, &post.hashtags, link.as_deref());

        let mut outbound = post.clone();
        outbound.link = link;
        debug!(
            post_id = %post.id,
            platform = %platform,
            images = media.len(),
            carousel = platform == Platform::Instagram && media.len() >= 2,
            "Publishing"
        );

        Ok(publisher.publish(&outbound, &media, &caption).await?)
    }

    /// Image URLs for a post: its own override list, then its source asset,
    /// then the product image
    async fn resolve_media(&self, post: &ScheduledPost) -> Result<Vec<String>> {
        let overrides: Vec<String> = post
            .media_urls
            .iter()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .collect();
        if !overrides.is_empty() {
            return Ok(overrides);
        }

        if let Some(asset_id) = &post.asset_id {
            if let Some(asset) = self.db.get_asset(asset_id).await? {
                if !asset.original_url.trim().is_empty() {
                    return Ok(vec![asset.original_url]);
                }
            }
        }

        if let Some(product_id) = &post.product_id {
            if let Some(url) = self
                .db
                .get_product(product_id)
                .await?
                .and_then(|p| p.image_url)
                .filter(|u| !u.trim().is_empty())
            {
                return Ok(vec![url]);
            }
        }

        Err(PlatformError::Validation(format!(
            "no image could be resolved for post {}",
            post.id
        ))
        .into())
    }

    async fn resolve_link(&self, post: &ScheduledPost) -> Result<Option<String>> {
        if let Some(link) = post.link.as_ref().filter(|l| !l.trim().is_empty()) {
            return Ok(Some(link.clone()));
        }
        match &post.product_id {
            Some(id) => Ok(self
                .db
                .get_product(id)
                .await?
                .map(|p| self.shop.product_link(&p.slug))),
            None => Ok(None),
        }
    }
}

/// Unix time for one dispatch run: the caller's `now` plus the wall time
/// elapsed since the run started
struct RunClock {
    start: i64,
    started: Instant,
}

impl RunClock {
    fn start(now: i64) -> Self {
        Self {
            start: now,
            started: Instant::now(),
        }
    }

    fn now(&self) -> i64 {
        self.start + self.started.elapsed().as_secs() as i64
    }
}

/// Outbound text: caption, hashtags and link separated by blank lines
pub fn compose_caption(caption: &str, hashtags: &[String], link: Option<&str>) -> String {
    let tags = hashtags
        .iter()
        .map(|t| t.trim().trim_start_matches('#'))
        .filter(|t| !t.is_empty())
        .map(|t| format!("#{}", t))
        .collect::<Vec<_>>()
        .join(" ");

    [caption.trim(), tags.as_str(), link.unwrap_or("").trim()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Error text stored on a failed post; platform errors keep the platform's wording
fn failure_message(error: &ShopcastError) -> String {
    match error.as_platform() {
        Some(platform_error) => platform_error.to_string(),
        None => error.to_string(),
    }
}

/// Operator retry: `failed -> queued`
pub async fn reset_post(db: &Database, post_id: &str) -> Result<()> {
    transition(db, post_id, PostStatus::Failed, "reset").await?;
    if !db.reset_failed(post_id).await? {
        return Err(ShopcastError::InvalidInput(format!(
            "post {} changed state during reset",
            post_id
        )));
    }
    info!(post_id = %post_id, "Post reset to queued");
    Ok(())
}

/// Operator approval: `draft -> queued`
pub async fn approve_post(db: &Database, post_id: &str) -> Result<()> {
    transition(db, post_id, PostStatus::Draft, "approve").await?;
    if !db.approve_draft(post_id).await? {
        return Err(ShopcastError::InvalidInput(format!(
            "post {} changed state during approval",
            post_id
        )));
    }
    info!(post_id = %post_id, "Draft approved");
    Ok(())
}

async fn transition(
    db: &Database,
    post_id: &str,
    required: PostStatus,
    action: &str,
) -> Result<()> {
    let post = db
        .get_post(post_id)
        .await?
        .ok_or_else(|| ShopcastError::InvalidInput(format!("post not found: {}", post_id)))?;
    if post.status != required {
        return Err(ShopcastError::InvalidInput(format!(
            "cannot {} post {}: status is {}, expected {}",
            action, post_id, post.status, required
        )));
    }
    Ok(())
}
