//! Engagement sync: refresh metrics for published posts

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::db::Database;
use crate::error::{Result, ShopcastError};
use crate::platforms::Publishers;
use crate::service::events::{Event, EventBus};
use crate::types::{Platform, PostStatus, ScheduledPost};

/// Which posted rows to refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncScope {
    /// Rows past the freshness window and inside the age limit
    Stale,
    All,
    Single(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub checked: usize,
    pub updated: usize,
    pub failed: usize,
    pub deleted: usize,
}

/// Rows covered by `scope` at `now`
pub async fn select_posts(
    db: &Database,
    scope: &SyncScope,
    config: &SyncConfig,
    now: i64,
) -> Result<Vec<ScheduledPost>> {
    match scope {
        SyncScope::Stale => {
            let fresh_after = now - config.freshness_duration()?.as_secs() as i64;
            let posted_after = now - config.max_age_duration()?.as_secs() as i64;
            db.stale_posted_posts(fresh_after, posted_after).await
        }
        SyncScope::All => db.all_posted_posts().await,
        SyncScope::Single(id) => {
            let post = db
                .get_post(id)
                .await?
                .ok_or_else(|| ShopcastError::InvalidInput(format!("post not found: {}", id)))?;
            if post.status != PostStatus::Posted || post.external_id.is_none() {
                return Err(ShopcastError::InvalidInput(format!(
                    "post {} has no published media to sync (status {})",
                    id, post.status
                )));
            }
            Ok(vec![post])
        }
    }
}

/// Known platforms among `posts`, for credential lookup
pub fn platforms_of(posts: &[ScheduledPost]) -> Vec<Platform> {
    posts
        .iter()
        .filter_map(|p| p.platform_kind().ok())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub struct EngagementSync<'a> {
    db: &'a Database,
    publishers: &'a Publishers,
    events: EventBus,
}

impl<'a> EngagementSync<'a> {
    pub fn new(db: &'a Database, publishers: &'a Publishers) -> Self {
        Self {
            db,
            publishers,
            events: EventBus::default(),
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Fetch metrics for each post and store them
    ///
    /// Per-row errors are recorded on the row; only store failures abort.
    pub async fn sync_posts(&self, posts: &[ScheduledPost], now: i64) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        for post in posts {
            report.checked += 1;
            let Some(external_id) = post.external_id.as_deref() else {
                continue;
            };

            let publisher = match post.platform_kind().and_then(|p| self.publishers.require(p)) {
                Ok(publisher) => publisher,
                Err(e) => {
                    warn!(post_id = %post.id, error = %e, "Cannot sync post");
                    self.db.record_sync_error(&post.id, &e.to_string()).await?;
                    report.failed += 1;
                    continue;
                }
            };

            match publisher.fetch_metrics(external_id).await {
                Ok(metrics) => {
                    self.db.update_engagement(&post.id, &metrics, now).await?;
                    let rate = metrics.engagement_rate();
                    for tag in &post.hashtags {
                        let tag = tag.trim().trim_start_matches('#').to_lowercase();
                        if tag.is_empty() {
                            continue;
                        }
                        self.db
                            .upsert_hashtag_stat(
                                &tag,
                                &post.id,
                                &post.platform,
                                rate,
                                metrics.reach,
                                now,
                            )
                            .await?;
                    }
                    debug!(
                        post_id = %post.id,
                        likes = metrics.likes,
                        reach = metrics.reach,
                        rate,
                        "Metrics updated"
                    );
                    report.updated += 1;
                }
                Err(e) if e.indicates_deletion() => {
                    info!(
                        post_id = %post.id,
                        external_id,
                        "Media no longer exists, marking deleted"
                    );
                    self.db.mark_deleted(&post.id, now).await?;
                    report.deleted += 1;
                }
                Err(e) => {
                    warn!(post_id = %post.id, error = %e, "Metrics fetch failed");
                    self.db.record_sync_error(&post.id, &e.to_string()).await?;
                    report.failed += 1;
                }
            }
        }

        self.events.emit(Event::SyncCompleted {
            checked: report.checked,
            updated: report.updated,
            failed: report.failed,
            deleted: report.deleted,
        });
        info!(
            checked = report.checked,
            updated = report.updated,
            failed = report.failed,
            deleted = report.deleted,
            "Engagement sync finished"
        );
        Ok(report)
    }
}
