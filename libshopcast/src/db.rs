//! Database operations for scheduled posts
//!
//! Catalog and settings queries live in [`crate::catalog`] and
//! [`crate::settings`]; they share the same pool.

use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::Path;

use crate::error::{DbError, Result};
use crate::types::{Engagement, MetricsSnapshot, Platform, PostStatus, Published, ScheduledPost};

const POST_COLUMNS: &str = r#"
    id, platform, caption, hashtags, media_urls, link, board_id, title,
    product_id, asset_id, source_post_id, tone, is_repost, scheduled_for,
    status, error_message, external_id, permalink, posted_at, claimed_at,
    lease_expires_at, likes, comments, saves, shares, impressions, reach,
    engagement_rate, engagement_updated_at, sync_error, created_at
"#;

/// One autopilot audit row
#[derive(Debug, Clone, PartialEq)]
pub struct AutopilotRun {
    pub ran_at: i64,
    pub target: i64,
    pub current_count: i64,
    pub generated: i64,
    pub queue_size: i64,
}

/// Aggregated effectiveness of one hashtag
#[derive(Debug, Clone, PartialEq)]
pub struct HashtagStat {
    pub hashtag: String,
    pub posts: i64,
    pub avg_engagement_rate: f64,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
            }
        }

        // mode=rwc creates the file if missing
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ========================================================================
    // Creation and lookup
    // ========================================================================

    pub async fn create_post(&self, post: &ScheduledPost) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scheduled_posts (
                id, platform, caption, hashtags, media_urls, link, board_id, title,
                product_id, asset_id, source_post_id, tone, is_repost, scheduled_for,
                status, error_message, external_id, permalink, posted_at, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.platform)
        .bind(&post.caption)
        .bind(to_json_list(&post.hashtags))
        .bind(to_json_list(&post.media_urls))
        .bind(&post.link)
        .bind(&post.board_id)
        .bind(&post.title)
        .bind(&post.product_id)
        .bind(&post.asset_id)
        .bind(&post.source_post_id)
        .bind(&post.tone)
        .bind(post.is_repost)
        .bind(post.scheduled_for)
        .bind(post.status.as_str())
        .bind(&post.error_message)
        .bind(&post.external_id)
        .bind(&post.permalink)
        .bind(post.posted_at)
        .bind(post.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Option<ScheduledPost>> {
        let query = format!("SELECT {} FROM scheduled_posts WHERE id = ?", POST_COLUMNS);
        let row = sqlx::query(&query)
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.as_ref().map(post_from_row).transpose()
    }

    /// List posts, newest schedule first
    pub async fn list_posts(
        &self,
        status: Option<PostStatus>,
        platform: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ScheduledPost>> {
        let mut where_clauses = vec!["1=1"];
        if status.is_some() {
            where_clauses.push("status = ?");
        }
        if platform.is_some() {
            where_clauses.push("platform = ?");
        }

        let query_str = format!(
            "SELECT {} FROM scheduled_posts WHERE {} ORDER BY scheduled_for DESC LIMIT ?",
            POST_COLUMNS,
            where_clauses.join(" AND ")
        );

        let mut query = sqlx::query(&query_str);
        if let Some(s) = status {
            query = query.bind(s.as_str());
        }
        if let Some(p) = platform {
            query = query.bind(p);
        }
        query = query.bind(limit as i64);

        let rows = query.fetch_all(&self.pool).await.map_err(DbError::SqlxError)?;
        rows.iter().map(post_from_row).collect()
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Queued posts whose time has come, oldest first
    pub async fn due_posts(&self, now: i64, limit: u32) -> Result<Vec<ScheduledPost>> {
        let query = format!(
            r#"
            SELECT {} FROM scheduled_posts
            WHERE status = 'queued' AND scheduled_for <= ?
            ORDER BY scheduled_for ASC, created_at ASC
            LIMIT ?
            "#,
            POST_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(now)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter().map(post_from_row).collect()
    }

    /// Platform names that have due work, including rows whose lease expired
    pub async fn dispatchable_platforms(&self, now: i64) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT platform FROM scheduled_posts
            WHERE (status = 'queued' AND scheduled_for <= ?)
               OR (status = 'processing' AND lease_expires_at IS NOT NULL AND lease_expires_at <= ?)
            ORDER BY platform
            "#,
        )
        .bind(now)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(|r| r.get("platform")).collect())
    }

    /// Claim a post for publishing
    ///
    /// Conditional on the row still being `queued`: returns `false` when
    /// another dispatcher got there first.
    pub async fn claim_post(&self, post_id: &str, now: i64, lease_until: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_posts
            SET status = 'processing', claimed_at = ?, lease_expires_at = ?
            WHERE id = ? AND status = 'queued'
            "#,
        )
        .bind(now)
        .bind(lease_until)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Put `processing` rows with an expired lease back in the queue
    pub async fn reclaim_expired_leases(&self, now: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_posts
            SET status = 'queued', claimed_at = NULL, lease_expires_at = NULL
            WHERE status = 'processing'
              AND lease_expires_at IS NOT NULL
              AND lease_expires_at <= ?
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected())
    }

    pub async fn mark_posted(
        &self,
        post_id: &str,
        published: &Published,
        posted_at: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_posts
            SET status = 'posted', external_id = ?, permalink = ?, posted_at = ?,
                error_message = NULL, lease_expires_at = NULL
            WHERE id = ? AND status = 'processing' AND external_id IS NULL
            "#,
        )
        .bind(&published.external_id)
        .bind(&published.permalink)
        .bind(posted_at)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn mark_failed(&self, post_id: &str, error_message: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_posts
            SET status = 'failed', error_message = ?, lease_expires_at = NULL
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(error_message)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// `failed -> queued`, clearing the error
    pub async fn reset_failed(&self, post_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_posts
            SET status = 'queued', error_message = NULL, claimed_at = NULL, lease_expires_at = NULL
            WHERE id = ? AND status = 'failed'
            "#,
        )
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// `draft -> queued`
    pub async fn approve_draft(&self, post_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE scheduled_posts SET status = 'queued' WHERE id = ? AND status = 'draft'",
        )
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    // ========================================================================
    // Planning
    // ========================================================================

    /// Count queued and draft posts for `platforms` scheduled in `[from, to]`
    pub async fn count_pipeline_posts(
        &self,
        platforms: &[Platform],
        from: i64,
        to: i64,
    ) -> Result<i64> {
        if platforms.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; platforms.len()].join(", ");
        let query_str = format!(
            r#"
            SELECT COUNT(*) AS n FROM scheduled_posts
            WHERE status IN ('queued', 'draft')
              AND scheduled_for >= ? AND scheduled_for <= ?
              AND platform IN ({})
            "#,
            placeholders
        );

        let mut query = sqlx::query(&query_str).bind(from).bind(to);
        for platform in platforms {
            query = query.bind(platform.as_str());
        }

        let row = query.fetch_one(&self.pool).await.map_err(DbError::SqlxError)?;
        Ok(row.get::<i64, _>("n"))
    }

    /// Schedule times already taken on a platform in `[from, to]`
    pub async fn occupied_slots(&self, platform: Platform, from: i64, to: i64) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            r#"
            SELECT scheduled_for FROM scheduled_posts
            WHERE platform = ? AND status IN ('queued', 'draft', 'processing')
              AND scheduled_for >= ? AND scheduled_for <= ?
            "#,
        )
        .bind(platform.as_str())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(|r| r.get("scheduled_for")).collect())
    }

    /// Published posts old enough to resurface, best performers first
    pub async fn repost_candidates(&self, posted_before: i64) -> Result<Vec<ScheduledPost>> {
        let query = format!(
            r#"
            SELECT {} FROM scheduled_posts
            WHERE status IN ('posted', 'published')
              AND posted_at IS NOT NULL AND posted_at <= ?
            ORDER BY engagement_rate DESC, posted_at ASC
            "#,
            POST_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(posted_before)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter().map(post_from_row).collect()
    }

    pub async fn record_autopilot_run(&self, run: &AutopilotRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO autopilot_runs (ran_at, target, current_count, generated, queue_size)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.ran_at)
        .bind(run.target)
        .bind(run.current_count)
        .bind(run.generated)
        .bind(run.queue_size)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Most recent autopilot runs first
    pub async fn autopilot_runs(&self, limit: usize) -> Result<Vec<AutopilotRun>> {
        let rows = sqlx::query(
            r#"
            SELECT ran_at, target, current_count, generated, queue_size
            FROM autopilot_runs ORDER BY ran_at DESC, id DESC LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| AutopilotRun {
                ran_at: r.get("ran_at"),
                target: r.get("target"),
                current_count: r.get("current_count"),
                generated: r.get("generated"),
                queue_size: r.get("queue_size"),
            })
            .collect())
    }

    // ========================================================================
    // Engagement
    // ========================================================================

    /// Posted rows due for a metrics refresh
    ///
    /// Skips rows refreshed after `fresh_after` and rows published before
    /// `posted_after`.
    pub async fn stale_posted_posts(
        &self,
        fresh_after: i64,
        posted_after: i64,
    ) -> Result<Vec<ScheduledPost>> {
        let query = format!(
            r#"
            SELECT {} FROM scheduled_posts
            WHERE status IN ('posted', 'published')
              AND external_id IS NOT NULL
              AND (engagement_updated_at IS NULL OR engagement_updated_at < ?)
              AND posted_at >= ?
            ORDER BY posted_at DESC
            "#,
            POST_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(fresh_after)
            .bind(posted_after)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter().map(post_from_row).collect()
    }

    /// Every posted row with a platform id, regardless of freshness
    pub async fn all_posted_posts(&self) -> Result<Vec<ScheduledPost>> {
        let query = format!(
            r#"
            SELECT {} FROM scheduled_posts
            WHERE status IN ('posted', 'published') AND external_id IS NOT NULL
            ORDER BY posted_at DESC
            "#,
            POST_COLUMNS
        );
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter().map(post_from_row).collect()
    }

    pub async fn update_engagement(
        &self,
        post_id: &str,
        metrics: &MetricsSnapshot,
        now: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE scheduled_posts
            SET likes = ?, comments = ?, saves = ?, shares = ?, impressions = ?, reach = ?,
                engagement_rate = ?, engagement_updated_at = ?, sync_error = NULL
            WHERE id = ?
            "#,
        )
        .bind(metrics.likes)
        .bind(metrics.comments)
        .bind(metrics.saves)
        .bind(metrics.shares)
        .bind(metrics.impressions)
        .bind(metrics.reach)
        .bind(metrics.engagement_rate())
        .bind(now)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn record_sync_error(&self, post_id: &str, error: &str) -> Result<()> {
        sqlx::query("UPDATE scheduled_posts SET sync_error = ? WHERE id = ?")
            .bind(error)
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// `posted -> deleted`: zero engagement and drop the platform references
    pub async fn mark_deleted(&self, post_id: &str, now: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_posts
            SET status = 'deleted', external_id = NULL, permalink = NULL,
                likes = 0, comments = 0, saves = 0, shares = 0, impressions = 0, reach = 0,
                engagement_rate = 0, engagement_updated_at = ?, sync_error = NULL
            WHERE id = ? AND status IN ('posted', 'published')
            "#,
        )
        .bind(now)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn upsert_hashtag_stat(
        &self,
        hashtag: &str,
        post_id: &str,
        platform: &str,
        engagement_rate: f64,
        reach: i64,
        now: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO hashtag_stats
                (hashtag, post_id, platform, engagement_rate, reach, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(hashtag, post_id)
            DO UPDATE SET engagement_rate = excluded.engagement_rate,
                          reach = excluded.reach,
                          updated_at = excluded.updated_at
            "#,
        )
        .bind(hashtag)
        .bind(post_id)
        .bind(platform)
        .bind(engagement_rate)
        .bind(reach)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Best hashtags on a platform by average engagement rate
    pub async fn top_hashtags(&self, platform: Platform, limit: usize) -> Result<Vec<HashtagStat>> {
        let rows = sqlx::query(
            r#"
            SELECT hashtag, COUNT(*) AS posts, AVG(engagement_rate) AS avg_rate
            FROM hashtag_stats
            WHERE platform = ?
            GROUP BY hashtag
            ORDER BY avg_rate DESC, posts DESC, hashtag ASC
            LIMIT ?
            "#,
        )
        .bind(platform.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| HashtagStat {
                hashtag: r.get("hashtag"),
                posts: r.get("posts"),
                avg_engagement_rate: r.get("avg_rate"),
            })
            .collect())
    }
}

fn to_json_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

fn from_json_list(id: &str, column: &str, raw: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw).map_err(|e| {
        DbError::CorruptRow {
            id: id.to_string(),
            reason: format!("{} is not a JSON list: {}", column, e),
        }
        .into()
    })
}

fn post_from_row(r: &SqliteRow) -> Result<ScheduledPost> {
    let id: String = r.get("id");
    let status_raw: String = r.get("status");
    let status = status_raw.parse::<PostStatus>().map_err(|reason| DbError::CorruptRow {
        id: id.clone(),
        reason,
    })?;
    let hashtags = from_json_list(&id, "hashtags", &r.get::<String, _>("hashtags"))?;
    let media_urls = from_json_list(&id, "media_urls", &r.get::<String, _>("media_urls"))?;

    Ok(ScheduledPost {
        platform: r.get("platform"),
        caption: r.get("caption"),
        hashtags,
        media_urls,
        link: r.get("link"),
        board_id: r.get("board_id"),
        title: r.get("title"),
        product_id: r.get("product_id"),
        asset_id: r.get("asset_id"),
        source_post_id: r.get("source_post_id"),
        tone: r.get("tone"),
        is_repost: r.get::<bool, _>("is_repost"),
        scheduled_for: r.get("scheduled_for"),
        status,
        error_message: r.get("error_message"),
        external_id: r.get("external_id"),
        permalink: r.get("permalink"),
        posted_at: r.get("posted_at"),
        claimed_at: r.get("claimed_at"),
        lease_expires_at: r.get("lease_expires_at"),
        engagement: Engagement {
            likes: r.get("likes"),
            comments: r.get("comments"),
            saves: r.get("saves"),
            shares: r.get("shares"),
            impressions: r.get("impressions"),
            reach: r.get("reach"),
            engagement_rate: r.get("engagement_rate"),
            updated_at: r.get("engagement_updated_at"),
        },
        sync_error: r.get("sync_error"),
        created_at: r.get("created_at"),
        id,
    })
}
