//! Autopilot: keep the lookahead window topped up
//!
//! Each run recomputes how many queued and draft posts sit inside
//! `[now, now + days_ahead]` and asks the direct generator for the
//! shortfall. Nothing is cached between runs.

use std::collections::BTreeSet;

use tracing::info;

use crate::db::{AutopilotRun, Database};
use crate::error::{ConfigError, Result};
use crate::planner::generator::{DirectGenerator, GenerateRequest};
use crate::types::{AutopilotSettings, Platform};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutopilotOutcome {
    Disabled,
    /// The window already holds enough posts
    Satisfied { target: i64, current: i64 },
    ToppedUp {
        target: i64,
        current: i64,
        requested: i64,
        generated: i64,
        queue_size: i64,
    },
}

impl AutopilotOutcome {
    pub fn generated(&self) -> i64 {
        match self {
            AutopilotOutcome::ToppedUp { generated, .. } => *generated,
            _ => 0,
        }
    }
}

/// Target platforms in enum order, without duplicates
pub fn target_platforms(settings: &AutopilotSettings) -> Result<Vec<Platform>> {
    let mut platforms = BTreeSet::new();
    for name in &settings.platforms {
        let platform = name.parse::<Platform>().map_err(|e| ConfigError::InvalidSetting {
            key: "autopilot.platforms".to_string(),
            reason: e.to_string(),
        })?;
        platforms.insert(platform);
    }
    Ok(platforms.into_iter().collect())
}

/// Split `deficit` across `platforms` posts, `ceil(deficit / n)` each, never
/// handing out more than `deficit` in total
pub fn allot(deficit: i64, platforms: usize) -> Vec<i64> {
    if platforms == 0 || deficit <= 0 {
        return vec![0; platforms];
    }
    let per_platform = (deficit + platforms as i64 - 1) / platforms as i64;
    let mut remaining = deficit;
    (0..platforms)
        .map(|_| {
            let n = per_platform.min(remaining);
            remaining -= n;
            n
        })
        .collect()
}

pub async fn run_autopilot(
    db: &Database,
    generator: &DirectGenerator<'_>,
    settings: &AutopilotSettings,
    requires_approval: bool,
    now: i64,
) -> Result<AutopilotOutcome> {
    if !settings.enabled {
        info!("Autopilot disabled, nothing to do");
        return Ok(AutopilotOutcome::Disabled);
    }

    let platforms = target_platforms(settings)?;
    let window_end = now + i64::from(settings.days_ahead) * 86_400;
    let target = i64::from(settings.days_ahead)
        * i64::from(settings.posts_per_day)
        * platforms.len() as i64;
    let current = db.count_pipeline_posts(&platforms, now, window_end).await?;

    if current >= target {
        info!(target, current, "Autopilot window already full");
        return Ok(AutopilotOutcome::Satisfied { target, current });
    }

    let deficit = target - current;
    let mut generated = 0i64;

    for (platform, count) in platforms.iter().zip(allot(deficit, platforms.len())) {
        if count == 0 {
            continue;
        }
        let request = GenerateRequest {
            count: count as usize,
            platforms: vec![*platform],
            tones: settings.tones.clone(),
            posting_times: settings.posting_times.clone(),
            posts_per_day: Some(settings.posts_per_day),
            start: now,
            window_end: Some(window_end),
            requires_approval,
        };
        let report = generator.generate(&request).await?;
        generated += report.created.len() as i64;
    }

    let queue_size = current + generated;
    db.record_autopilot_run(&AutopilotRun {
        ran_at: now,
        target,
        current_count: current,
        generated,
        queue_size,
    })
    .await?;

    info!(target, current, deficit, generated, queue_size, "Autopilot topped up queue");
    Ok(AutopilotOutcome::ToppedUp {
        target,
        current,
        requested: deficit,
        generated,
        queue_size,
    })
}
