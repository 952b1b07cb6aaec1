//! Mock publisher for tests
//!
//! Always compiled so integration tests and the service facade can use it
//! without network access. Calls are recorded for later assertions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::PlatformError;
use crate::platforms::Publisher;
use crate::types::{MetricsSnapshot, Platform, Published, ScheduledPost};

/// One recorded `publish` call
#[derive(Debug, Clone, PartialEq)]
pub struct PublishCall {
    pub post_id: String,
    pub media: Vec<String>,
    pub caption: String,
}

#[derive(Debug, Clone)]
pub struct MockPublisher {
    platform: Platform,
    publish_error: Option<PlatformError>,
    /// Per external id; ids without an entry return default metrics
    metrics: Arc<Mutex<HashMap<String, Result<MetricsSnapshot, PlatformError>>>>,
    calls: Arc<Mutex<Vec<PublishCall>>>,
    metrics_calls: Arc<Mutex<usize>>,
}

impl MockPublisher {
    /// Publisher that accepts every post
    pub fn success(platform: Platform) -> Self {
        Self {
            platform,
            publish_error: None,
            metrics: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            metrics_calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Publisher that rejects every post with `error`
    pub fn failing(platform: Platform, error: PlatformError) -> Self {
        Self {
            publish_error: Some(error),
            ..Self::success(platform)
        }
    }

    pub fn set_metrics(&self, external_id: &str, metrics: Result<MetricsSnapshot, PlatformError>) {
        if let Ok(mut map) = self.metrics.lock() {
            map.insert(external_id.to_string(), metrics);
        }
    }

    pub fn calls(&self) -> Vec<PublishCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn publish_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn metrics_count(&self) -> usize {
        self.metrics_calls.lock().map(|c| *c).unwrap_or(0)
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn publish(
        &self,
        post: &ScheduledPost,
        media: &[String],
        caption: &str,
    ) -> Result<Published, PlatformError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(PublishCall {
                post_id: post.id.clone(),
                media: media.to_vec(),
                caption: caption.to_string(),
            });
        }

        if let Some(error) = &self.publish_error {
            return Err(error.clone());
        }

        let external_id = format!("mock-{}-{}", self.platform, post.id);
        Ok(Published {
            permalink: format!("https://mock.{}.test/{}", self.platform, external_id),
            external_id,
        })
    }

    async fn fetch_metrics(&self, external_id: &str) -> Result<MetricsSnapshot, PlatformError> {
        if let Ok(mut count) = self.metrics_calls.lock() {
            *count += 1;
        }
        let map = self
            .metrics
            .lock()
            .map_err(|_| PlatformError::Network("mock metrics lock poisoned".to_string()))?;
        map.get(external_id)
            .cloned()
            .unwrap_or_else(|| Ok(MetricsSnapshot::default()))
    }
}
