//! Instagram publishing through the Graph API container flow
//!
//! Media is first uploaded into a container, which Instagram processes
//! asynchronously. The container is polled until `FINISHED` and then
//! published. Carousels create one child container per image, wait on each,
//! then wrap them in a `CAROUSEL` parent that is polled and published the
//! same way.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::InstagramConfig;
use crate::error::{ConfigError, PlatformError, Result};
use crate::platforms::api::{count, http_client};
use crate::platforms::graph::GraphApi;
use crate::platforms::Publisher;
use crate::polling::{poll_until, PollError, PollPolicy, PollStatus};
use crate::settings::PlatformToken;
use crate::types::{MetricsSnapshot, Platform, Published, ScheduledPost};

pub const MIN_CAROUSEL_ITEMS: usize = 2;
pub const MAX_CAROUSEL_ITEMS: usize = 10;

const BASIC_FIELDS: &str = "like_count,comments_count,permalink";
const FEED_INSIGHTS: &str = "impressions,reach,saved";
const REELS_INSIGHTS: &str = "plays,reach,saved,shares";

pub struct InstagramPublisher {
    graph: GraphApi,
    account_id: String,
    poll: PollPolicy,
}

impl InstagramPublisher {
    /// The account id comes from the token, falling back to `instagram.account_id`
    pub fn new(config: &InstagramConfig, token: PlatformToken) -> Result<Self> {
        let account_id = token
            .account_id
            .clone()
            .or_else(|| config.account_id.clone())
            .ok_or_else(|| ConfigError::MissingField("instagram.account_id".to_string()))?;

        Ok(Self {
            graph: GraphApi::new(
                http_client()?,
                &config.graph_base_url,
                token.access_token,
                Platform::Instagram,
            ),
            account_id,
            poll: PollPolicy::fixed(
                Duration::from_millis(config.poll_interval_ms),
                config.max_poll_attempts,
            ),
        })
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    async fn create_container(
        &self,
        params: &[(&str, &str)],
    ) -> std::result::Result<String, PlatformError> {
        let body = self
            .graph
            .post_form(&format!("{}/media", self.account_id), params)
            .await?;
        self.graph.id_field(&body, "id")
    }

    async fn wait_for_container(
        &self,
        container_id: &str,
    ) -> std::result::Result<(), PlatformError> {
        let graph = &self.graph;

        let outcome = poll_until(&self.poll, |attempt| async move {
            let body = graph.fields(container_id, "status_code").await?;
            let status = body.get("status_code").and_then(Value::as_str).unwrap_or("IN_PROGRESS");
            debug!(container_id, attempt, status, "Container status");

            Ok::<_, PlatformError>(match status {
                "FINISHED" | "PUBLISHED" => PollStatus::Ready(()),
                "IN_PROGRESS" => PollStatus::Pending,
                other => PollStatus::Failed(other.to_string()),
            })
        })
        .await;

        outcome.map_err(|e| match e {
            PollError::TimedOut { attempts } => PlatformError::ContainerTimeout {
                container_id: container_id.to_string(),
                attempts,
            },
            PollError::Failed(status) => PlatformError::ContainerFailed {
                container_id: container_id.to_string(),
                status,
            },
            PollError::Check(e) => e,
        })
    }

    async fn publish_container(
        &self,
        creation_id: &str,
    ) -> std::result::Result<Published, PlatformError> {
        let body = self
            .graph
            .post_form(
                &format!("{}/media_publish", self.account_id),
                &[("creation_id", creation_id)],
            )
            .await?;
        let media_id = self.graph.id_field(&body, "id")?;
        let permalink = self.permalink(&media_id).await;

        info!(media_id = %media_id, "Published to Instagram");
        Ok(Published {
            external_id: media_id,
            permalink,
        })
    }

    async fn permalink(&self, media_id: &str) -> String {
        match self.graph.fields(media_id, "permalink").await {
            Ok(body) => {
                if let Some(link) = body.get("permalink").and_then(Value::as_str) {
                    return link.to_string();
                }
                warn!(media_id, "Permalink missing from media lookup");
            }
            Err(e) => warn!(media_id, error = %e, "Permalink lookup failed"),
        }
        format!("instagram://media?id={}", media_id)
    }

    pub async fn publish_single(
        &self,
        image_url: &str,
        caption: &str,
    ) -> std::result::Result<Published, PlatformError> {
        let container_id = self
            .create_container(&[("image_url", image_url), ("caption", caption)])
            .await?;
        self.wait_for_container(&container_id).await?;
        self.publish_container(&container_id).await
    }

    /// Publish 2-10 images as one carousel post
    ///
    /// The image count is checked before any request is made.
    pub async fn publish_carousel(
        &self,
        image_urls: &[String],
        caption: &str,
    ) -> std::result::Result<Published, PlatformError> {
        validate_carousel(image_urls.len())?;

        let mut children = Vec::with_capacity(image_urls.len());
        for url in image_urls {
            let child = self
                .create_container(&[("image_url", url.as_str()), ("is_carousel_item", "true")])
                .await?;
            children.push(child);
        }

        for child in &children {
            self.wait_for_container(child).await?;
        }

        let children_param = children.join(",");
        let parent = self
            .create_container(&[
                ("media_type", "CAROUSEL"),
                ("children", children_param.as_str()),
                ("caption", caption),
            ])
            .await?;
        self.wait_for_container(&parent).await?;
        self.publish_container(&parent).await
    }

    async fn insights(&self, media_id: &str) -> Option<Value> {
        let path = format!("{}/insights", media_id);
        match self.graph.get(&path, &[("metric", FEED_INSIGHTS)]).await {
            Ok(body) => return Some(body),
            Err(e) => debug!(media_id, error = %e, "Feed insights rejected, trying Reels metrics"),
        }
        match self.graph.get(&path, &[("metric", REELS_INSIGHTS)]).await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!(media_id, error = %e, "Insights unavailable");
                None
            }
        }
    }
}

pub fn validate_carousel(images: usize) -> std::result::Result<(), PlatformError> {
    if !(MIN_CAROUSEL_ITEMS..=MAX_CAROUSEL_ITEMS).contains(&images) {
        return Err(PlatformError::Validation(format!(
            "Instagram carousels need {}-{} images, got {}",
            MIN_CAROUSEL_ITEMS, MAX_CAROUSEL_ITEMS, images
        )));
    }
    Ok(())
}

fn apply_insights(metrics: &mut MetricsSnapshot, body: &Value) {
    let Some(data) = body.get("data").and_then(Value::as_array) else {
        return;
    };

    for insight in data {
        let name = insight.get("name").and_then(Value::as_str).unwrap_or_default();
        let value = insight
            .pointer("/values/0/value")
            .or_else(|| insight.pointer("/total_value/value"))
            .map(count)
            .unwrap_or(0);

        match name {
            "impressions" | "plays" => metrics.impressions = value,
            "reach" => metrics.reach = value,
            "saved" => metrics.saves = value,
            "shares" => metrics.shares = value,
            _ => {}
        }
    }
}

#[async_trait]
impl Publisher for InstagramPublisher {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn publish(
        &self,
        post: &ScheduledPost,
        media: &[String],
        caption: &str,
    ) -> std::result::Result<Published, PlatformError> {
        match media {
            [] => Err(PlatformError::Validation(format!("post {} has no image", post.id))),
            [single] => self.publish_single(single, caption).await,
            many => self.publish_carousel(many, caption).await,
        }
    }

    async fn fetch_metrics(
        &self,
        external_id: &str,
    ) -> std::result::Result<MetricsSnapshot, PlatformError> {
        let basic = self.graph.fields(external_id, BASIC_FIELDS).await?;

        let mut metrics = MetricsSnapshot {
            likes: basic.get("like_count").map(count).unwrap_or(0),
            comments: basic.get("comments_count").map(count).unwrap_or(0),
            permalink: basic.get("permalink").and_then(Value::as_str).map(str::to_string),
            ..MetricsSnapshot::default()
        };

        if let Some(insights) = self.insights(external_id).await {
            apply_insights(&mut metrics, &insights);
        }

        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_carousel_bounds() {
        assert!(validate_carousel(1).is_err());
        assert!(validate_carousel(2).is_ok());
        assert!(validate_carousel(10).is_ok());
        assert!(matches!(validate_carousel(11), Err(PlatformError::Validation(_))));
    }

    #[test]
    fn test_feed_insights_parsed() {
        let mut metrics = MetricsSnapshot::default();
        apply_insights(
            &mut metrics,
            &json!({"data": [
                {"name": "impressions", "values": [{"value": 900}]},
                {"name": "reach", "values": [{"value": 640}]},
                {"name": "saved", "values": [{"value": 12}]}
            ]}),
        );
        assert_eq!(metrics.impressions, 900);
        assert_eq!(metrics.reach, 640);
        assert_eq!(metrics.saves, 12);
    }

    #[test]
    fn test_reels_insights_parsed() {
        let mut metrics = MetricsSnapshot::default();
        apply_insights(
            &mut metrics,
            &json!({"data": [
                {"name": "plays", "values": [{"value": 3000}]},
                {"name": "shares", "total_value": {"value": 8}}
            ]}),
        );
        assert_eq!(metrics.impressions, 3000);
        assert_eq!(metrics.shares, 8);
    }

    #[test]
    fn test_missing_account_id_is_config_error() {
        let result = InstagramPublisher::new(&InstagramConfig::default(), PlatformToken::new("t"));
        assert!(matches!(
            result,
            Err(crate::ShopcastError::Config(ConfigError::MissingField(_)))
        ));
    }
}
