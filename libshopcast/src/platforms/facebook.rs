//! Facebook Page photo posts

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::FacebookConfig;
use crate::error::{ConfigError, PlatformError, Result};
use crate::platforms::api::{count, http_client};
use crate::platforms::graph::GraphApi;
use crate::platforms::Publisher;
use crate::settings::PlatformToken;
use crate::types::{MetricsSnapshot, Platform, Published, ScheduledPost};

const ENGAGEMENT_FIELDS: &str = "likes.summary(true),comments.summary(true),shares";
const REACH_INSIGHTS: &str = "post_impressions,post_impressions_unique";

pub struct FacebookPublisher {
    graph: GraphApi,
    page_id: String,
}

impl FacebookPublisher {
    pub fn new(config: &FacebookConfig, token: PlatformToken) -> Result<Self> {
        let page_id = token
            .account_id
            .clone()
            .or_else(|| config.page_id.clone())
            .ok_or_else(|| ConfigError::MissingField("facebook.page_id".to_string()))?;

        Ok(Self {
            graph: GraphApi::new(
                http_client()?,
                &config.graph_base_url,
                token.access_token,
                Platform::Facebook,
            ),
            page_id,
        })
    }
}

pub fn permalink(post_id: &str) -> String {
    format!("https://www.facebook.com/{}", post_id)
}

#[async_trait]
impl Publisher for FacebookPublisher {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    async fn publish(
        &self,
        post: &ScheduledPost,
        media: &[String],
        caption: &str,
    ) -> std::result::Result<Published, PlatformError> {
        let image_url = media
            .first()
            .ok_or_else(|| PlatformError::Validation(format!("post {} has no image", post.id)))?;
        if media.len() > 1 {
            debug!(
                post_id = %post.id,
                images = media.len(),
                "Facebook photo posts use the first image only"
            );
        }

        let body = self
            .graph
            .post_form(
                &format!("{}/photos", self.page_id),
                &[("url", image_url.as_str()), ("caption", caption)],
            )
            .await?;

        // post_id is the feed story; id alone is the photo object
        let external_id = self
            .graph
            .id_field(&body, "post_id")
            .or_else(|_| self.graph.id_field(&body, "id"))?;

        info!(post_id = %post.id, external_id = %external_id, "Published to Facebook");
        Ok(Published {
            permalink: permalink(&external_id),
            external_id,
        })
    }

    async fn fetch_metrics(
        &self,
        external_id: &str,
    ) -> std::result::Result<MetricsSnapshot, PlatformError> {
        let body = self.graph.fields(external_id, ENGAGEMENT_FIELDS).await?;

        let mut metrics = MetricsSnapshot {
            likes: body.pointer("/likes/summary/total_count").map(count).unwrap_or(0),
            comments: body.pointer("/comments/summary/total_count").map(count).unwrap_or(0),
            shares: body.pointer("/shares/count").map(count).unwrap_or(0),
            ..MetricsSnapshot::default()
        };

        let path = format!("{}/insights", external_id);
        match self.graph.get(&path, &[("metric", REACH_INSIGHTS)]).await {
            Ok(insights) => {
                for item in insights.get("data").and_then(Value::as_array).into_iter().flatten() {
                    let value = item.pointer("/values/0/value").map(count).unwrap_or(0);
                    match item.get("name").and_then(Value::as_str) {
                        Some("post_impressions") => metrics.impressions = value,
                        Some("post_impressions_unique") => metrics.reach = value,
                        _ => {}
                    }
                }
            }
            Err(e) => debug!(external_id, error = %e, "Page post insights unavailable"),
        }

        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permalink_format() {
        assert_eq!(permalink("123_456"), "https://www.facebook.com/123_456");
    }

    #[test]
    fn test_page_id_from_token_wins() {
        let config = FacebookConfig {
            page_id: Some("config-page".to_string()),
            ..FacebookConfig::default()
        };
        let token = PlatformToken::new("t").with_account("token-page");
        let publisher = FacebookPublisher::new(&config, token).unwrap();
        assert_eq!(publisher.page_id, "token-page");
    }

    #[test]
    fn test_missing_page_id() {
        let result = FacebookPublisher::new(&FacebookConfig::default(), PlatformToken::new("t"));
        assert!(result.is_err());
    }
}
