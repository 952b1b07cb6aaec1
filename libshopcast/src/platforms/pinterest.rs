//! Pinterest v5 pin creation

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::config::PinterestConfig;
use crate::error::{PlatformError, Result};
use crate::platforms::api::{count, http_client, join_url, read_json};
use crate::platforms::Publisher;
use crate::settings::PlatformToken;
use crate::types::{MetricsSnapshot, Platform, Published, ScheduledPost};

pub struct PinterestPublisher {
    client: Client,
    base_url: String,
    access_token: SecretString,
    default_board_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct MediaSource<'a> {
    source_type: &'static str,
    url: &'a str,
}

#[derive(Debug, Serialize)]
struct CreatePin<'a> {
    board_id: &'a str,
    media_source: MediaSource<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    link: Option<&'a str>,
}

impl PinterestPublisher {
    pub fn new(config: &PinterestConfig, token: PlatformToken) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: config.api_base_url.clone(),
            access_token: token.access_token,
            default_board_id: config.default_board_id.clone(),
        })
    }
}

pub fn permalink(pin_id: &str) -> String {
    format!("https://www.pinterest.com/pin/{}/", pin_id)
}

#[async_trait]
impl Publisher for PinterestPublisher {
    fn platform(&self) -> Platform {
        Platform::Pinterest
    }

    async fn publish(
        &self,
        post: &ScheduledPost,
        media: &[String],
        caption: &str,
    ) -> std::result::Result<Published, PlatformError> {
        let board_id = post
            .board_id
            .as_deref()
            .or(self.default_board_id.as_deref())
            .ok_or_else(|| {
                PlatformError::Validation(format!("post {} has no Pinterest board", post.id))
            })?;
        let image_url = media
            .first()
            .ok_or_else(|| PlatformError::Validation(format!("post {} has no image", post.id)))?;

        let request = CreatePin {
            board_id,
            media_source: MediaSource {
                source_type: "image_url",
                url: image_url,
            },
            title: post.title.as_deref(),
            description: caption,
            link: post.link.as_deref(),
        };

        let response = self
            .client
            .post(join_url(&self.base_url, "pins"))
            .bearer_auth(self.access_token.expose_secret())
            .json(&request)
            .send()
            .await?;
        let body = read_json(Platform::Pinterest, response).await?;

        let pin_id = body
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PlatformError::Api {
                platform: Platform::Pinterest.to_string(),
                status: None,
                code: None,
                subcode: None,
                message: "response is missing 'id'".to_string(),
            })?;

        info!(post_id = %post.id, pin_id = %pin_id, "Created Pinterest pin");
        Ok(Published {
            permalink: permalink(&pin_id),
            external_id: pin_id,
        })
    }

    async fn fetch_metrics(
        &self,
        external_id: &str,
    ) -> std::result::Result<MetricsSnapshot, PlatformError> {
        let response = self
            .client
            .get(join_url(&self.base_url, &format!("pins/{}", external_id)))
            .query(&[("pin_metrics", "true")])
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await?;
        let body = read_json(Platform::Pinterest, response).await?;

        let lifetime = body
            .pointer("/pin_metrics/lifetime_metrics")
            .cloned()
            .unwrap_or(Value::Null);
        let metric = |name: &str| lifetime.get(name).map(count).unwrap_or(0);

        // Pinterest reports no unique reach; impressions stand in for it
        let impressions = metric("impression");
        Ok(MetricsSnapshot {
            likes: metric("reaction"),
            comments: metric("comment"),
            saves: metric("save"),
            shares: 0,
            impressions,
            reach: impressions,
            permalink: Some(permalink(external_id)),
        })
    }
}
