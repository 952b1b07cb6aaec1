//! Caption generator backed by an HTTP text service

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::config::GeneratorConfig;
use crate::error::{ConfigError, Result, ShopcastError};
use crate::generation::{CaptionGenerator, GenerationRequest, GenerationResponse};

pub struct HttpCaptionGenerator {
    http: Client,
    endpoint: String,
    api_key: Option<SecretString>,
}

impl HttpCaptionGenerator {
    /// The API key is read from the env var named by `api_key_env`, if set
    pub fn from_config(config: &GeneratorConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| ConfigError::MissingField("generator.endpoint".to_string()))?;
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ShopcastError::Generation(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl CaptionGenerator for HttpCaptionGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse> {
        debug!(kind = ?request.kind, product_id = %request.product.id, "Requesting generation");

        let mut builder = self.http.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| ShopcastError::Generation(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ShopcastError::Generation(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text.trim()
            )));
        }

        resp.json::<GenerationResponse>()
            .await
            .map_err(|e| ShopcastError::Generation(format!("unreadable response: {}", e)))
    }
}
