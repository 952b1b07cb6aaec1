//! Deterministic caption generator for tests

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Result, ShopcastError};
use crate::generation::{CaptionGenerator, GenerationKind, GenerationRequest, GenerationResponse};

#[derive(Debug, Clone, Default)]
pub struct MockCaptionGenerator {
    failing_products: HashSet<String>,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl MockCaptionGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every request about `product_id`
    pub fn failing_for(mut self, product_id: &str) -> Self {
        self.failing_products.insert(product_id.to_string());
        self
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn caption_requests(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.kind == GenerationKind::Caption)
            .count()
    }
}

#[async_trait]
impl CaptionGenerator for MockCaptionGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if self.failing_products.contains(&request.product.id) {
            return Err(ShopcastError::Generation(format!(
                "mock generator refused {}",
                request.product.id
            )));
        }

        let product = &request.product;
        Ok(match request.kind {
            GenerationKind::Caption => GenerationResponse {
                caption: Some(format!(
                    "[{}] {} for {}",
                    request.tone, product.name, request.platform
                )),
                ..GenerationResponse::default()
            },
            GenerationKind::Hashtags => {
                let mut hashtags = vec![product.slug.replace('-', ""), "shop".to_string()];
                hashtags.extend(request.learning_context.top_hashtags.iter().take(2).cloned());
                GenerationResponse {
                    hashtags,
                    ..GenerationResponse::default()
                }
            }
            GenerationKind::Score => GenerationResponse {
                score: Some(0.5),
                ..GenerationResponse::default()
            },
            GenerationKind::Recommendations => GenerationResponse {
                recommendations: vec![format!("Feature {} in the first line", product.name)],
                ..GenerationResponse::default()
            },
        })
    }
}
