//! Caption and hashtag generation
//!
//! Generation is delegated to an external text service behind
//! [`CaptionGenerator`]. Requests carry the product, the desired tone, the
//! target platform and the hashtags that have performed best so far.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Platform, Product};

pub mod http;
pub mod mock;

pub use http::HttpCaptionGenerator;
pub use mock::MockCaptionGenerator;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GenerationKind {
    Caption,
    Hashtags,
    Score,
    Recommendations,
}

/// What past posts taught us
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LearningContext {
    pub top_hashtags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    #[serde(rename = "type")]
    pub kind: GenerationKind,
    pub product: Product,
    pub tone: String,
    pub platform: Platform,
    pub learning_context: LearningContext,
}

impl GenerationRequest {
    pub fn new(kind: GenerationKind, product: &Product, tone: &str, platform: Platform) -> Self {
        Self {
            kind,
            product: product.clone(),
            tone: tone.to_string(),
            platform,
            learning_context: LearningContext::default(),
        }
    }

    pub fn with_learning(mut self, context: LearningContext) -> Self {
        self.learning_context = context;
        self
    }
}

/// Only the field matching the request kind is expected to be set
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationResponse {
    pub caption: Option<String>,
    pub hashtags: Vec<String>,
    pub score: Option<f64>,
    pub recommendations: Vec<String>,
}

#[async_trait]
pub trait CaptionGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse>;
}

/// Hashtags as stored: no leading `#`, no blanks, no duplicates
pub fn normalize_hashtags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = Vec::new();
    for tag in tags {
        let cleaned = tag.as_ref().trim().trim_start_matches('#').trim().to_string();
        if !cleaned.is_empty() && !seen.contains(&cleaned) {
            seen.push(cleaned);
        }
    }
    seen
}
