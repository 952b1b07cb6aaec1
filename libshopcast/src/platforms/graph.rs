//! Minimal Graph API client shared by the Instagram and Facebook adapters

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::error::PlatformError;
use crate::platforms::api::{join_url, read_json};
use crate::types::Platform;

pub(crate) struct GraphApi {
    client: Client,
    base_url: String,
    access_token: SecretString,
    platform: Platform,
}

impl GraphApi {
    pub(crate) fn new(
        client: Client,
        base_url: &str,
        access_token: SecretString,
        platform: Platform,
    ) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            access_token,
            platform,
        }
    }

    /// `GET /{node}?fields=...`
    pub(crate) async fn fields(&self, node: &str, fields: &str) -> Result<Value, PlatformError> {
        self.get(node, &[("fields", fields)]).await
    }

    pub(crate) async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Value, PlatformError> {
        let response = self
            .client
            .get(join_url(&self.base_url, path))
            .query(query)
            .query(&[("access_token", self.access_token.expose_secret())])
            .send()
            .await?;

        read_json(self.platform, response).await
    }

    pub(crate) async fn post_form(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Value, PlatformError> {
        let mut form: Vec<(&str, &str)> = params.to_vec();
        form.push(("access_token", self.access_token.expose_secret()));

        let response = self
            .client
            .post(join_url(&self.base_url, path))
            .form(&form)
            .send()
            .await?;

        read_json(self.platform, response).await
    }

    /// Pull a string id field out of a response
    pub(crate) fn id_field(&self, body: &Value, field: &str) -> Result<String, PlatformError> {
        body.get(field)
            .and_then(|v| {
                v.as_str()
                    .map(str::to_string)
                    .or_else(|| v.as_i64().map(|n| n.to_string()))
            })
            .ok_or_else(|| PlatformError::Api {
                platform: self.platform.to_string(),
                status: None,
                code: None,
                subcode: None,
                message: format!("response is missing '{}'", field),
            })
    }
}
