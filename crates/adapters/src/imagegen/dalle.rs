//! OpenAI Images API adapter

use async_trait::async_trait;
use outpost_domain::{GenerateError, ImageGenerator};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;

use super::{ImageGenConfig, ImagesResponse, build_image_prompt};

/// Image generator using the OpenAI images endpoint
pub struct DalleImageGenerator {
    client: Client,
    api_key: Option<SecretString>,
    base_url: String,
    config: ImageGenConfig,
}

impl DalleImageGenerator {
    pub fn new(client: Client, api_key: Option<SecretString>, config: ImageGenConfig) -> Self {
        Self::with_base_url(
            client,
            api_key,
            "https://api.openai.com/v1".to_string(),
            config,
        )
    }

    pub fn with_base_url(
        client: Client,
        api_key: Option<SecretString>,
        base_url: String,
        config: ImageGenConfig,
    ) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            config,
        }
    }
}

#[derive(Serialize)]
struct DalleRequest {
    model: String,
    prompt: String,
    n: u32,
    size: String,
}

#[async_trait]
impl ImageGenerator for DalleImageGenerator {
    async fn generate_image(&self, title: &str, summary: &str) -> Result<String, GenerateError> {
        let api_key = self
            .api_key
            .as_ref()
            .filter(|k| !k.expose_secret().is_empty())
            .ok_or_else(|| GenerateError::Unavailable("API key not configured".to_string()))?;

        let request = DalleRequest {
            model: self.config.model.clone(),
            prompt: build_image_prompt(title, summary),
            n: 1,
            size: self.config.size(),
        };

        let url = format!("{}/images/generations", self.base_url);

        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .header("Authorization", format!("Bearer {}", api_key.expose_secret()))
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerateError::Api(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerateError::Api(format!(
                "API returned {}: {}",
                status, body
            )));
        }

        let images: ImagesResponse = response
            .json()
            .await
            .map_err(|e| GenerateError::Api(e.to_string()))?;

        images.first_url().ok_or(GenerateError::EmptyResponse)
    }

    fn provider(&self) -> &'static str {
        "dalle"
    }
}
