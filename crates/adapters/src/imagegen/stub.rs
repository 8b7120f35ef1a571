//! Stub image generator for testing and offline mode

use async_trait::async_trait;
use outpost_domain::{GenerateError, ImageGenerator};

/// Stub generator that returns a fixed URL or reports itself unavailable
#[derive(Debug, Clone)]
pub struct StubImageGenerator {
    url: Option<String>,
}

impl StubImageGenerator {
    /// Always returns `url`
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
        }
    }

    /// Always unavailable
    pub fn unavailable() -> Self {
        Self { url: None }
    }
}

#[async_trait]
impl ImageGenerator for StubImageGenerator {
    async fn generate_image(&self, _title: &str, _summary: &str) -> Result<String, GenerateError> {
        self.url
            .clone()
            .ok_or_else(|| GenerateError::Unavailable("stub generator disabled".to_string()))
    }

    fn provider(&self) -> &'static str {
        "stub"
    }
}
