//! X (Twitter) API adapters

mod media;
pub mod signer;
mod write;

pub use media::{DEFAULT_MAX_IMAGE_BYTES, XMediaUploader};
pub use signer::{OAuthCredentials, RequestSigner};
pub use write::{DEFAULT_API_BASE_URL, XPublisher};

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use outpost_domain::{
    MediaUploader, OutgoingPost, PublishError, PublishResult, Publisher, UploadError,
};
use reqwest::Client;

/// Shared HTTP client for all platform calls
pub fn build_http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("outpost/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Stub X publisher for testing and dry runs
pub struct StubXPublisher {
    enabled: bool,
    published: Mutex<Vec<OutgoingPost>>,
}

impl StubXPublisher {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            published: Mutex::new(vec![]),
        }
    }

    /// Get all posts that were published
    pub fn get_published(&self) -> Vec<OutgoingPost> {
        self.published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Publisher for StubXPublisher {
    async fn publish(&self, post: &OutgoingPost) -> Result<PublishResult, PublishError> {
        if !self.enabled {
            return Err(PublishError::Disabled);
        }

        let count = match self.published.lock() {
            Ok(mut published) => {
                published.push(post.clone());
                published.len()
            }
            Err(_) => return Err(PublishError::Network("stub state poisoned".to_string())),
        };

        let id = format!("stub_{}", count);
        Ok(PublishResult {
            url: XPublisher::status_url(&id),
            id,
        })
    }

    async fn verify_credentials(&self) -> bool {
        self.enabled
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn platform(&self) -> &'static str {
        "x"
    }
}

/// Stub uploader that accepts every URL
#[derive(Debug, Default)]
pub struct StubMediaUploader;

#[async_trait]
impl MediaUploader for StubMediaUploader {
    async fn upload_from_url(&self, url: &str) -> Result<String, UploadError> {
        if url.trim().is_empty() {
            return Err(UploadError::Download {
                status: 0,
                url: url.to_string(),
            });
        }
        Ok(format!("stub_media_{}", url.len()))
    }
}
