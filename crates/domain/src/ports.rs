//! Port definitions (traits) for external dependencies
//!
//! These traits define the boundaries between the domain and external systems.
//! Adapters implement these traits to connect to real infrastructure.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::model::{OutgoingPost, Post, PostPatch, PublishedNotice};
use crate::publication::{PublicationRecord, RecordIntegrityError, RecordPatch};

/// Error type for record storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A concurrent writer changed the record since it was read
    #[error("Write conflict: {0}")]
    Conflict(String),
}

impl From<RecordIntegrityError> for StoreError {
    fn from(error: RecordIntegrityError) -> Self {
        StoreError::Serialization(error.to_string())
    }
}

/// Port for persisting posts and their publication records
///
/// Atomicity across the two tables is the caller's responsibility.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_publication_record(
        &self,
        post_id: &str,
    ) -> Result<Option<PublicationRecord>, StoreError>;

    /// Compare-and-set write; returns the record as stored (with its new version).
    /// Fails with [`StoreError::Conflict`] when the patch's expected version
    /// no longer matches.
    async fn create_or_update_publication_record(
        &self,
        post_id: &str,
        patch: &RecordPatch,
    ) -> Result<PublicationRecord, StoreError>;

    async fn get_post(&self, post_id: &str) -> Result<Option<Post>, StoreError>;

    async fn update_post(&self, post_id: &str, patch: &PostPatch) -> Result<Post, StoreError>;

    /// Insert a new post; an existing ID is a conflict
    async fn insert_post(&self, post: &Post) -> Result<(), StoreError>;
}

/// Error type for media uploads
///
/// Every variant is recoverable by trying the next candidate.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Download failed with status {status}: {url}")]
    Download { status: u16, url: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),
    #[error("Image too large: {size} > {max} bytes")]
    TooLarge { size: usize, max: usize },
    #[error("Upload failed with status {status}: {body}")]
    Upload { status: u16, body: String },
    #[error("Invalid upload response: {0}")]
    InvalidResponse(String),
}

/// Port for uploading an image to the platform
#[async_trait]
pub trait MediaUploader: Send + Sync {
    /// Download the image at `url` and upload it, returning the platform media ID
    async fn upload_from_url(&self, url: &str) -> Result<String, UploadError>;
}

/// Error type for image generation
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Provider returned no image")]
    EmptyResponse,
}

/// Port for on-demand image generation
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generate an illustration and return a downloadable URL
    async fn generate_image(&self, title: &str, summary: &str) -> Result<String, GenerateError>;

    /// Provider name for logging (e.g., "dalle", "together")
    fn provider(&self) -> &'static str;
}

/// Error type for publisher operations
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("API error ({status}): {detail}")]
    Api { status: u16, detail: String },
    #[error("Rate limited")]
    RateLimited,
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Content too long: {len} > {max}")]
    ContentTooLong { len: usize, max: usize },
    #[error("Publisher is disabled")]
    Disabled,
}

/// Result of a successful publish operation
#[derive(Debug, Clone)]
pub struct PublishResult {
    /// Platform-specific post ID
    pub id: String,
    /// Canonical URL of the published post
    pub url: String,
}

/// Port for the signed platform calls
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Create a post with optional attached media
    async fn publish(&self, post: &OutgoingPost) -> Result<PublishResult, PublishError>;

    /// Probe the credentials; never fails, network errors count as invalid
    async fn verify_credentials(&self) -> bool;

    /// Whether credentials are configured at all
    fn is_enabled(&self) -> bool;

    /// Get the platform name (e.g., "x")
    fn platform(&self) -> &'static str;
}

/// Error type for chat notifications
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Webhook error: {0}")]
    Webhook(String),
}

/// Port for the chat webhook notified after publication
#[async_trait]
pub trait ChatNotifier: Send + Sync {
    async fn notify(&self, notice: &PublishedNotice) -> Result<(), NotifyError>;
}

/// Port for time/clock operations (enables deterministic testing)
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> OffsetDateTime;
}

/// Real clock implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}
