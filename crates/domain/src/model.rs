//! Domain models and value objects

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Review status of a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostStatus {
    #[default]
    AwaitingReview,
    Approved,
    Published,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::AwaitingReview => "AWAITING_REVIEW",
            PostStatus::Approved => "APPROVED",
            PostStatus::Published => "PUBLISHED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "AWAITING_REVIEW" => Some(PostStatus::AwaitingReview),
            "APPROVED" => Some(PostStatus::Approved),
            "PUBLISHED" => Some(PostStatus::Published),
            _ => None,
        }
    }
}

/// Where the underlying article came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    #[default]
    Official,
    Media,
    Weibo,
    Manual,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Official => "OFFICIAL",
            SourceKind::Media => "MEDIA",
            SourceKind::Weibo => "WEIBO",
            SourceKind::Manual => "MANUAL",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "OFFICIAL" => Some(SourceKind::Official),
            "MEDIA" => Some(SourceKind::Media),
            "WEIBO" => Some(SourceKind::Weibo),
            "MANUAL" => Some(SourceKind::Manual),
            _ => None,
        }
    }

    /// Attribution label shown in rendered posts
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Official => "Official",
            SourceKind::Media => "Media",
            SourceKind::Weibo => "Weibo",
            SourceKind::Manual => "Editorial",
        }
    }
}

/// A unit of reviewed content eligible for publication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    /// Store identifier
    pub id: String,
    #[serde(default)]
    pub status: PostStatus,
    /// Translated title, if the article had one
    #[serde(default)]
    pub title: Option<String>,
    /// Translated summary text
    pub summary: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub source: SourceKind,
    /// Canonical link to the original article
    #[serde(default)]
    pub source_url: String,
    /// Images scraped with the article, in page order
    #[serde(default)]
    pub image_urls: Vec<String>,
    /// Curated card image, preferred over scraped images
    #[serde(default)]
    pub card_image_url: Option<String>,
    /// Platform post ID, set once published
    #[serde(default)]
    pub external_post_id: Option<String>,
    #[serde(with = "time::serde::rfc3339", default = "now_utc")]
    pub created_at: OffsetDateTime,
}

fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

impl Post {
    pub fn is_published(&self) -> bool {
        self.status == PostStatus::Published
    }

    /// Whether the URL is one of the images scraped with the article
    pub fn is_scraped_image(&self, url: &str) -> bool {
        self.image_urls.iter().any(|u| u == url)
    }
}

/// Partial update applied to a stored post
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostPatch {
    pub status: Option<PostStatus>,
    pub external_post_id: Option<String>,
}

impl PostPatch {
    pub fn approved() -> Self {
        Self {
            status: Some(PostStatus::Approved),
            external_post_id: None,
        }
    }

    /// Status and external ID are always written together
    pub fn published(external_post_id: impl Into<String>) -> Self {
        Self {
            status: Some(PostStatus::Published),
            external_post_id: Some(external_post_id.into()),
        }
    }

    pub fn apply(&self, post: &mut Post) {
        if let Some(status) = self.status {
            post.status = status;
        }
        if let Some(ref id) = self.external_post_id {
            post.external_post_id = Some(id.clone());
        }
    }
}

/// Classification of the image attached to a publish attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaSource {
    /// No media was attempted
    #[default]
    None,
    Scraped,
    AiGenerated,
    /// Every candidate and generator failed; the post goes out text-only
    Failed,
}

impl MediaSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaSource::None => "NONE",
            MediaSource::Scraped => "SCRAPED",
            MediaSource::AiGenerated => "AI_GENERATED",
            MediaSource::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "NONE" => Some(MediaSource::None),
            "SCRAPED" => Some(MediaSource::Scraped),
            "AI_GENERATED" => Some(MediaSource::AiGenerated),
            "FAILED" => Some(MediaSource::Failed),
            _ => None,
        }
    }
}

/// One image source to try during media resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCandidate {
    pub url: String,
    pub source: MediaSource,
}

/// Outcome of media resolution: at most one uploaded media handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub media_id: Option<String>,
    pub source: MediaSource,
}

impl ResolvedMedia {
    pub fn uploaded(media_id: impl Into<String>, source: MediaSource) -> Self {
        Self {
            media_id: Some(media_id.into()),
            source,
        }
    }

    pub fn none(source: MediaSource) -> Self {
        Self {
            media_id: None,
            source,
        }
    }

    pub fn media_ids(&self) -> Vec<String> {
        self.media_id.iter().cloned().collect()
    }
}

/// A fully rendered post ready for the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingPost {
    pub text: String,
    pub media_ids: Vec<String>,
}

/// Message sent to the chat webhook after a successful publish
#[derive(Debug, Clone, Serialize)]
pub struct PublishedNotice {
    pub post_id: String,
    pub title: Option<String>,
    pub external_url: String,
    pub media_source: MediaSource,
}
