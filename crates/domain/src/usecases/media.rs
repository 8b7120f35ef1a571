//! Media resolution use case - picks and uploads at most one image per attempt

use std::sync::Arc;

use crate::model::{MediaCandidate, MediaSource, Post, ResolvedMedia};
use crate::ports::{ImageGenerator, MediaUploader};

/// Resolves the image to attach to a post
///
/// Candidates are tried strictly in priority order and the first successful
/// upload wins. Upload and generation failures are logged and recovered
/// locally; resolution itself never fails.
pub struct MediaResolver<U>
where
    U: MediaUploader + ?Sized,
{
    uploader: Arc<U>,
    generators: Vec<Arc<dyn ImageGenerator>>,
}

impl<U> Clone for MediaResolver<U>
where
    U: MediaUploader + ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            uploader: Arc::clone(&self.uploader),
            generators: self.generators.clone(),
        }
    }
}

impl<U> MediaResolver<U>
where
    U: MediaUploader + ?Sized,
{
    /// `generators` are tried in order when no candidate uploads
    pub fn new(uploader: Arc<U>, generators: Vec<Arc<dyn ImageGenerator>>) -> Self {
        Self {
            uploader,
            generators,
        }
    }

    /// Ordered candidate list for a post
    ///
    /// An override short-circuits everything else. Otherwise the card image
    /// comes first, then scraped images not already listed.
    pub fn candidates(post: &Post, image_override: Option<&str>) -> Vec<MediaCandidate> {
        let classify = |url: &str| {
            if post.is_scraped_image(url) {
                MediaSource::Scraped
            } else {
                MediaSource::AiGenerated
            }
        };

        if let Some(url) = normalize_override(image_override) {
            return vec![MediaCandidate {
                url: url.to_string(),
                source: classify(url),
            }];
        }

        let mut candidates: Vec<MediaCandidate> = Vec::new();

        if let Some(card) = post
            .card_image_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
        {
            candidates.push(MediaCandidate {
                url: card.to_string(),
                source: classify(card),
            });
        }

        for url in post.image_urls.iter().map(|u| u.trim()) {
            if url.is_empty() || candidates.iter().any(|c| c.url == url) {
                continue;
            }
            candidates.push(MediaCandidate {
                url: url.to_string(),
                source: MediaSource::Scraped,
            });
        }

        candidates
    }

    /// Produce zero or one uploaded media handle for this attempt
    pub async fn resolve(&self, post: &Post, image_override: Option<&str>) -> ResolvedMedia {
        let image_override = normalize_override(image_override);
        let candidates = Self::candidates(post, image_override);

        for (index, candidate) in candidates.iter().enumerate() {
            match self.uploader.upload_from_url(&candidate.url).await {
                Ok(media_id) => {
                    tracing::info!(
                        post_id = %post.id,
                        candidate = index,
                        source = candidate.source.as_str(),
                        media_id = %media_id,
                        "Uploaded media candidate"
                    );
                    return ResolvedMedia::uploaded(media_id, candidate.source);
                }
                Err(e) => {
                    tracing::warn!(
                        post_id = %post.id,
                        candidate = index,
                        url = %candidate.url,
                        error = %e,
                        "Media candidate failed, trying next"
                    );
                }
            }
        }

        if image_override.is_some() {
            tracing::warn!(post_id = %post.id, "Override image failed, publishing without media");
            return ResolvedMedia::none(MediaSource::Failed);
        }

        self.generate_and_upload(post).await
    }

    /// Ask each generator in turn for an image, then upload the first URL
    /// obtained exactly once
    async fn generate_and_upload(&self, post: &Post) -> ResolvedMedia {
        let title = post.title.as_deref().unwrap_or_default();

        for generator in &self.generators {
            let url = match generator.generate_image(title, &post.summary).await {
                Ok(url) if !url.trim().is_empty() => url,
                Ok(_) => {
                    tracing::warn!(
                        post_id = %post.id,
                        provider = generator.provider(),
                        "Image generator returned an empty URL"
                    );
                    continue;
                }
                Err(e) => {
                    tracing::warn!(
                        post_id = %post.id,
                        provider = generator.provider(),
                        error = %e,
                        "Image generator unavailable"
                    );
                    continue;
                }
            };

            return match self.uploader.upload_from_url(&url).await {
                Ok(media_id) => {
                    tracing::info!(
                        post_id = %post.id,
                        provider = generator.provider(),
                        media_id = %media_id,
                        "Uploaded generated image"
                    );
                    ResolvedMedia::uploaded(media_id, MediaSource::AiGenerated)
                }
                Err(e) => {
                    tracing::warn!(
                        post_id = %post.id,
                        provider = generator.provider(),
                        error = %e,
                        "Generated image upload failed, publishing without media"
                    );
                    ResolvedMedia::none(MediaSource::Failed)
                }
            };
        }

        tracing::warn!(post_id = %post.id, "No media available, publishing text-only");
        ResolvedMedia::none(MediaSource::Failed)
    }
}

/// Blank overrides count as no override
fn normalize_override(image_override: Option<&str>) -> Option<&str> {
    image_override.map(str::trim).filter(|u| !u.is_empty())
}
