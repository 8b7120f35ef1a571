//! Image-generation provider adapters

pub mod dalle;
pub mod stub;
pub mod together;

pub use dalle::DalleImageGenerator;
pub use stub::StubImageGenerator;
pub use together::TogetherImageGenerator;

use serde::{Deserialize, Serialize};

/// Common image-generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGenConfig {
    /// Model name/ID
    pub model: String,
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
    /// Diffusion steps (ignored by providers without the knob)
    pub steps: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ImageGenConfig {
    fn default() -> Self {
        Self {
            model: "dall-e-3".to_string(),
            width: 1024,
            height: 1024,
            steps: 4,
            timeout_secs: 90,
        }
    }
}

impl ImageGenConfig {
    pub fn size(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

const SUMMARY_PROMPT_CHARS: usize = 400;

/// Build the editorial illustration prompt
pub fn build_image_prompt(title: &str, summary: &str) -> String {
    let summary: String = summary.trim().chars().take(SUMMARY_PROMPT_CHARS).collect();
    let title = title.trim();

    let subject = if title.is_empty() {
        summary
    } else if summary.is_empty() {
        title.to_string()
    } else {
        format!("{}. {}", title, summary)
    };

    format!(
        "Editorial illustration for an electric-vehicle industry news story: {} \
         Clean, modern, photorealistic style. No text, no logos, no watermarks.",
        subject
    )
}

/// Response shape shared by both providers
#[derive(Deserialize)]
pub(crate) struct ImagesResponse {
    #[serde(default)]
    pub data: Vec<ImageData>,
}

#[derive(Deserialize)]
pub(crate) struct ImageData {
    pub url: Option<String>,
}

impl ImagesResponse {
    pub(crate) fn first_url(self) -> Option<String> {
        self.data
            .into_iter()
            .filter_map(|d| d.url)
            .find(|u| !u.trim().is_empty())
    }
}
