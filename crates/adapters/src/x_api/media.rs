//! X API media adapter: download an image and upload it for attachment

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use outpost_domain::{MediaUploader, UploadError};
use reqwest::{Client, Response};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;

use super::signer::RequestSigner;

/// Platform limit for still images
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Uploads remote images to the platform's media endpoint
pub struct XMediaUploader {
    client: Client,
    signer: RequestSigner,
    base_url: String,
    max_bytes: usize,
}

impl XMediaUploader {
    pub fn new(client: Client, signer: RequestSigner, base_url: String, max_bytes: usize) -> Self {
        Self {
            client,
            signer,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_bytes,
        }
    }

    async fn download(&self, url: &str) -> Result<(Vec<u8>, String), UploadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UploadError::Download {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !content_type.starts_with("image/") {
            return Err(UploadError::UnsupportedContentType(if content_type.is_empty() {
                "missing".to_string()
            } else {
                content_type
            }));
        }

        if let Some(len) = response.content_length() {
            let len = len as usize;
            if len > self.max_bytes {
                return Err(UploadError::TooLarge {
                    size: len,
                    max: self.max_bytes,
                });
            }
        }

        let bytes = read_limited(response, self.max_bytes).await?;
        Ok((bytes, content_type))
    }
}

/// Read a body chunk by chunk, giving up as soon as it exceeds `max_bytes`.
/// Content-Length may be absent, so the declared size alone is not enough.
async fn read_limited(mut response: Response, max_bytes: usize) -> Result<Vec<u8>, UploadError> {
    let mut bytes: Vec<u8> = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| UploadError::Network(e.to_string()))?
    {
        bytes.extend_from_slice(&chunk);
        if bytes.len() > max_bytes {
            return Err(UploadError::TooLarge {
                size: bytes.len(),
                max: max_bytes,
            });
        }
    }
    Ok(bytes)
}

/// The media endpoint has answered in two shapes over time
#[derive(Deserialize)]
#[serde(untagged)]
enum UploadResponse {
    V2 { data: MediaData },
    Legacy { media_id_string: String },
}

#[derive(Deserialize)]
struct MediaData {
    id: String,
}

impl UploadResponse {
    fn into_media_id(self) -> String {
        match self {
            UploadResponse::V2 { data } => data.id,
            UploadResponse::Legacy { media_id_string } => media_id_string,
        }
    }
}

/// Extract the media ID from an upload response body
fn parse_media_id(body: &str) -> Result<String, UploadError> {
    let response: UploadResponse = serde_json::from_str(body)
        .map_err(|e| UploadError::InvalidResponse(format!("{}: {}", e, body)))?;
    let id = response.into_media_id();
    if id.trim().is_empty() {
        return Err(UploadError::InvalidResponse("empty media id".to_string()));
    }
    Ok(id)
}

#[async_trait]
impl MediaUploader for XMediaUploader {
    async fn upload_from_url(&self, url: &str) -> Result<String, UploadError> {
        let (bytes, content_type) = self.download(url).await?;

        let form: Vec<(String, String)> = vec![
            ("media_category".to_string(), "tweet_image".to_string()),
            ("media_data".to_string(), STANDARD.encode(&bytes)),
        ];

        let upload_url = format!("{}/2/media/upload", self.base_url);
        let authorization = self.signer.authorization_header("POST", &upload_url, &form);

        let response = self
            .client
            .post(&upload_url)
            .header("Authorization", authorization)
            .form(&form)
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(UploadError::Upload {
                status: status.as_u16(),
                body,
            });
        }

        let media_id = parse_media_id(&body)?;
        tracing::debug!(
            url = %url,
            bytes = bytes.len(),
            content_type = %content_type,
            media_id = %media_id,
            "Uploaded media"
        );
        Ok(media_id)
    }
}
