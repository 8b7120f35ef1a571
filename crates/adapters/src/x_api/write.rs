//! X API write adapter for publishing posts

use async_trait::async_trait;
use outpost_domain::{OutgoingPost, PublishError, PublishResult, Publisher};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::signer::{OAuthCredentials, RequestSigner};

pub const DEFAULT_API_BASE_URL: &str = "https://api.x.com";

/// X API publisher for creating posts
pub struct XPublisher {
    client: Client,
    signer: Option<RequestSigner>,
    base_url: String,
    max_chars: usize,
}

impl XPublisher {
    pub fn new(client: Client, credentials: OAuthCredentials, max_chars: usize) -> Self {
        Self::with_base_url(client, credentials, DEFAULT_API_BASE_URL.to_string(), max_chars)
    }

    pub fn with_base_url(
        client: Client,
        credentials: OAuthCredentials,
        base_url: String,
        max_chars: usize,
    ) -> Self {
        let signer = credentials
            .is_complete()
            .then(|| RequestSigner::new(credentials));

        Self {
            client,
            signer,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_chars,
        }
    }

    /// Create a disabled publisher (credentials missing)
    pub fn disabled() -> Self {
        Self {
            client: Client::new(),
            signer: None,
            base_url: DEFAULT_API_BASE_URL.to_string(),
            max_chars: 280,
        }
    }

    /// Canonical URL for a post ID
    pub fn status_url(id: &str) -> String {
        format!("https://x.com/i/status/{}", id)
    }
}

#[derive(Serialize)]
struct CreateTweetRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<MediaAttachment<'a>>,
}

#[derive(Serialize)]
struct MediaAttachment<'a> {
    media_ids: &'a [String],
}

#[derive(Deserialize)]
struct CreateTweetResponse {
    data: TweetData,
}

#[derive(Deserialize)]
struct TweetData {
    id: String,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    title: Option<String>,
    detail: Option<String>,
    error: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorEntry>,
}

#[derive(Deserialize)]
struct ErrorEntry {
    message: Option<String>,
}

/// Best human-readable detail from an error response body
fn error_detail(body: &str) -> String {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();

    match (parsed.title, parsed.detail) {
        (Some(title), Some(detail)) => return format!("{}: {}", title, detail),
        (None, Some(detail)) => return detail,
        (Some(title), None) => return title,
        (None, None) => {}
    }
    if let Some(error) = parsed.error {
        return error;
    }
    if let Some(message) = parsed.errors.into_iter().find_map(|e| e.message) {
        return message;
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        trimmed.chars().take(500).collect()
    }
}

#[async_trait]
impl Publisher for XPublisher {
    async fn publish(&self, post: &OutgoingPost) -> Result<PublishResult, PublishError> {
        let Some(signer) = &self.signer else {
            return Err(PublishError::Disabled);
        };

        let len = post.text.chars().count();
        if len > self.max_chars {
            return Err(PublishError::ContentTooLong {
                len,
                max: self.max_chars,
            });
        }

        let request = CreateTweetRequest {
            text: &post.text,
            media: (!post.media_ids.is_empty()).then_some(MediaAttachment {
                media_ids: &post.media_ids,
            }),
        };

        let url = format!("{}/2/tweets", self.base_url);
        // JSON bodies are not part of the signature base string
        let authorization = signer.authorization_header("POST", &url, &[]);

        let response = self
            .client
            .post(&url)
            .header("Authorization", authorization)
            .json(&request)
            .send()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;

        let status = response.status();

        if status == 429 {
            return Err(PublishError::RateLimited);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = error_detail(&body);
            if status == 401 || status == 403 {
                return Err(PublishError::Auth(detail));
            }
            return Err(PublishError::Api {
                status: status.as_u16(),
                detail,
            });
        }

        let tweet_response: CreateTweetResponse = response.json().await.map_err(|e| {
            PublishError::Api {
                status: status.as_u16(),
                detail: format!("Unexpected response: {}", e),
            }
        })?;

        let id = tweet_response.data.id;
        tracing::info!(post_id = %id, media = post.media_ids.len(), "Created post on X");

        Ok(PublishResult {
            url: Self::status_url(&id),
            id,
        })
    }

    async fn verify_credentials(&self) -> bool {
        let Some(signer) = &self.signer else {
            return false;
        };

        let url = format!("{}/2/users/me", self.base_url);
        let authorization = signer.authorization_header("GET", &url, &[]);

        match self
            .client
            .get(&url)
            .header("Authorization", authorization)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(status = %response.status(), "Credential check rejected");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Credential check failed");
                false
            }
        }
    }

    fn is_enabled(&self) -> bool {
        self.signer.is_some()
    }

    fn platform(&self) -> &'static str {
        "x"
    }
}
