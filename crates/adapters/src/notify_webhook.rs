//! Chat webhook notifier (Discord-compatible `{content}` payload)

use async_trait::async_trait;
use outpost_domain::{ChatNotifier, MediaSource, NotifyError, PublishedNotice};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::sync::Mutex;

/// Posts a short message to a chat webhook after each publish
pub struct WebhookNotifier {
    client: Client,
    url: SecretString,
}

impl WebhookNotifier {
    pub fn new(client: Client, url: SecretString) -> Self {
        Self { client, url }
    }
}

#[derive(Serialize)]
struct WebhookMessage {
    content: String,
}

/// Message body for a publication notice
pub fn render_notice(notice: &PublishedNotice) -> String {
    let title = notice
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(notice.post_id.as_str());

    let mut content = format!("Published: {}\n{}", title, notice.external_url);
    match notice.media_source {
        MediaSource::AiGenerated => content.push_str("\n(AI-generated image)"),
        MediaSource::Failed => content.push_str("\n(no image attached)"),
        MediaSource::Scraped | MediaSource::None => {}
    }
    content
}

#[async_trait]
impl ChatNotifier for WebhookNotifier {
    async fn notify(&self, notice: &PublishedNotice) -> Result<(), NotifyError> {
        let message = WebhookMessage {
            content: render_notice(notice),
        };

        let response = self
            .client
            .post(self.url.expose_secret())
            .json(&message)
            .send()
            .await
            .map_err(|e| NotifyError::Webhook(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Webhook(format!(
                "Webhook returned {}: {}",
                status, body
            )));
        }

        tracing::debug!(post_id = %notice.post_id, "Chat notification sent");
        Ok(())
    }
}

/// Notifier that keeps notices in memory
#[derive(Debug, Default)]
pub struct StubNotifier {
    sent: Mutex<Vec<PublishedNotice>>,
}

impl StubNotifier {
    pub fn sent(&self) -> Vec<PublishedNotice> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatNotifier for StubNotifier {
    async fn notify(&self, notice: &PublishedNotice) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .map_err(|_| NotifyError::Webhook("stub state poisoned".to_string()))?
            .push(notice.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notice(media_source: MediaSource) -> PublishedNotice {
        PublishedNotice {
            post_id: "post-1".to_string(),
            title: Some("XPeng G6 deliveries".to_string()),
            external_url: "https://x.com/i/status/1".to_string(),
            media_source,
        }
    }

    #[test]
    fn test_render_notice() {
        assert_eq!(
            render_notice(&notice(MediaSource::Scraped)),
            "Published: XPeng G6 deliveries\nhttps://x.com/i/status/1"
        );
        assert!(render_notice(&notice(MediaSource::AiGenerated)).ends_with("(AI-generated image)"));

        let mut untitled = notice(MediaSource::None);
        untitled.title = None;
        assert!(render_notice(&untitled).starts_with("Published: post-1\n"));
    }

    #[tokio::test]
    async fn test_notify_posts_content() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/webhooks/1/abc"))
            .and(body_json(serde_json::json!({
                "content": "Published: XPeng G6 deliveries\nhttps://x.com/i/status/1"
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let notifier = WebhookNotifier::new(
            Client::new(),
            SecretString::new(format!("{}/api/webhooks/1/abc", mock_server.uri()).into()),
        );

        notifier.notify(&notice(MediaSource::Scraped)).await.unwrap();
    }

    #[tokio::test]
    async fn test_notify_error_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let notifier = WebhookNotifier::new(
            Client::new(),
            SecretString::new(mock_server.uri().into()),
        );

        assert!(notifier.notify(&notice(MediaSource::Scraped)).await.is_err());
    }

    #[tokio::test]
    async fn test_stub_notifier_records() {
        let notifier = StubNotifier::default();
        notifier.notify(&notice(MediaSource::Failed)).await.unwrap();
        assert_eq!(notifier.sent().len(), 1);
    }
}
