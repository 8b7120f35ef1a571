//! Publication tracker - drives one post through a publish attempt
//!
//! Every attempt follows the same strictly ordered sequence: validate the
//! guard, persist `PUBLISHING` with the incremented counter, do the network
//! work (media resolution, signed publish call), then persist the result.
//! The record write uses the version it was read at, so a concurrent attempt
//! on the same post surfaces as a storage conflict instead of a second post.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::PipelineError;
use crate::model::{
    MediaSource, OutgoingPost, Post, PostPatch, PostStatus, PublishedNotice, ResolvedMedia,
};
use crate::ports::{ChatNotifier, Clock, MediaUploader, PublishResult, Publisher, RecordStore};
use crate::publication::{AttemptTrigger, PublicationRecord};
use crate::usecases::format::{ContentFormatter, FormatConfig};
use crate::usecases::media::MediaResolver;

/// Configuration for the tracker
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Cap on attempts for automatic triggers
    pub max_attempts: u32,
    /// Bound on the network portion of one attempt
    pub attempt_timeout: Option<Duration>,
    /// Resolve and attach an image
    pub attach_media: bool,
    pub format: FormatConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            attempt_timeout: Some(Duration::from_secs(120)),
            attach_media: true,
            format: FormatConfig::default(),
        }
    }
}

/// Parameters of a single publish request
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub trigger: AttemptTrigger,
    /// Caller-supplied image that replaces candidate selection
    pub image_override: Option<String>,
}

impl PublishRequest {
    pub fn automatic() -> Self {
        Self {
            trigger: AttemptTrigger::Automatic,
            image_override: None,
        }
    }

    pub fn manual(image_override: Option<String>) -> Self {
        Self {
            trigger: AttemptTrigger::Manual,
            image_override,
        }
    }
}

/// Successful publication
#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    pub post_id: String,
    pub external_post_id: String,
    pub external_url: String,
    pub media_source: MediaSource,
    pub attempts: u32,
}

/// Answer to "may an admin retry this post?"
#[derive(Debug, Clone, Serialize)]
pub struct RetryEligibility {
    pub allowed: bool,
    pub reason: Option<String>,
    pub attempts: u32,
    /// Automatic retries are exhausted; the UI should warn
    pub max_reached: bool,
    pub external_url: Option<String>,
    pub record: Option<PublicationRecord>,
}

/// Why the network portion of an attempt failed
struct AttemptFailure {
    message: String,
    media_source: Option<MediaSource>,
}

/// Orchestrates publish attempts against the record store
pub struct PublicationTracker<St, P, U, Cl>
where
    St: RecordStore + ?Sized,
    P: Publisher + ?Sized,
    U: MediaUploader + ?Sized,
    Cl: Clock + ?Sized,
{
    store: Arc<St>,
    publisher: Arc<P>,
    media: MediaResolver<U>,
    notifier: Option<Arc<dyn ChatNotifier>>,
    clock: Arc<Cl>,
    formatter: ContentFormatter,
    config: TrackerConfig,
}

impl<St, P, U, Cl> PublicationTracker<St, P, U, Cl>
where
    St: RecordStore + ?Sized,
    P: Publisher + ?Sized,
    U: MediaUploader + ?Sized,
    Cl: Clock + ?Sized,
{
    pub fn new(
        store: Arc<St>,
        publisher: Arc<P>,
        media: MediaResolver<U>,
        clock: Arc<Cl>,
        config: TrackerConfig,
    ) -> Self {
        let formatter = ContentFormatter::new(config.format.clone());
        Self {
            store,
            publisher,
            media,
            notifier: None,
            clock,
            formatter,
            config,
        }
    }

    /// Notify a chat webhook after each successful publish
    pub fn with_notifier(mut self, notifier: Arc<dyn ChatNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Render the text a publish attempt would send, without side effects
    pub async fn preview(&self, post_id: &str) -> Result<String, PipelineError> {
        let post = self.load_post(post_id).await?;
        Ok(self.formatter.render_post(&post))
    }

    /// Manual-retry eligibility. Never allowed once published; otherwise
    /// allowed regardless of the attempt count.
    pub async fn check_retry_eligibility(
        &self,
        post_id: &str,
    ) -> Result<RetryEligibility, PipelineError> {
        let post = self.load_post(post_id).await?;
        let record = self
            .store
            .get_publication_record(post_id)
            .await
            .map_err(PipelineError::from_store)?;

        let attempts = record.as_ref().map_or(0, |r| r.attempts());
        let max_reached = attempts >= self.config.max_attempts;
        let external_url = record
            .as_ref()
            .and_then(|r| r.external_url())
            .map(str::to_string);
        let published = post.is_published() || record.as_ref().is_some_and(|r| r.is_published());

        let eligibility = if published {
            RetryEligibility {
                allowed: false,
                reason: Some("Post is already published".to_string()),
                attempts,
                max_reached,
                external_url,
                record,
            }
        } else {
            RetryEligibility {
                allowed: true,
                reason: max_reached.then(|| {
                    format!(
                        "Automatic retries exhausted ({}/{})",
                        attempts, self.config.max_attempts
                    )
                }),
                attempts,
                max_reached,
                external_url,
                record,
            }
        };

        Ok(eligibility)
    }

    /// Admin "retry publish": eligibility check, then a manual attempt
    pub async fn retry(
        &self,
        post_id: &str,
        image_override: Option<String>,
    ) -> Result<PublishOutcome, PipelineError> {
        let eligibility = self.check_retry_eligibility(post_id).await?;
        if !eligibility.allowed {
            return Err(PipelineError::invariant(
                eligibility
                    .reason
                    .unwrap_or_else(|| "Retry not allowed".to_string()),
            )
            .with_attempts(eligibility.attempts, eligibility.max_reached)
            .with_external_url(eligibility.external_url));
        }

        self.publish(post_id, PublishRequest::manual(image_override))
            .await
    }

    /// Admin "approve and publish"
    pub async fn approve_and_publish(
        &self,
        post_id: &str,
        image_override: Option<String>,
    ) -> Result<PublishOutcome, PipelineError> {
        if let Err(e) = self.ensure_configured() {
            return Err(self.with_record_context(post_id, e).await);
        }

        let post = self.load_post(post_id).await?;
        match post.status {
            PostStatus::Published => {
                return Err(self.already_published(post_id).await);
            }
            PostStatus::AwaitingReview => {
                self.store
                    .update_post(post_id, &PostPatch::approved())
                    .await
                    .map_err(PipelineError::from_store)?;
                tracing::info!(post_id = %post_id, "Post approved");
            }
            PostStatus::Approved => {}
        }

        self.publish(post_id, PublishRequest::manual(image_override))
            .await
    }

    /// Admin "view attempt history"
    pub async fn history(&self, post_id: &str) -> Result<Option<PublicationRecord>, PipelineError> {
        self.store
            .get_publication_record(post_id)
            .await
            .map_err(PipelineError::from_store)
    }

    /// Administrative override to SKIPPED
    pub async fn skip(
        &self,
        post_id: &str,
        reason: &str,
    ) -> Result<PublicationRecord, PipelineError> {
        let post = self.load_post(post_id).await?;
        if post.is_published() {
            return Err(self.already_published(post_id).await);
        }

        let current = self.current_record(post_id).await?;
        let next = current
            .skip(reason, self.clock.now())
            .map_err(PipelineError::from_transition)?;
        let stored = self.persist(post_id, &next).await?;

        tracing::info!(post_id = %post_id, reason = %reason, "Publication skipped");
        Ok(stored)
    }

    /// Credential probe; false on any failure
    pub async fn verify_credentials(&self) -> bool {
        self.publisher.verify_credentials().await
    }

    /// Run one publish attempt for an approved post
    pub async fn publish(
        &self,
        post_id: &str,
        request: PublishRequest,
    ) -> Result<PublishOutcome, PipelineError> {
        if let Err(e) = self.ensure_configured() {
            return Err(self.with_record_context(post_id, e).await);
        }

        let post = self.load_post(post_id).await?;
        if post.is_published() {
            return Err(self.already_published(post_id).await);
        }
        if post.status != PostStatus::Approved {
            let error = PipelineError::invariant(format!(
                "Post {} is {} and must be approved before publishing",
                post_id,
                post.status.as_str()
            ));
            return Err(self.with_record_context(post_id, error).await);
        }

        let current = self.current_record(post_id).await?;
        let started = current
            .start_attempt(request.trigger, self.config.max_attempts, self.clock.now())
            .map_err(|e| {
                let max_reached = current.max_reached(self.config.max_attempts);
                PipelineError::from_transition(e)
                    .with_attempts(current.attempts(), max_reached)
                    .with_external_url(current.external_url().map(str::to_string))
            })?;

        // Write-before-call: the counter is durable before any network I/O
        let record = self.persist(post_id, &started).await?;

        tracing::info!(
            post_id = %post_id,
            attempt = record.attempts(),
            trigger = ?request.trigger,
            "Publish attempt started"
        );

        let attempt = self.execute(&post, request.image_override.as_deref());
        let result = match self.config.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, attempt)
                .await
                .unwrap_or_else(|_| {
                    Err(AttemptFailure {
                        message: format!("Attempt timed out after {}s", limit.as_secs()),
                        media_source: None,
                    })
                }),
            None => attempt.await,
        };

        match result {
            Ok((published, media_source)) => {
                self.finish_success(&post, &record, published, media_source)
                    .await
            }
            Err(failure) => self.finish_failure(&record, failure).await,
        }
    }

    /// Network portion of an attempt: media, then the signed publish call
    async fn execute(
        &self,
        post: &Post,
        image_override: Option<&str>,
    ) -> Result<(PublishResult, MediaSource), AttemptFailure> {
        let text = self.formatter.render_post(post);

        let media = if self.config.attach_media {
            self.media.resolve(post, image_override).await
        } else {
            ResolvedMedia::none(MediaSource::None)
        };

        let outgoing = OutgoingPost {
            text,
            media_ids: media.media_ids(),
        };

        match self.publisher.publish(&outgoing).await {
            Ok(published) => Ok((published, media.source)),
            Err(e) => Err(AttemptFailure {
                message: e.to_string(),
                media_source: Some(media.source),
            }),
        }
    }

    /// Write-after-result for a failed attempt
    async fn finish_failure(
        &self,
        record: &PublicationRecord,
        failure: AttemptFailure,
    ) -> Result<PublishOutcome, PipelineError> {
        let post_id = record.post_id();
        let (failed, recorded) = record
            .record_failure(
                failure.message.clone(),
                failure.media_source,
                self.config.max_attempts,
                self.clock.now(),
            )
            .map_err(PipelineError::from_transition)?;

        tracing::error!(
            post_id = %post_id,
            attempt = recorded.attempts,
            max_reached = recorded.max_reached,
            error = %failure.message,
            "Publish attempt failed"
        );

        if let Err(e) = self.persist(post_id, &failed).await {
            tracing::error!(
                post_id = %post_id,
                error = %e,
                "Failed to record publish failure; record left in PUBLISHING"
            );
            return Err(PipelineError::transient(format!(
                "{} (and the failure could not be recorded: {})",
                failure.message, e
            ))
            .with_attempts(recorded.attempts, recorded.max_reached));
        }

        Err(PipelineError::transient(failure.message)
            .with_attempts(recorded.attempts, recorded.max_reached))
    }

    /// Write-after-result for an accepted post. Nothing here is retried:
    /// the platform already has the post.
    async fn finish_success(
        &self,
        post: &Post,
        record: &PublicationRecord,
        published: PublishResult,
        media_source: MediaSource,
    ) -> Result<PublishOutcome, PipelineError> {
        let post_id = post.id.as_str();
        let attempts = record.attempts();
        let max_reached = record.max_reached(self.config.max_attempts);

        tracing::info!(
            post_id = %post_id,
            external_post_id = %published.id,
            external_url = %published.url,
            media_source = media_source.as_str(),
            "Post accepted by platform"
        );

        let mut inconsistencies: Vec<String> = Vec::new();

        match record.record_success(
            published.id.clone(),
            published.url.clone(),
            media_source,
            self.clock.now(),
        ) {
            Ok(next) => {
                if let Err(e) = self.persist(post_id, &next).await {
                    inconsistencies.push(format!("publication record not updated: {}", e.message));
                }
            }
            Err(e) => inconsistencies.push(format!("publication record transition: {}", e)),
        }

        if let Err(e) = self
            .store
            .update_post(post_id, &PostPatch::published(published.id.clone()))
            .await
        {
            inconsistencies.push(format!("post not marked published: {}", e));
        }

        self.notify(post, &published, media_source).await;

        if !inconsistencies.is_empty() {
            let detail = inconsistencies.join("; ");
            tracing::error!(
                post_id = %post_id,
                external_post_id = %published.id,
                detail = %detail,
                "Post published but local state is inconsistent; reconcile manually"
            );
            return Err(PipelineError::partial_success(
                format!(
                    "Published as {} but local state needs reconciliation: {}",
                    published.id, detail
                ),
                published.url,
            )
            .with_attempts(attempts, max_reached));
        }

        Ok(PublishOutcome {
            post_id: post_id.to_string(),
            external_post_id: published.id,
            external_url: published.url,
            media_source,
            attempts,
        })
    }

    async fn notify(
        &self,
        post: &Post,
        published: &PublishResult,
        media_source: MediaSource,
    ) {
        let Some(notifier) = &self.notifier else {
            return;
        };

        let notice = PublishedNotice {
            post_id: post.id.clone(),
            title: post.title.clone(),
            external_url: published.url.clone(),
            media_source,
        };

        if let Err(e) = notifier.notify(&notice).await {
            tracing::warn!(post_id = %post.id, error = %e, "Chat notification failed");
        }
    }

    fn ensure_configured(&self) -> Result<(), PipelineError> {
        if self.publisher.is_enabled() {
            Ok(())
        } else {
            Err(PipelineError::config(format!(
                "{} publisher is not configured; set the platform credentials",
                self.publisher.platform()
            )))
        }
    }

    async fn load_post(&self, post_id: &str) -> Result<Post, PipelineError> {
        self.store
            .get_post(post_id)
            .await
            .map_err(PipelineError::from_store)?
            .ok_or_else(|| PipelineError::invariant(format!("Post not found: {}", post_id)))
    }

    /// Stored record, or a fresh PENDING one (created lazily on first write)
    async fn current_record(&self, post_id: &str) -> Result<PublicationRecord, PipelineError> {
        Ok(self
            .store
            .get_publication_record(post_id)
            .await
            .map_err(PipelineError::from_store)?
            .unwrap_or_else(|| PublicationRecord::new(post_id, self.clock.now())))
    }

    async fn persist(
        &self,
        post_id: &str,
        record: &PublicationRecord,
    ) -> Result<PublicationRecord, PipelineError> {
        self.store
            .create_or_update_publication_record(post_id, &record.to_patch())
            .await
            .map_err(|e| {
                PipelineError::from_store(e)
                    .with_attempts(record.attempts(), record.max_reached(self.config.max_attempts))
            })
    }

    async fn already_published(&self, post_id: &str) -> PipelineError {
        let error = PipelineError::invariant(format!("Post {} is already published", post_id));
        self.with_record_context(post_id, error).await
    }

    /// Attach the stored attempt count and external URL to a rejection.
    /// A record that cannot be read leaves the error as it is.
    async fn with_record_context(&self, post_id: &str, error: PipelineError) -> PipelineError {
        let Ok(Some(record)) = self.store.get_publication_record(post_id).await else {
            return error;
        };
        error
            .with_attempts(
                record.attempts(),
                record.max_reached(self.config.max_attempts),
            )
            .with_external_url(record.external_url().map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceKind;
    use crate::ports::{NotifyError, PublishError, StoreError, SystemClock, UploadError};
    use crate::publication::{PublicationStatus, RecordPatch, StoredRecord};
    use crate::error::ErrorKind;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use time::OffsetDateTime;

    const EXTERNAL_ID: &str = "1790000000000000001";
    const EXTERNAL_URL: &str = "https://x.com/i/status/1790000000000000001";

    #[derive(Default)]
    struct FakeStore {
        posts: Mutex<HashMap<String, Post>>,
        records: Mutex<HashMap<String, StoredRecord>>,
        fail_post_update: bool,
    }

    impl FakeStore {
        fn with_post(post: Post) -> Self {
            let store = Self::default();
            store.posts.lock().unwrap().insert(post.id.clone(), post);
            store
        }

        fn record_row(&self, post_id: &str) -> Option<StoredRecord> {
            self.records.lock().unwrap().get(post_id).cloned()
        }

        fn post(&self, post_id: &str) -> Post {
            self.posts.lock().unwrap().get(post_id).cloned().unwrap()
        }
    }

    #[async_trait]
    impl RecordStore for FakeStore {
        async fn get_publication_record(
            &self,
            post_id: &str,
        ) -> Result<Option<PublicationRecord>, StoreError> {
            match self.record_row(post_id) {
                Some(row) => Ok(Some(PublicationRecord::from_stored(row)?)),
                None => Ok(None),
            }
        }

        async fn create_or_update_publication_record(
            &self,
            post_id: &str,
            patch: &RecordPatch,
        ) -> Result<PublicationRecord, StoreError> {
            let mut records = self.records.lock().unwrap();
            let current = records.get(post_id).map(|r| r.version);
            if current != patch.expected_version {
                return Err(StoreError::Conflict(format!(
                    "expected {:?}, found {:?}",
                    patch.expected_version, current
                )));
            }
            let stored = patch.clone().into_stored(post_id);
            records.insert(post_id.to_string(), stored.clone());
            Ok(PublicationRecord::from_stored(stored)?)
        }

        async fn get_post(&self, post_id: &str) -> Result<Option<Post>, StoreError> {
            Ok(self.posts.lock().unwrap().get(post_id).cloned())
        }

        async fn update_post(&self, post_id: &str, patch: &PostPatch) -> Result<Post, StoreError> {
            if self.fail_post_update {
                return Err(StoreError::Database("disk I/O error".to_string()));
            }
            let mut posts = self.posts.lock().unwrap();
            let post = posts
                .get_mut(post_id)
                .ok_or_else(|| StoreError::NotFound(post_id.to_string()))?;
            patch.apply(post);
            Ok(post.clone())
        }

        async fn insert_post(&self, post: &Post) -> Result<(), StoreError> {
            self.posts
                .lock()
                .unwrap()
                .insert(post.id.clone(), post.clone());
            Ok(())
        }
    }

    #[derive(Default, Clone)]
    struct Behavior {
        disabled: bool,
        fail_status: Option<u16>,
        delay: Option<Duration>,
    }

    struct FakePublisher {
        behavior: Behavior,
        store: Arc<FakeStore>,
        sent: Mutex<Vec<OutgoingPost>>,
        /// Record state seen at the moment of each platform call
        observed: Mutex<Vec<(PublicationStatus, u32)>>,
    }

    impl FakePublisher {
        fn calls(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Publisher for FakePublisher {
        async fn publish(&self, post: &OutgoingPost) -> Result<PublishResult, PublishError> {
            if let Some(row) = self.store.record_row("post-1") {
                self.observed.lock().unwrap().push((row.status, row.attempts));
            }
            self.sent.lock().unwrap().push(post.clone());

            if let Some(delay) = self.behavior.delay {
                tokio::time::sleep(delay).await;
            }

            match self.behavior.fail_status {
                Some(status) => Err(PublishError::Api {
                    status,
                    detail: "Service Unavailable".to_string(),
                }),
                None => Ok(PublishResult {
                    id: EXTERNAL_ID.to_string(),
                    url: EXTERNAL_URL.to_string(),
                }),
            }
        }

        async fn verify_credentials(&self) -> bool {
            !self.behavior.disabled
        }

        fn is_enabled(&self) -> bool {
            !self.behavior.disabled
        }

        fn platform(&self) -> &'static str {
            "x"
        }
    }

    struct FakeUploader;

    #[async_trait]
    impl MediaUploader for FakeUploader {
        async fn upload_from_url(&self, url: &str) -> Result<String, UploadError> {
            if url.contains("broken") {
                return Err(UploadError::Download {
                    status: 404,
                    url: url.to_string(),
                });
            }
            Ok("media-1".to_string())
        }
    }

    #[derive(Default)]
    struct FakeNotifier {
        notices: Mutex<Vec<PublishedNotice>>,
        fail: bool,
    }

    #[async_trait]
    impl ChatNotifier for FakeNotifier {
        async fn notify(&self, notice: &PublishedNotice) -> Result<(), NotifyError> {
            self.notices.lock().unwrap().push(notice.clone());
            if self.fail {
                return Err(NotifyError::Webhook("500".to_string()));
            }
            Ok(())
        }
    }

    type TestTracker = PublicationTracker<FakeStore, FakePublisher, FakeUploader, SystemClock>;

    struct Harness {
        store: Arc<FakeStore>,
        publisher: Arc<FakePublisher>,
        notifier: Arc<FakeNotifier>,
        tracker: TestTracker,
    }

    fn post(status: PostStatus) -> Post {
        Post {
            id: "post-1".to_string(),
            status,
            title: Some("BYD opens Hungary plant".to_string()),
            summary: "BYD started production at its Szeged factory.".to_string(),
            categories: vec!["BYD".to_string()],
            source: SourceKind::Media,
            source_url: "https://example.com/byd-szeged".to_string(),
            image_urls: vec!["https://example.com/szeged.jpg".to_string()],
            card_image_url: None,
            external_post_id: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn harness_with(store: FakeStore, behavior: Behavior, config: TrackerConfig) -> Harness {
        let store = Arc::new(store);
        let publisher = Arc::new(FakePublisher {
            behavior,
            store: Arc::clone(&store),
            sent: Mutex::new(vec![]),
            observed: Mutex::new(vec![]),
        });
        let notifier = Arc::new(FakeNotifier::default());
        let media = MediaResolver::new(Arc::new(FakeUploader), vec![]);
        let tracker = PublicationTracker::new(
            Arc::clone(&store),
            Arc::clone(&publisher),
            media,
            Arc::new(SystemClock),
            config,
        )
        .with_notifier(notifier.clone());

        Harness {
            store,
            publisher,
            notifier,
            tracker,
        }
    }

    fn harness(status: PostStatus, behavior: Behavior) -> Harness {
        harness_with(
            FakeStore::with_post(post(status)),
            behavior,
            TrackerConfig::default(),
        )
    }

    /// Store whose record for post-1 already holds `attempts` failures
    async fn store_with_failures(status: PostStatus, attempts: u32) -> FakeStore {
        let store = FakeStore::with_post(post(status));
        let now = OffsetDateTime::now_utc();
        let mut record = PublicationRecord::new("post-1", now);
        for _ in 0..attempts {
            let started = record
                .start_attempt(AttemptTrigger::Manual, 2, now)
                .unwrap();
            record = started.record_failure("503", None, 2, now).unwrap().0;
        }
        store
            .create_or_update_publication_record("post-1", &record.to_patch())
            .await
            .unwrap();
        store
    }

    fn failing() -> Behavior {
        Behavior {
            fail_status: Some(503),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_publish_success_updates_record_and_post() {
        let h = harness(PostStatus::Approved, Behavior::default());

        let outcome = h
            .tracker
            .publish("post-1", PublishRequest::automatic())
            .await
            .unwrap();

        assert_eq!(outcome.external_post_id, EXTERNAL_ID);
        assert_eq!(outcome.external_url, EXTERNAL_URL);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.media_source, MediaSource::Scraped);

        let row = h.store.record_row("post-1").unwrap();
        assert_eq!(row.status, PublicationStatus::Published);
        assert_eq!(row.external_post_id.as_deref(), Some(EXTERNAL_ID));
        assert_eq!(row.last_error, None);

        let stored_post = h.store.post("post-1");
        assert_eq!(stored_post.status, PostStatus::Published);
        assert_eq!(stored_post.external_post_id.as_deref(), Some(EXTERNAL_ID));

        let sent = h.publisher.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].media_ids, vec!["media-1".to_string()]);
        assert!(sent[0].text.starts_with("🚗 BYD | BYD opens Hungary plant"));

        let notices = h.notifier.notices.lock().unwrap().clone();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].external_url, EXTERNAL_URL);
    }

    #[tokio::test]
    async fn test_publishing_is_persisted_before_platform_call() {
        let h = harness(PostStatus::Approved, Behavior::default());

        h.tracker
            .publish("post-1", PublishRequest::automatic())
            .await
            .unwrap();

        let observed = h.publisher.observed.lock().unwrap().clone();
        assert_eq!(observed, vec![(PublicationStatus::Publishing, 1)]);
    }

    #[tokio::test]
    async fn test_failure_records_error_and_counts() {
        let h = harness(PostStatus::Approved, failing());

        let err = h
            .tracker
            .publish("post-1", PublishRequest::automatic())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Transient);
        assert_eq!(err.attempts, 1);
        assert!(!err.max_reached);
        assert!(err.is_retryable());

        let row = h.store.record_row("post-1").unwrap();
        assert_eq!(row.status, PublicationStatus::Failed);
        assert_eq!(row.attempts, 1);
        assert!(row.last_error.unwrap().contains("Service Unavailable"));
        assert_eq!(h.store.post("post-1").status, PostStatus::Approved);
    }

    #[tokio::test]
    async fn test_automatic_attempts_stop_at_max() {
        let h = harness(PostStatus::Approved, failing());

        let _ = h.tracker.publish("post-1", PublishRequest::automatic()).await;
        let second = h
            .tracker
            .publish("post-1", PublishRequest::automatic())
            .await
            .unwrap_err();
        assert_eq!(second.attempts, 2);
        assert!(second.max_reached);

        let third = h
            .tracker
            .publish("post-1", PublishRequest::automatic())
            .await
            .unwrap_err();
        assert_eq!(third.kind, ErrorKind::Transient);
        assert!(third.max_reached);
        assert_eq!(third.attempts, 2);

        assert_eq!(h.publisher.calls(), 2);
        assert_eq!(h.store.record_row("post-1").unwrap().attempts, 2);
    }

    #[tokio::test]
    async fn test_manual_retry_allowed_beyond_max() {
        let h = harness(PostStatus::Approved, failing());

        let _ = h.tracker.publish("post-1", PublishRequest::automatic()).await;
        let _ = h.tracker.publish("post-1", PublishRequest::automatic()).await;

        let eligibility = h.tracker.check_retry_eligibility("post-1").await.unwrap();
        assert!(eligibility.allowed);
        assert!(eligibility.max_reached);

        let err = h.tracker.retry("post-1", None).await.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(h.publisher.calls(), 3);
    }

    #[tokio::test]
    async fn test_published_post_rejects_retry_without_network() {
        let h = harness(PostStatus::Approved, Behavior::default());
        h.tracker
            .publish("post-1", PublishRequest::automatic())
            .await
            .unwrap();

        let eligibility = h.tracker.check_retry_eligibility("post-1").await.unwrap();
        assert!(!eligibility.allowed);
        assert_eq!(eligibility.external_url.as_deref(), Some(EXTERNAL_URL));

        let err = h.tracker.retry("post-1", None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvariantViolation);
        assert_eq!(err.external_url.as_deref(), Some(EXTERNAL_URL));

        let err = h
            .tracker
            .publish("post-1", PublishRequest::manual(None))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvariantViolation);

        assert_eq!(h.publisher.calls(), 1);
    }

    #[tokio::test]
    async fn test_disabled_publisher_is_config_error() {
        let h = harness(
            PostStatus::Approved,
            Behavior {
                disabled: true,
                ..Default::default()
            },
        );

        let err = h
            .tracker
            .publish("post-1", PublishRequest::automatic())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Config);
        assert!(h.store.record_row("post-1").is_none());
        assert_eq!(h.publisher.calls(), 0);
    }

    #[tokio::test]
    async fn test_unapproved_post_is_rejected() {
        let h = harness(PostStatus::AwaitingReview, Behavior::default());

        let err = h
            .tracker
            .publish("post-1", PublishRequest::automatic())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::InvariantViolation);
        assert!(h.store.record_row("post-1").is_none());
    }

    #[tokio::test]
    async fn test_approve_and_publish() {
        let h = harness(PostStatus::AwaitingReview, Behavior::default());

        let outcome = h.tracker.approve_and_publish("post-1", None).await.unwrap();

        assert_eq!(outcome.external_post_id, EXTERNAL_ID);
        assert_eq!(h.store.post("post-1").status, PostStatus::Published);
    }

    #[tokio::test]
    async fn test_missing_post_is_invariant_violation() {
        let h = harness(PostStatus::Approved, Behavior::default());

        let err = h
            .tracker
            .publish("nope", PublishRequest::automatic())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::InvariantViolation);
    }

    #[tokio::test]
    async fn test_in_flight_record_blocks_automatic_attempt() {
        let h = harness(PostStatus::Approved, Behavior::default());
        let in_flight = PublicationRecord::new("post-1", OffsetDateTime::now_utc())
            .start_attempt(AttemptTrigger::Automatic, 2, OffsetDateTime::now_utc())
            .unwrap();
        h.store
            .create_or_update_publication_record("post-1", &in_flight.to_patch())
            .await
            .unwrap();

        let err = h
            .tracker
            .publish("post-1", PublishRequest::automatic())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::InvariantViolation);
        assert_eq!(h.publisher.calls(), 0);
    }

    #[tokio::test]
    async fn test_stale_write_surfaces_as_conflict() {
        let h = harness(PostStatus::Approved, Behavior::default());
        let record = PublicationRecord::new("post-1", OffsetDateTime::now_utc());
        h.store
            .create_or_update_publication_record("post-1", &record.to_patch())
            .await
            .unwrap();

        // A second writer that read before the first write landed
        let err = h
            .store
            .create_or_update_publication_record("post-1", &record.to_patch())
            .await
            .unwrap_err();

        assert_eq!(
            PipelineError::from_store(err).kind,
            ErrorKind::InvariantViolation
        );
    }

    #[tokio::test]
    async fn test_local_write_failure_after_publish_is_partial_success() {
        let store = FakeStore {
            fail_post_update: true,
            ..FakeStore::with_post(post(PostStatus::Approved))
        };
        let h = harness_with(store, Behavior::default(), TrackerConfig::default());

        let err = h
            .tracker
            .publish("post-1", PublishRequest::automatic())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::PartialSuccess);
        assert_eq!(err.external_url.as_deref(), Some(EXTERNAL_URL));
        assert_eq!(
            h.store.record_row("post-1").unwrap().status,
            PublicationStatus::Published
        );
        assert_eq!(h.publisher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_recorded_as_failure() {
        let h = harness(
            PostStatus::Approved,
            Behavior {
                delay: Some(Duration::from_secs(300)),
                ..Default::default()
            },
        );

        let err = h
            .tracker
            .publish("post-1", PublishRequest::automatic())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Transient);
        assert!(err.message.contains("timed out"));

        let row = h.store.record_row("post-1").unwrap();
        assert_eq!(row.status, PublicationStatus::Failed);
        assert_eq!(row.attempts, 1);
    }

    #[tokio::test]
    async fn test_skip_blocks_automatic_but_not_manual() {
        let h = harness(PostStatus::Approved, Behavior::default());

        let skipped = h.tracker.skip("post-1", "duplicate story").await.unwrap();
        assert_eq!(skipped.status(), PublicationStatus::Skipped);
        assert_eq!(skipped.last_error(), Some("duplicate story"));

        let err = h
            .tracker
            .publish("post-1", PublishRequest::automatic())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvariantViolation);

        let outcome = h.tracker.retry("post-1", None).await.unwrap();
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn test_media_disabled_publishes_text_only() {
        let config = TrackerConfig {
            attach_media: false,
            ..Default::default()
        };
        let h = harness_with(
            FakeStore::with_post(post(PostStatus::Approved)),
            Behavior::default(),
            config,
        );

        let outcome = h
            .tracker
            .publish("post-1", PublishRequest::automatic())
            .await
            .unwrap();

        assert_eq!(outcome.media_source, MediaSource::None);
        assert!(h.publisher.sent.lock().unwrap()[0].media_ids.is_empty());
    }

    #[tokio::test]
    async fn test_failed_override_still_publishes_text() {
        let h = harness(PostStatus::Approved, Behavior::default());

        let outcome = h
            .tracker
            .retry("post-1", Some("https://cdn.example/broken.png".to_string()))
            .await
            .unwrap();

        assert_eq!(outcome.media_source, MediaSource::Failed);
        assert!(h.publisher.sent.lock().unwrap()[0].media_ids.is_empty());
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_fail_publish() {
        let store = Arc::new(FakeStore::with_post(post(PostStatus::Approved)));
        let publisher = Arc::new(FakePublisher {
            behavior: Behavior::default(),
            store: Arc::clone(&store),
            sent: Mutex::new(vec![]),
            observed: Mutex::new(vec![]),
        });
        let notifier = Arc::new(FakeNotifier {
            fail: true,
            ..Default::default()
        });
        let tracker: TestTracker = PublicationTracker::new(
            Arc::clone(&store),
            publisher,
            MediaResolver::new(Arc::new(FakeUploader), vec![]),
            Arc::new(SystemClock),
            TrackerConfig::default(),
        )
        .with_notifier(notifier.clone());

        let outcome = tracker
            .publish("post-1", PublishRequest::automatic())
            .await
            .unwrap();

        assert_eq!(outcome.external_post_id, EXTERNAL_ID);
        assert_eq!(notifier.notices.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejections_report_stored_attempts() {
        let disabled = Behavior {
            disabled: true,
            ..Default::default()
        };
        let h = harness_with(
            store_with_failures(PostStatus::Approved, 2).await,
            disabled,
            TrackerConfig::default(),
        );

        let err = h
            .tracker
            .publish("post-1", PublishRequest::automatic())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
        assert_eq!(err.attempts, 2);
        assert!(err.max_reached);

        let err = h.tracker.approve_and_publish("post-1", None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
        assert_eq!(err.attempts, 2);
        assert!(err.max_reached);

        let h = harness_with(
            store_with_failures(PostStatus::AwaitingReview, 2).await,
            Behavior::default(),
            TrackerConfig::default(),
        );
        let err = h
            .tracker
            .publish("post-1", PublishRequest::manual(None))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvariantViolation);
        assert_eq!(err.attempts, 2);
        assert!(err.max_reached);
        assert_eq!(h.publisher.calls(), 0);
    }
}
