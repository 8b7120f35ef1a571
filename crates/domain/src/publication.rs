//! Publication record state machine
//!
//! A [`PublicationRecord`] tracks every attempt to publish one post. Its
//! fields are private; the transition methods below are the only way to
//! derive a new state, and each one checks its guard before returning the
//! next record. Persistence goes through the flat [`RecordPatch`] and
//! [`StoredRecord`] shapes.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::model::MediaSource;

/// Persisted status column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublicationStatus {
    Pending,
    Publishing,
    Published,
    Failed,
    Skipped,
}

impl PublicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicationStatus::Pending => "PENDING",
            PublicationStatus::Publishing => "PUBLISHING",
            PublicationStatus::Published => "PUBLISHED",
            PublicationStatus::Failed => "FAILED",
            PublicationStatus::Skipped => "SKIPPED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(PublicationStatus::Pending),
            "PUBLISHING" => Some(PublicationStatus::Publishing),
            "PUBLISHED" => Some(PublicationStatus::Published),
            "FAILED" => Some(PublicationStatus::Failed),
            "SKIPPED" => Some(PublicationStatus::Skipped),
            _ => None,
        }
    }
}

impl std::fmt::Display for PublicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state; the external identifiers exist only once published
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublicationState {
    Pending,
    Publishing,
    Published {
        external_post_id: String,
        external_url: String,
    },
    Failed,
    Skipped,
}

impl PublicationState {
    pub fn status(&self) -> PublicationStatus {
        match self {
            PublicationState::Pending => PublicationStatus::Pending,
            PublicationState::Publishing => PublicationStatus::Publishing,
            PublicationState::Published { .. } => PublicationStatus::Published,
            PublicationState::Failed => PublicationStatus::Failed,
            PublicationState::Skipped => PublicationStatus::Skipped,
        }
    }
}

/// What initiated a publish attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptTrigger {
    /// Scheduled or pipeline-driven; capped by the maximum attempt count
    Automatic,
    /// Explicit admin action; may exceed the cap
    Manual,
}

/// A guard rejected the requested transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("post is already published")]
    AlreadyPublished,
    #[error("an attempt is already in flight")]
    InFlight,
    #[error("publication was skipped by an administrator")]
    Skipped,
    #[error("maximum attempts reached ({attempts}/{max})")]
    MaxAttemptsReached { attempts: u32, max: u32 },
    #[error("no attempt in flight (status {status})")]
    NotInFlight { status: PublicationStatus },
}

/// Result of recording a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureRecorded {
    pub attempts: u32,
    /// Automatic retries should stop; manual retry stays possible
    pub max_reached: bool,
}

/// Per-post audit trail of publish attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicationRecord {
    id: Uuid,
    post_id: String,
    #[serde(flatten)]
    state: PublicationState,
    attempts: u32,
    last_error: Option<String>,
    media_source: MediaSource,
    /// Row version the record was read at; `None` until first persisted
    version: Option<u64>,
    #[serde(with = "time::serde::rfc3339")]
    updated_at: OffsetDateTime,
}

impl PublicationRecord {
    /// Fresh record for a post that has never been attempted
    pub fn new(post_id: impl Into<String>, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            post_id: post_id.into(),
            state: PublicationState::Pending,
            attempts: 0,
            last_error: None,
            media_source: MediaSource::None,
            version: None,
            updated_at: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn post_id(&self) -> &str {
        &self.post_id
    }

    pub fn state(&self) -> &PublicationState {
        &self.state
    }

    pub fn status(&self) -> PublicationStatus {
        self.state.status()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn media_source(&self) -> MediaSource {
        self.media_source
    }

    pub fn version(&self) -> Option<u64> {
        self.version
    }

    pub fn updated_at(&self) -> OffsetDateTime {
        self.updated_at
    }

    pub fn is_published(&self) -> bool {
        matches!(self.state, PublicationState::Published { .. })
    }

    pub fn external_post_id(&self) -> Option<&str> {
        match &self.state {
            PublicationState::Published {
                external_post_id, ..
            } => Some(external_post_id),
            _ => None,
        }
    }

    pub fn external_url(&self) -> Option<&str> {
        match &self.state {
            PublicationState::Published { external_url, .. } => Some(external_url),
            _ => None,
        }
    }

    pub fn max_reached(&self, max_attempts: u32) -> bool {
        self.attempts >= max_attempts
    }

    /// PENDING | FAILED | SKIPPED (manual) | PUBLISHING (manual) -> PUBLISHING
    ///
    /// Increments the attempt counter. The caller must persist the returned
    /// record before doing any network I/O.
    pub fn start_attempt(
        &self,
        trigger: AttemptTrigger,
        max_attempts: u32,
        now: OffsetDateTime,
    ) -> Result<Self, TransitionError> {
        match (&self.state, trigger) {
            (PublicationState::Published { .. }, _) => {
                return Err(TransitionError::AlreadyPublished);
            }
            (PublicationState::Publishing, AttemptTrigger::Automatic) => {
                return Err(TransitionError::InFlight);
            }
            (PublicationState::Skipped, AttemptTrigger::Automatic) => {
                return Err(TransitionError::Skipped);
            }
            _ => {}
        }

        if trigger == AttemptTrigger::Automatic && self.attempts >= max_attempts {
            return Err(TransitionError::MaxAttemptsReached {
                attempts: self.attempts,
                max: max_attempts,
            });
        }

        Ok(Self {
            state: PublicationState::Publishing,
            attempts: self.attempts.saturating_add(1),
            updated_at: now,
            ..self.clone()
        })
    }

    /// PUBLISHING -> PUBLISHED (terminal)
    pub fn record_success(
        &self,
        external_post_id: impl Into<String>,
        external_url: impl Into<String>,
        media_source: MediaSource,
        now: OffsetDateTime,
    ) -> Result<Self, TransitionError> {
        self.ensure_in_flight()?;

        Ok(Self {
            state: PublicationState::Published {
                external_post_id: external_post_id.into(),
                external_url: external_url.into(),
            },
            last_error: None,
            media_source,
            updated_at: now,
            ..self.clone()
        })
    }

    /// PUBLISHING -> FAILED
    ///
    /// A `None` media source keeps the previous classification (the attempt
    /// ended before media resolution finished).
    pub fn record_failure(
        &self,
        error: impl Into<String>,
        media_source: Option<MediaSource>,
        max_attempts: u32,
        now: OffsetDateTime,
    ) -> Result<(Self, FailureRecorded), TransitionError> {
        self.ensure_in_flight()?;

        let next = Self {
            state: PublicationState::Failed,
            last_error: Some(error.into()),
            media_source: media_source.unwrap_or(self.media_source),
            updated_at: now,
            ..self.clone()
        };
        let recorded = FailureRecorded {
            attempts: next.attempts,
            max_reached: next.max_reached(max_attempts),
        };
        Ok((next, recorded))
    }

    /// Administrative override: any non-published state -> SKIPPED
    pub fn skip(&self, reason: impl Into<String>, now: OffsetDateTime) -> Result<Self, TransitionError> {
        if self.is_published() {
            return Err(TransitionError::AlreadyPublished);
        }

        Ok(Self {
            state: PublicationState::Skipped,
            last_error: Some(reason.into()),
            updated_at: now,
            ..self.clone()
        })
    }

    fn ensure_in_flight(&self) -> Result<(), TransitionError> {
        if self.state == PublicationState::Publishing {
            Ok(())
        } else {
            Err(TransitionError::NotInFlight {
                status: self.status(),
            })
        }
    }

    /// Flat write shape, carrying the version this record was read at
    pub fn to_patch(&self) -> RecordPatch {
        RecordPatch {
            id: self.id,
            status: self.status(),
            attempts: self.attempts,
            last_error: self.last_error.clone(),
            external_post_id: self.external_post_id().map(str::to_string),
            external_url: self.external_url().map(str::to_string),
            media_source: self.media_source,
            updated_at: self.updated_at,
            expected_version: self.version,
        }
    }

    /// Rebuild a record from its stored row, rejecting rows that break the
    /// published-iff-external-id invariant
    pub fn from_stored(stored: StoredRecord) -> Result<Self, RecordIntegrityError> {
        let state = match stored.status {
            PublicationStatus::Pending => PublicationState::Pending,
            PublicationStatus::Publishing => PublicationState::Publishing,
            PublicationStatus::Failed => PublicationState::Failed,
            PublicationStatus::Skipped => PublicationState::Skipped,
            PublicationStatus::Published => {
                match (stored.external_post_id, stored.external_url) {
                    (Some(external_post_id), Some(external_url)) => PublicationState::Published {
                        external_post_id,
                        external_url,
                    },
                    _ => {
                        return Err(RecordIntegrityError {
                            post_id: stored.post_id,
                            message: "published record without external identifiers".to_string(),
                        });
                    }
                }
            }
        };

        Ok(Self {
            id: stored.id,
            post_id: stored.post_id,
            state,
            attempts: stored.attempts,
            last_error: stored.last_error,
            media_source: stored.media_source,
            version: Some(stored.version),
            updated_at: stored.updated_at,
        })
    }
}

/// Write request for `RecordStore::create_or_update_publication_record`
///
/// `expected_version: None` creates the record and must collide if one
/// already exists; `Some(v)` updates only if the stored version is still `v`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPatch {
    pub id: Uuid,
    pub status: PublicationStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub external_post_id: Option<String>,
    pub external_url: Option<String>,
    pub media_source: MediaSource,
    pub updated_at: OffsetDateTime,
    pub expected_version: Option<u64>,
}

impl RecordPatch {
    /// Row as it will exist after this patch is applied
    pub fn into_stored(self, post_id: impl Into<String>) -> StoredRecord {
        let version = self.expected_version.map_or(1, |v| v + 1);
        StoredRecord {
            id: self.id,
            post_id: post_id.into(),
            status: self.status,
            attempts: self.attempts,
            last_error: self.last_error,
            external_post_id: self.external_post_id,
            external_url: self.external_url,
            media_source: self.media_source,
            version,
            updated_at: self.updated_at,
        }
    }
}

/// Row shape held by record stores
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub id: Uuid,
    pub post_id: String,
    pub status: PublicationStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub external_post_id: Option<String>,
    pub external_url: Option<String>,
    pub media_source: MediaSource,
    pub version: u64,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("corrupt publication record for post {post_id}: {message}")]
pub struct RecordIntegrityError {
    pub post_id: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: u32 = 2;

    fn now() -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    fn failed_once() -> PublicationRecord {
        let record = PublicationRecord::new("post-1", now())
            .start_attempt(AttemptTrigger::Automatic, MAX, now())
            .unwrap();
        let (failed, _) = record
            .record_failure("boom", Some(MediaSource::Failed), MAX, now())
            .unwrap();
        failed
    }

    #[test]
    fn test_new_record_is_pending() {
        let record = PublicationRecord::new("post-1", now());
        assert_eq!(record.status(), PublicationStatus::Pending);
        assert_eq!(record.attempts(), 0);
        assert_eq!(record.version(), None);
        assert!(record.external_post_id().is_none());
    }

    #[test]
    fn test_start_attempt_increments_counter() {
        let record = PublicationRecord::new("post-1", now());
        let next = record
            .start_attempt(AttemptTrigger::Automatic, MAX, now())
            .unwrap();

        assert_eq!(next.status(), PublicationStatus::Publishing);
        assert_eq!(next.attempts(), 1);
        // Original is untouched
        assert_eq!(record.attempts(), 0);
    }

    #[test]
    fn test_success_sets_external_ids() {
        let record = PublicationRecord::new("post-1", now())
            .start_attempt(AttemptTrigger::Automatic, MAX, now())
            .unwrap()
            .record_success("123", "https://x.com/i/status/123", MediaSource::Scraped, now())
            .unwrap();

        assert!(record.is_published());
        assert_eq!(record.external_post_id(), Some("123"));
        assert_eq!(record.external_url(), Some("https://x.com/i/status/123"));
        assert_eq!(record.media_source(), MediaSource::Scraped);
        assert_eq!(record.last_error(), None);
    }

    #[test]
    fn test_published_is_terminal() {
        let published = PublicationRecord::new("post-1", now())
            .start_attempt(AttemptTrigger::Manual, MAX, now())
            .unwrap()
            .record_success("123", "url", MediaSource::None, now())
            .unwrap();

        for trigger in [AttemptTrigger::Automatic, AttemptTrigger::Manual] {
            assert_eq!(
                published.start_attempt(trigger, MAX, now()),
                Err(TransitionError::AlreadyPublished)
            );
        }
        assert_eq!(
            published.skip("nope", now()),
            Err(TransitionError::AlreadyPublished)
        );
        assert!(matches!(
            published.record_failure("late", None, MAX, now()),
            Err(TransitionError::NotInFlight { .. })
        ));
    }

    #[test]
    fn test_failure_reports_max_reached() {
        let first = failed_once();
        assert_eq!(first.status(), PublicationStatus::Failed);
        assert_eq!(first.last_error(), Some("boom"));
        assert!(!first.max_reached(MAX));

        let (second, recorded) = first
            .start_attempt(AttemptTrigger::Automatic, MAX, now())
            .unwrap()
            .record_failure("boom again", None, MAX, now())
            .unwrap();

        assert_eq!(recorded.attempts, 2);
        assert!(recorded.max_reached);
        // Previous classification kept when none supplied
        assert_eq!(second.media_source(), MediaSource::Failed);
    }

    #[test]
    fn test_automatic_trigger_capped_manual_is_not() {
        let (exhausted, _) = failed_once()
            .start_attempt(AttemptTrigger::Automatic, MAX, now())
            .unwrap()
            .record_failure("boom", None, MAX, now())
            .unwrap();

        assert_eq!(
            exhausted.start_attempt(AttemptTrigger::Automatic, MAX, now()),
            Err(TransitionError::MaxAttemptsReached {
                attempts: 2,
                max: 2
            })
        );

        let manual = exhausted
            .start_attempt(AttemptTrigger::Manual, MAX, now())
            .unwrap();
        assert_eq!(manual.attempts(), 3);
    }

    #[test]
    fn test_publishing_only_reclaimed_manually() {
        let in_flight = PublicationRecord::new("post-1", now())
            .start_attempt(AttemptTrigger::Automatic, MAX, now())
            .unwrap();

        assert_eq!(
            in_flight.start_attempt(AttemptTrigger::Automatic, MAX, now()),
            Err(TransitionError::InFlight)
        );
        let reclaimed = in_flight
            .start_attempt(AttemptTrigger::Manual, MAX, now())
            .unwrap();
        assert_eq!(reclaimed.attempts(), 2);
    }

    #[test]
    fn test_skipped_blocks_automatic_only() {
        let skipped = PublicationRecord::new("post-1", now())
            .skip("duplicate story", now())
            .unwrap();

        assert_eq!(skipped.status(), PublicationStatus::Skipped);
        assert_eq!(
            skipped.start_attempt(AttemptTrigger::Automatic, MAX, now()),
            Err(TransitionError::Skipped)
        );
        assert!(skipped
            .start_attempt(AttemptTrigger::Manual, MAX, now())
            .is_ok());
    }

    #[test]
    fn test_success_requires_in_flight() {
        let record = PublicationRecord::new("post-1", now());
        assert_eq!(
            record.record_success("1", "u", MediaSource::None, now()),
            Err(TransitionError::NotInFlight {
                status: PublicationStatus::Pending
            })
        );
    }

    #[test]
    fn test_attempt_counter_never_decreases() {
        let mut record = PublicationRecord::new("post-1", now());
        let mut last = record.attempts();

        for i in 0..6 {
            let trigger = if i % 2 == 0 {
                AttemptTrigger::Automatic
            } else {
                AttemptTrigger::Manual
            };
            if let Ok(next) = record.start_attempt(trigger, MAX, now()) {
                assert!(next.attempts() >= last);
                last = next.attempts();
                let (failed, _) = next.record_failure("x", None, MAX, now()).unwrap();
                assert_eq!(failed.attempts(), last);
                record = failed;
            }
        }
        assert!(record.attempts() >= 3);
    }

    #[test]
    fn test_patch_round_trips_through_stored_row() {
        let record = failed_once();
        let stored = record.to_patch().into_stored("post-1");
        assert_eq!(stored.version, 1);

        let restored = PublicationRecord::from_stored(stored).unwrap();
        assert_eq!(restored.status(), PublicationStatus::Failed);
        assert_eq!(restored.attempts(), 1);
        assert_eq!(restored.version(), Some(1));

        let bumped = restored.to_patch().into_stored("post-1");
        assert_eq!(bumped.version, 2);
    }

    #[test]
    fn test_from_stored_rejects_published_without_ids() {
        let mut stored = failed_once().to_patch().into_stored("post-1");
        stored.status = PublicationStatus::Published;

        assert!(PublicationRecord::from_stored(stored).is_err());
    }
}
