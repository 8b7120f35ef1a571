//! SQLite record store implementation

use async_trait::async_trait;
use outpost_domain::{
    MediaSource, Post, PostPatch, PostStatus, PublicationRecord, PublicationStatus, RecordPatch,
    RecordStore, SourceKind, StoreError, StoredRecord,
};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// SQLite-backed record store
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

type RecordRow = (
    String,
    String,
    String,
    i64,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    i64,
    String,
);

type PostRow = (
    String,
    String,
    Option<String>,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
);

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn format_time(value: OffsetDateTime) -> Result<String, StoreError> {
    value
        .format(&Rfc3339)
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

fn parse_time(value: &str) -> Result<OffsetDateTime, StoreError> {
    OffsetDateTime::parse(value, &Rfc3339).map_err(|e| StoreError::Serialization(e.to_string()))
}

impl SqliteRecordStore {
    /// Open (or create) the database at `db_path` and run migrations
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    StoreError::Database(format!("Failed to create directory: {}", e))
                })?;
            }
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .map_err(db_err)?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Open an existing database read-only, without creating or migrating it
    pub async fn open_read_only(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();
        if !db_path.exists() {
            return Err(StoreError::NotFound(db_path.display().to_string()));
        }

        let db_url = format!("sqlite:{}?mode=ro", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&db_url)
            .await
            .map_err(db_err)?;

        Ok(Self { pool })
    }

    /// Create an in-memory SQLite store (for testing)
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                title TEXT,
                summary TEXT NOT NULL,
                categories TEXT NOT NULL,
                source TEXT NOT NULL,
                source_url TEXT NOT NULL,
                image_urls TEXT NOT NULL,
                card_image_url TEXT,
                external_post_id TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS publication_records (
                id TEXT PRIMARY KEY,
                post_id TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                external_post_id TEXT,
                external_url TEXT,
                media_source TEXT NOT NULL,
                version INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    /// Health probe for `doctor`
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_record(&self, stored: &StoredRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO publication_records
            (id, post_id, status, attempts, last_error, external_post_id, external_url,
             media_source, version, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(stored.id.to_string())
        .bind(&stored.post_id)
        .bind(stored.status.as_str())
        .bind(i64::from(stored.attempts))
        .bind(&stored.last_error)
        .bind(&stored.external_post_id)
        .bind(&stored.external_url)
        .bind(stored.media_source.as_str())
        .bind(stored.version as i64)
        .bind(format_time(stored.updated_at)?)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::Conflict(format!(
                "publication record for {} already exists",
                stored.post_id
            ))),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn update_record(&self, stored: &StoredRecord, expected: u64) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE publication_records SET
                status = ?,
                attempts = ?,
                last_error = ?,
                external_post_id = ?,
                external_url = ?,
                media_source = ?,
                version = ?,
                updated_at = ?
            WHERE post_id = ? AND version = ?
            "#,
        )
        .bind(stored.status.as_str())
        .bind(i64::from(stored.attempts))
        .bind(&stored.last_error)
        .bind(&stored.external_post_id)
        .bind(&stored.external_url)
        .bind(stored.media_source.as_str())
        .bind(stored.version as i64)
        .bind(format_time(stored.updated_at)?)
        .bind(&stored.post_id)
        .bind(expected as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "publication record for {} changed since version {}",
                stored.post_id, expected
            )));
        }

        Ok(())
    }
}

fn record_from_row(row: RecordRow) -> Result<PublicationRecord, StoreError> {
    let (
        id,
        post_id,
        status,
        attempts,
        last_error,
        external_post_id,
        external_url,
        media_source,
        version,
        updated_at,
    ) = row;

    let stored = StoredRecord {
        id: Uuid::parse_str(&id).map_err(|e| StoreError::Serialization(e.to_string()))?,
        status: PublicationStatus::parse(&status)
            .ok_or_else(|| StoreError::Serialization(format!("unknown status: {}", status)))?,
        attempts: u32::try_from(attempts)
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        last_error,
        external_post_id,
        external_url,
        media_source: MediaSource::parse(&media_source).ok_or_else(|| {
            StoreError::Serialization(format!("unknown media source: {}", media_source))
        })?,
        version: u64::try_from(version).map_err(|e| StoreError::Serialization(e.to_string()))?,
        updated_at: parse_time(&updated_at)?,
        post_id,
    };

    Ok(PublicationRecord::from_stored(stored)?)
}

fn post_from_row(row: PostRow) -> Result<Post, StoreError> {
    let (
        id,
        status,
        title,
        summary,
        categories,
        source,
        source_url,
        image_urls,
        card_image_url,
        external_post_id,
        created_at,
    ) = row;

    Ok(Post {
        status: PostStatus::parse(&status)
            .ok_or_else(|| StoreError::Serialization(format!("unknown post status: {}", status)))?,
        title,
        summary,
        categories: serde_json::from_str(&categories)
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        source: SourceKind::parse(&source)
            .ok_or_else(|| StoreError::Serialization(format!("unknown source: {}", source)))?,
        source_url,
        image_urls: serde_json::from_str(&image_urls)
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        card_image_url,
        external_post_id,
        created_at: parse_time(&created_at)?,
        id,
    })
}

const RECORD_COLUMNS: &str = "id, post_id, status, attempts, last_error, external_post_id, \
     external_url, media_source, version, updated_at";

const POST_COLUMNS: &str = "id, status, title, summary, categories, source, source_url, \
     image_urls, card_image_url, external_post_id, created_at";

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get_publication_record(
        &self,
        post_id: &str,
    ) -> Result<Option<PublicationRecord>, StoreError> {
        let query = format!(
            "SELECT {} FROM publication_records WHERE post_id = ?",
            RECORD_COLUMNS
        );
        let row: Option<RecordRow> = sqlx::query_as(&query)
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(record_from_row).transpose()
    }

    async fn create_or_update_publication_record(
        &self,
        post_id: &str,
        patch: &RecordPatch,
    ) -> Result<PublicationRecord, StoreError> {
        let expected = patch.expected_version;
        let stored = patch.clone().into_stored(post_id);

        match expected {
            None => self.insert_record(&stored).await?,
            Some(version) => self.update_record(&stored, version).await?,
        }

        Ok(PublicationRecord::from_stored(stored)?)
    }

    async fn get_post(&self, post_id: &str) -> Result<Option<Post>, StoreError> {
        let query = format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS);
        let row: Option<PostRow> = sqlx::query_as(&query)
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(post_from_row).transpose()
    }

    async fn update_post(&self, post_id: &str, patch: &PostPatch) -> Result<Post, StoreError> {
        let mut post = self
            .get_post(post_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("post {}", post_id)))?;
        patch.apply(&mut post);

        sqlx::query("UPDATE posts SET status = ?, external_post_id = ? WHERE id = ?")
            .bind(post.status.as_str())
            .bind(&post.external_post_id)
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(post)
    }

    async fn insert_post(&self, post: &Post) -> Result<(), StoreError> {
        let categories = serde_json::to_string(&post.categories)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let image_urls = serde_json::to_string(&post.image_urls)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO posts
            (id, status, title, summary, categories, source, source_url, image_urls,
             card_image_url, external_post_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(post.status.as_str())
        .bind(&post.title)
        .bind(&post.summary)
        .bind(categories)
        .bind(post.source.as_str())
        .bind(&post.source_url)
        .bind(image_urls)
        .bind(&post.card_image_url)
        .bind(&post.external_post_id)
        .bind(format_time(post.created_at)?)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(StoreError::Conflict(format!("post {} already exists", post.id)))
            }
            Err(e) => Err(db_err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_domain::AttemptTrigger;

    fn sample_post(id: &str) -> Post {
        Post {
            id: id.to_string(),
            status: PostStatus::AwaitingReview,
            title: Some("Li Auto L6 deliveries".to_string()),
            summary: "Li Auto delivered 50,000 L6 units.".to_string(),
            categories: vec!["Li Auto".to_string(), "Sales".to_string()],
            source: SourceKind::Official,
            source_url: "https://example.com/li-l6".to_string(),
            image_urls: vec!["https://example.com/l6.jpg".to_string()],
            card_image_url: Some("https://example.com/card.jpg".to_string()),
            external_post_id: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn test_post_roundtrip_and_update() {
        let store = SqliteRecordStore::in_memory().await.unwrap();
        store.insert_post(&sample_post("p1")).await.unwrap();

        let loaded = store.get_post("p1").await.unwrap().unwrap();
        assert_eq!(loaded.categories, vec!["Li Auto", "Sales"]);
        assert_eq!(loaded.card_image_url.as_deref(), Some("https://example.com/card.jpg"));

        let updated = store
            .update_post("p1", &PostPatch::published("99"))
            .await
            .unwrap();
        assert_eq!(updated.status, PostStatus::Published);

        let reloaded = store.get_post("p1").await.unwrap().unwrap();
        assert_eq!(reloaded.external_post_id.as_deref(), Some("99"));
    }

    #[tokio::test]
    async fn test_duplicate_post_is_conflict() {
        let store = SqliteRecordStore::in_memory().await.unwrap();
        store.insert_post(&sample_post("p1")).await.unwrap();

        let result = store.insert_post(&sample_post("p1")).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_update_missing_post() {
        let store = SqliteRecordStore::in_memory().await.unwrap();
        let result = store.update_post("nope", &PostPatch::approved()).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_record_versioning() {
        let store = SqliteRecordStore::in_memory().await.unwrap();
        let now = OffsetDateTime::now_utc();

        assert!(store.get_publication_record("p1").await.unwrap().is_none());

        let created = store
            .create_or_update_publication_record(
                "p1",
                &PublicationRecord::new("p1", now)
                    .start_attempt(AttemptTrigger::Automatic, 2, now)
                    .unwrap()
                    .to_patch(),
            )
            .await
            .unwrap();
        assert_eq!(created.version(), Some(1));
        assert_eq!(created.status(), PublicationStatus::Publishing);

        let published = created
            .record_success("1790", "https://x.com/i/status/1790", MediaSource::Scraped, now)
            .unwrap();
        let stored = store
            .create_or_update_publication_record("p1", &published.to_patch())
            .await
            .unwrap();
        assert_eq!(stored.version(), Some(2));

        let loaded = store.get_publication_record("p1").await.unwrap().unwrap();
        assert!(loaded.is_published());
        assert_eq!(loaded.external_url(), Some("https://x.com/i/status/1790"));
        assert_eq!(loaded.media_source(), MediaSource::Scraped);
        assert_eq!(loaded.attempts(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_create_conflicts() {
        let store = SqliteRecordStore::in_memory().await.unwrap();
        let now = OffsetDateTime::now_utc();
        let first = PublicationRecord::new("p1", now);
        let second = PublicationRecord::new("p1", now);

        store
            .create_or_update_publication_record("p1", &first.to_patch())
            .await
            .unwrap();
        let result = store
            .create_or_update_publication_record("p1", &second.to_patch())
            .await;

        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let store = SqliteRecordStore::in_memory().await.unwrap();
        let now = OffsetDateTime::now_utc();

        let v1 = store
            .create_or_update_publication_record("p1", &PublicationRecord::new("p1", now).to_patch())
            .await
            .unwrap();

        let attempt = v1.start_attempt(AttemptTrigger::Automatic, 2, now).unwrap();
        store
            .create_or_update_publication_record("p1", &attempt.to_patch())
            .await
            .unwrap();

        // Second writer still holding version 1
        let stale = v1.skip("duplicate", now).unwrap();
        let result = store
            .create_or_update_publication_record("p1", &stale.to_patch())
            .await;

        assert!(matches!(result, Err(StoreError::Conflict(_))));
        let current = store.get_publication_record("p1").await.unwrap().unwrap();
        assert_eq!(current.status(), PublicationStatus::Publishing);
    }

    #[tokio::test]
    async fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("outpost.db");

        {
            let store = SqliteRecordStore::new(&path).await.unwrap();
            store.insert_post(&sample_post("p1")).await.unwrap();
        }

        let store = SqliteRecordStore::new(&path).await.unwrap();
        assert!(store.get_post("p1").await.unwrap().is_some());
        store.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_only_open_never_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("missing.sqlite");

        let result = SqliteRecordStore::open_read_only(&db_path).await;

        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert!(!db_path.exists());

        let _writer = SqliteRecordStore::new(&db_path).await.unwrap();
        let store = SqliteRecordStore::open_read_only(&db_path).await.unwrap();
        store.ping().await.unwrap();
        assert!(store.get_post("post-1").await.unwrap().is_none());
    }
}
