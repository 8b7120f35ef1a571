//! In-memory record store for testing and offline mode

use async_trait::async_trait;
use outpost_domain::{
    Post, PostPatch, PublicationRecord, RecordPatch, RecordStore, StoreError, StoredRecord,
};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory record store with the same compare-and-set semantics as SQLite
pub struct InMemoryRecordStore {
    posts: RwLock<HashMap<String, Post>>,
    records: RwLock<HashMap<String, StoredRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            posts: RwLock::new(HashMap::new()),
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get_publication_record(
        &self,
        post_id: &str,
    ) -> Result<Option<PublicationRecord>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        match records.get(post_id) {
            Some(row) => Ok(Some(PublicationRecord::from_stored(row.clone())?)),
            None => Ok(None),
        }
    }

    async fn create_or_update_publication_record(
        &self,
        post_id: &str,
        patch: &RecordPatch,
    ) -> Result<PublicationRecord, StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let current = records.get(post_id).map(|r| r.version);
        match (current, patch.expected_version) {
            (Some(_), None) => {
                return Err(StoreError::Conflict(format!(
                    "publication record for {} already exists",
                    post_id
                )));
            }
            (found, Some(expected)) if found != Some(expected) => {
                return Err(StoreError::Conflict(format!(
                    "publication record for {} changed since version {}",
                    post_id, expected
                )));
            }
            _ => {}
        }

        let stored = patch.clone().into_stored(post_id);
        records.insert(post_id.to_string(), stored.clone());
        Ok(PublicationRecord::from_stored(stored)?)
    }

    async fn get_post(&self, post_id: &str) -> Result<Option<Post>, StoreError> {
        let posts = self
            .posts
            .read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(posts.get(post_id).cloned())
    }

    async fn update_post(&self, post_id: &str, patch: &PostPatch) -> Result<Post, StoreError> {
        let mut posts = self
            .posts
            .write()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let post = posts
            .get_mut(post_id)
            .ok_or_else(|| StoreError::NotFound(format!("post {}", post_id)))?;
        patch.apply(post);
        Ok(post.clone())
    }

    async fn insert_post(&self, post: &Post) -> Result<(), StoreError> {
        let mut posts = self
            .posts
            .write()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        if posts.contains_key(&post.id) {
            return Err(StoreError::Conflict(format!("post {} already exists", post.id)));
        }
        posts.insert(post.id.clone(), post.clone());
        Ok(())
    }
}
