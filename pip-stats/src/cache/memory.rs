//! In-process document store
//!
//! Holds documents in an ordered map so prefix and range scans follow the
//! same byte ordering as the SQLite backend. Suits callers that need no
//! database, tests among them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pip_common::models::CacheEntry;
use pip_common::Result;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::store::{prefix_end, CacheStore};

type Key = (String, String);

#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<BTreeMap<Key, (Value, DateTime<Utc>)>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn range_key(collection: &str, id: &str) -> Key {
    (collection.to_string(), id.to_string())
}

#[async_trait]
impl CacheStore for MemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<CacheEntry>> {
        let documents = self.documents.read().await;
        Ok(documents
            .get(&range_key(collection, id))
            .map(|(payload, timestamp)| CacheEntry {
                collection: collection.to_string(),
                document_id: id.to_string(),
                payload: payload.clone(),
                timestamp: *timestamp,
            }))
    }

    async fn contains(&self, collection: &str, id: &str) -> Result<bool> {
        Ok(self.documents.read().await.contains_key(&range_key(collection, id)))
    }

    async fn put(
        &self,
        collection: &str,
        id: &str,
        payload: Value,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        self.documents
            .write()
            .await
            .insert(range_key(collection, id), (payload, timestamp));
        Ok(())
    }

    async fn latest_timestamp_in_range(
        &self,
        collection: &str,
        start: &str,
        end: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        if start >= end {
            return Ok(None);
        }
        let documents = self.documents.read().await;
        Ok(documents
            .range(range_key(collection, start)..range_key(collection, end))
            .map(|(_, (_, timestamp))| *timestamp)
            .max())
    }

    async fn entries_by_prefix(&self, collection: &str, prefix: &str) -> Result<Vec<CacheEntry>> {
        let documents = self.documents.read().await;
        Ok(documents
            .range(range_key(collection, prefix)..range_key(collection, &prefix_end(prefix)))
            .map(|((c, id), (payload, timestamp))| CacheEntry {
                collection: c.clone(),
                document_id: id.clone(),
                payload: payload.clone(),
                timestamp: *timestamp,
            })
            .collect())
    }

    async fn oldest_ids(&self, collection: &str, limit: usize) -> Result<Vec<String>> {
        let documents = self.documents.read().await;
        let mut entries: Vec<(&String, &DateTime<Utc>)> = documents
            .iter()
            .filter(|((c, _), _)| c == collection)
            .map(|((_, id), (_, timestamp))| (id, timestamp))
            .collect();
        entries.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)));
        Ok(entries.into_iter().take(limit).map(|(id, _)| id.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[tokio::test]
    async fn test_range_scan_is_collection_scoped() {
        let store = MemoryDocumentStore::new();
        let t0 = pip_common::time::now();

        store.put("p", "abc:1", json!({}), t0).await.unwrap();
        store.put("p", "abc:2", json!({}), t0 + Duration::seconds(4)).await.unwrap();
        store.put("q", "abc:3", json!({}), t0 + Duration::seconds(9)).await.unwrap();

        let latest = store
            .latest_timestamp_in_range("p", "abc", &prefix_end("abc"))
            .await
            .unwrap();
        assert_eq!(latest, Some(t0 + Duration::seconds(4)));
        assert_eq!(store.ids_by_prefix("p", "abc").await.unwrap(), vec!["abc:1", "abc:2"]);
    }

    #[tokio::test]
    async fn test_set_and_lookup() {
        let store = MemoryDocumentStore::new();
        assert!(!store.set("c", " ", json!({"x": 1})).await);
        assert!(!store.contains("c", " ").await.unwrap());

        assert!(store.set("c", "id", json!({"x": 1})).await);
        let (payload, timestamp) = store.lookup("c", "id").await;
        assert_eq!(payload, Some(json!({"x": 1})));
        assert!(timestamp.is_some());

        assert_eq!(store.lookup("c", "missing").await, (None, None));
    }

    #[tokio::test]
    async fn test_oldest_ids_ordering() {
        let store = MemoryDocumentStore::new();
        let t0 = pip_common::time::now();
        store.put("a", "b", json!({}), t0).await.unwrap();
        store.put("a", "a", json!({}), t0).await.unwrap();
        store.put("a", "c", json!({}), t0 - Duration::seconds(1)).await.unwrap();

        assert_eq!(store.oldest_ids("a", 10).await.unwrap(), vec!["c", "a", "b"]);
        assert_eq!(store.oldest_ids("a", 1).await.unwrap(), vec!["c"]);
    }
}
