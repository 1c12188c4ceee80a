//! Cache staleness decisions for derived author statistics
//!
//! An author's cached aggregate is current only while no raw source record
//! for that author is newer than it. The resolver gates recomputation; it
//! never scores anything itself.

use chrono::{DateTime, Utc};
use pip_common::models::{
    AUTHOR_STATS_COLLECTION, PUBLICATION_STATS_COLLECTION, RAW_AUTHOR_COLLECTION, RAW_PUBLICATION_COLLECTION,
};
use pip_common::Result;
use std::sync::Arc;
use tracing::debug;

use super::store::{prefix_end, CacheStore};

/// Timestamps behind one staleness decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessCheck {
    /// Write time of the cached aggregate
    pub cached: Option<DateTime<Utc>>,
    /// Newest raw author or publication write
    pub last_modified: Option<DateTime<Utc>>,
}

impl StalenessCheck {
    /// Stale when nothing is cached or the source is strictly newer
    pub fn is_stale(&self) -> bool {
        match (self.cached, self.last_modified) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(cached), Some(modified)) => cached < modified,
        }
    }
}

/// Compares cached aggregate timestamps against raw record timestamps
#[derive(Clone)]
pub struct StalenessResolver {
    store: Arc<dyn CacheStore>,
}

impl StalenessResolver {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Newest write among the raw author record and its publications
    ///
    /// Publications are found by a prefix scan over `[author_id, author_id + END_SENTINEL)`.
    pub async fn last_modified(&self, author_id: &str) -> Result<Option<DateTime<Utc>>> {
        let author = self
            .store
            .get(RAW_AUTHOR_COLLECTION, author_id)
            .await?
            .map(|e| e.timestamp);

        let publications = self
            .store
            .latest_timestamp_in_range(RAW_PUBLICATION_COLLECTION, author_id, &prefix_end(author_id))
            .await?;

        Ok(author.max(publications))
    }

    /// Timestamps for a staleness decision on an author's aggregate
    pub async fn check(&self, author_id: &str) -> Result<StalenessCheck> {
        self.check_derived(AUTHOR_STATS_COLLECTION, author_id, author_id).await
    }

    /// Timestamps for any document derived from one author's raw records
    pub async fn check_derived(&self, collection: &str, document_id: &str, author_id: &str) -> Result<StalenessCheck> {
        let cached = self
            .store
            .get(collection, document_id)
            .await?
            .map(|e| e.timestamp);
        let last_modified = self.last_modified(author_id).await?;

        let check = StalenessCheck {
            cached,
            last_modified,
        };
        debug!(
            collection,
            document_id,
            author_id,
            cached = ?check.cached,
            last_modified = ?check.last_modified,
            stale = check.is_stale(),
            "Checked staleness"
        );
        Ok(check)
    }

    pub async fn author_is_stale(&self, author_id: &str) -> Result<bool> {
        Ok(self.check(author_id).await?.is_stale())
    }

    /// Per-publication statistics follow their author's raw records
    pub async fn publication_is_stale(&self, author_id: &str, publication_id: &str) -> Result<bool> {
        Ok(self
            .check_derived(PUBLICATION_STATS_COLLECTION, publication_id, author_id)
            .await?
            .is_stale())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryDocumentStore;
    use chrono::Duration;
    use serde_json::json;

    fn resolver() -> (Arc<MemoryDocumentStore>, StalenessResolver) {
        let store = Arc::new(MemoryDocumentStore::new());
        (store.clone(), StalenessResolver::new(store))
    }

    #[tokio::test]
    async fn test_missing_cache_is_stale() {
        let (_, resolver) = resolver();
        assert!(resolver.author_is_stale("abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_cache_without_source_records_is_fresh() {
        let (store, resolver) = resolver();
        store
            .put(AUTHOR_STATS_COLLECTION, "abc", json!({}), pip_common::time::now())
            .await
            .unwrap();
        assert!(!resolver.author_is_stale("abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_equal_timestamps_are_fresh() {
        let (store, resolver) = resolver();
        let t = pip_common::time::now();
        store.put(RAW_AUTHOR_COLLECTION, "abc", json!({}), t).await.unwrap();
        store.put(AUTHOR_STATS_COLLECTION, "abc", json!({}), t).await.unwrap();
        assert!(!resolver.author_is_stale("abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_newer_publication_makes_stale() {
        let (store, resolver) = resolver();
        let t = pip_common::time::now();
        store.put(RAW_AUTHOR_COLLECTION, "abc", json!({}), t).await.unwrap();
        store.put(AUTHOR_STATS_COLLECTION, "abc", json!({}), t + Duration::seconds(1)).await.unwrap();
        assert!(!resolver.author_is_stale("abc").await.unwrap());

        store
            .put(RAW_PUBLICATION_COLLECTION, "abc:p1", json!({}), t + Duration::seconds(2))
            .await
            .unwrap();
        assert!(resolver.author_is_stale("abc").await.unwrap());

        let check = resolver.check("abc").await.unwrap();
        assert_eq!(check.last_modified, Some(t + Duration::seconds(2)));
    }

    #[tokio::test]
    async fn test_other_authors_publications_ignored() {
        let (store, resolver) = resolver();
        let t = pip_common::time::now();
        store.put(AUTHOR_STATS_COLLECTION, "abc", json!({}), t).await.unwrap();
        store
            .put(RAW_PUBLICATION_COLLECTION, "abd:p1", json!({}), t + Duration::seconds(5))
            .await
            .unwrap();
        assert!(!resolver.author_is_stale("abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_publication_stats_follow_author_records() {
        let (store, resolver) = resolver();
        let t = pip_common::time::now();
        assert!(resolver.publication_is_stale("abc", "abc:p1").await.unwrap());

        store.put(PUBLICATION_STATS_COLLECTION, "abc:p1", json!({}), t).await.unwrap();
        assert!(!resolver.publication_is_stale("abc", "abc:p1").await.unwrap());

        // A write to any of the author's raw records invalidates it
        store
            .put(RAW_PUBLICATION_COLLECTION, "abc:p2", json!({}), t + Duration::seconds(1))
            .await
            .unwrap();
        assert!(resolver.publication_is_stale("abc", "abc:p1").await.unwrap());
    }
}
