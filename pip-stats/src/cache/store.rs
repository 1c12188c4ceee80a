//! Collection-keyed document store contract
//!
//! Documents carry a write timestamp. The store holds no TTL policy: whether
//! a document is current is decided by [`StalenessResolver`](super::StalenessResolver).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pip_common::models::CacheEntry;
use pip_common::Result;
use serde_json::Value;
use tracing::{error, warn};

/// Upper bound appended to a prefix to form a half-open id range
///
/// A private-use code point that sorts after every character used in ids.
pub const END_SENTINEL: char = '\u{f8ff}';

/// Exclusive upper bound of the id range covering `prefix`
pub fn prefix_end(prefix: &str) -> String {
    let mut end = String::with_capacity(prefix.len() + END_SENTINEL.len_utf8());
    end.push_str(prefix);
    end.push(END_SENTINEL);
    end
}

/// Document store backend
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch one document with its timestamp
    async fn get(&self, collection: &str, id: &str) -> Result<Option<CacheEntry>>;

    /// Write one document unconditionally (last writer wins)
    async fn put(
        &self,
        collection: &str,
        id: &str,
        payload: Value,
        timestamp: DateTime<Utc>,
    ) -> Result<()>;

    /// Newest timestamp among documents whose id lies in `[start, end)`
    async fn latest_timestamp_in_range(
        &self,
        collection: &str,
        start: &str,
        end: &str,
    ) -> Result<Option<DateTime<Utc>>>;

    /// All documents whose id starts with `prefix`, ordered by id
    async fn entries_by_prefix(&self, collection: &str, prefix: &str) -> Result<Vec<CacheEntry>>;

    /// Ids of the least recently written documents, oldest first
    async fn oldest_ids(&self, collection: &str, limit: usize) -> Result<Vec<String>>;

    /// Ids of all documents whose id starts with `prefix`
    async fn ids_by_prefix(&self, collection: &str, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries_by_prefix(collection, prefix)
            .await?
            .into_iter()
            .map(|e| e.document_id)
            .collect())
    }

    /// Payload and timestamp of a document, both absent on a miss or read failure
    async fn lookup(&self, collection: &str, id: &str) -> (Option<Value>, Option<DateTime<Utc>>) {
        match self.get(collection, id).await {
            Ok(Some(entry)) => (Some(entry.payload), Some(entry.timestamp)),
            Ok(None) => (None, None),
            Err(e) => {
                warn!(collection, document_id = id, error = %e, "Document read failed");
                (None, None)
            }
        }
    }

    /// Whether a document exists
    async fn contains(&self, collection: &str, id: &str) -> Result<bool> {
        Ok(self.get(collection, id).await?.is_some())
    }

    /// Write a document stamped with the current time
    ///
    /// Returns `false` when nothing was written.
    async fn set(&self, collection: &str, id: &str, payload: Value) -> bool {
        self.set_at(collection, id, payload, pip_common::time::now()).await
    }

    /// Write a document stamped with `timestamp`
    ///
    /// Derived documents are stamped with the time their inputs were read, so
    /// a source write landing during the computation still compares newer.
    /// Blank ids are rejected so nothing can overwrite a catch-all document.
    async fn set_at(&self, collection: &str, id: &str, payload: Value, timestamp: DateTime<Utc>) -> bool {
        if id.trim().is_empty() {
            error!(collection, "Refusing to write document with blank id");
            return false;
        }
        match self.put(collection, id, payload, timestamp).await {
            Ok(()) => true,
            Err(e) => {
                error!(collection, document_id = id, error = %e, "Document write failed");
                false
            }
        }
    }
}
