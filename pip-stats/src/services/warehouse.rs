//! Authoritative author records and refresh candidates
//!
//! The warehouse answers "what publications does this author have right
//! now", assembled from the raw records the queue worker writes.

use async_trait::async_trait;
use pip_common::models::{RawAuthor, RawPublication, RAW_AUTHOR_COLLECTION, RAW_PUBLICATION_COLLECTION};
use pip_common::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;

use crate::cache::CacheStore;

/// Author row as returned by the warehouse
#[derive(Debug, Clone, PartialEq)]
pub struct WarehouseRecord {
    pub author_id: String,
    pub name: Option<String>,
    pub publications: Vec<RawPublication>,
}

/// Read-only author queries
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Current record for an author, `None` when the source has nothing yet
    async fn author_record(&self, author_id: &str) -> Result<Option<WarehouseRecord>>;
}

/// Pool of author ids that could be refreshed next
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Up to `limit` candidate ids; may contain duplicates
    async fn candidate_ids(&self, limit: usize) -> Result<Vec<String>>;
}

/// Warehouse view over the raw collections of a document store
#[derive(Clone)]
pub struct StoreWarehouse {
    store: Arc<dyn CacheStore>,
}

impl StoreWarehouse {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    async fn raw_author(&self, author_id: &str) -> Result<Option<RawAuthor>> {
        let entry = match self.store.get(RAW_AUTHOR_COLLECTION, author_id).await? {
            Some(entry) => entry,
            None => return Ok(None),
        };
        match serde_json::from_value::<RawAuthor>(entry.payload) {
            Ok(author) => Ok(Some(author)),
            Err(e) => {
                warn!(author_id, error = %e, "Unreadable raw author record");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl Warehouse for StoreWarehouse {
    async fn author_record(&self, author_id: &str) -> Result<Option<WarehouseRecord>> {
        let author = self.raw_author(author_id).await?;

        let prefix = format!("{}:", author_id);
        let mut filled: HashMap<String, RawPublication> = HashMap::new();
        let mut filled_order: Vec<String> = Vec::new();
        for entry in self.store.entries_by_prefix(RAW_PUBLICATION_COLLECTION, &prefix).await? {
            match serde_json::from_value::<RawPublication>(entry.payload) {
                Ok(publication) => {
                    filled_order.push(entry.document_id.clone());
                    filled.insert(entry.document_id, publication);
                }
                Err(e) => {
                    warn!(publication_id = %entry.document_id, error = %e, "Skipping unreadable raw publication");
                }
            }
        }

        if author.is_none() && filled.is_empty() {
            return Ok(None);
        }

        // Author's own listing order first; filled records replace their stubs
        let mut publications = Vec::new();
        let mut seen = HashSet::new();
        let name = author.as_ref().and_then(|a| a.name.clone());
        if let Some(author) = &author {
            for stub in &author.publications {
                if !seen.insert(stub.author_pub_id.clone()) {
                    continue;
                }
                let publication = filled
                    .remove(&stub.author_pub_id)
                    .unwrap_or_else(|| RawPublication::from(stub));
                publications.push(publication);
            }
        }
        for id in filled_order {
            if let Some(publication) = filled.remove(&id) {
                if seen.insert(id) {
                    publications.push(publication);
                }
            }
        }

        Ok(Some(WarehouseRecord {
            author_id: author_id.to_string(),
            name,
            publications,
        }))
    }
}

/// Coauthors referenced by stored authors but not stored themselves
///
/// Only the `scan_limit` least recently refreshed authors are read per call,
/// one record at a time.
#[derive(Clone)]
pub struct CoauthorCandidateSource {
    store: Arc<dyn CacheStore>,
    scan_limit: usize,
}

impl CoauthorCandidateSource {
    pub fn new(store: Arc<dyn CacheStore>, scan_limit: usize) -> Self {
        Self { store, scan_limit }
    }
}

#[async_trait]
impl CandidateSource for CoauthorCandidateSource {
    async fn candidate_ids(&self, limit: usize) -> Result<Vec<String>> {
        let mut candidates = Vec::new();
        if limit == 0 {
            return Ok(candidates);
        }

        let scanned = self.store.oldest_ids(RAW_AUTHOR_COLLECTION, self.scan_limit).await?;
        for author_id in scanned {
            let entry = match self.store.get(RAW_AUTHOR_COLLECTION, &author_id).await? {
                Some(entry) => entry,
                None => continue,
            };
            let author: RawAuthor = match serde_json::from_value(entry.payload) {
                Ok(author) => author,
                Err(e) => {
                    warn!(author_id = %author_id, error = %e, "Skipping unreadable raw author");
                    continue;
                }
            };

            for coauthor in author.coauthors {
                let id = coauthor.scholar_id.trim();
                if id.is_empty() || self.store.contains(RAW_AUTHOR_COLLECTION, id).await? {
                    continue;
                }
                candidates.push(id.to_string());
                if candidates.len() >= limit {
                    return Ok(candidates);
                }
            }
        }
        Ok(candidates)
    }
}
