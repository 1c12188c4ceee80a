//! Shared fixtures for pip-stats integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use pip_common::config::TomlConfig;
use pip_common::models::{CoauthorRef, PublicationStub, RawAuthor, RawPublication, RefreshTask};
use pip_stats::scoring::{PercentileTable, ScoringEngine};
use pip_common::models::RAW_PUBLICATION_COLLECTION;
use pip_stats::cache::CacheStore;
use pip_stats::services::{
    PushQueue, QueueError, SourceError, SourceProvider, SqliteTaskQueue, StoreWarehouse, Warehouse,
    WarehouseRecord, WorkQueue,
};
use pip_stats::Components;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Small but complete set of reference tables
pub fn test_engine() -> ScoringEngine {
    let citations = PercentileTable::from_csv_str(
        "age,0,25,50,75,100\n\
         1,0,1,2,5,20\n\
         5,0,5,10,50,100\n\
         10,0,10,30,100,300\n\
         40,0,20,60,200,600\n",
    )
    .unwrap();
    let productivity = PercentileTable::from_csv_str(
        "years_since_first_pub,0,25,50,75,100\n\
         1,1,1,2,3,5\n\
         5,1,3,6,10,20\n\
         10,2,8,15,30,60\n\
         40,5,20,50,100,100\n",
    )
    .unwrap();
    let pip_auc = PercentileTable::from_csv_str("key,0,25,50,75,100\n0,0.0,0.1,0.25,0.4,0.8\n").unwrap();
    ScoringEngine::new(citations, productivity, pip_auc)
}

/// Components over a private in-memory database
pub async fn test_components(config: &TomlConfig) -> Components {
    let pool = pip_common::db::init_memory_database().await.unwrap();
    Components::new(pool, config, Arc::new(test_engine()))
}

pub fn stub(author_id: &str, n: usize, years_ago: i32, citations: u64) -> PublicationStub {
    PublicationStub {
        author_pub_id: format!("{}:p{}", author_id, n),
        title: Some(format!("Paper {}", n)),
        pub_year: Some(pip_common::time::current_year() - years_ago),
        num_citations: citations,
    }
}

pub fn raw_author(author_id: &str, name: &str, publications: Vec<PublicationStub>, coauthors: &[&str]) -> RawAuthor {
    RawAuthor {
        scholar_id: author_id.to_string(),
        name: Some(name.to_string()),
        affiliation: None,
        citedby: publications.iter().map(|p| p.num_citations).sum(),
        publications,
        coauthors: coauthors
            .iter()
            .map(|id| CoauthorRef {
                scholar_id: id.to_string(),
                name: None,
            })
            .collect(),
    }
}

/// Scripted source provider; unknown ids are `NotFound`
#[derive(Default)]
pub struct FakeSource {
    authors: HashMap<String, RawAuthor>,
    publications: HashMap<String, RawPublication>,
    pub author_calls: AtomicUsize,
    pub publication_calls: AtomicUsize,
    /// Endpoints requested, in call order
    pub target_urls: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve an author and, with more citations, each of its publications
    pub fn with_author(mut self, author: RawAuthor, extra_citations: u64) -> Self {
        for stub in &author.publications {
            let mut filled = RawPublication::from(stub);
            filled.num_citations += extra_citations;
            self.publications.insert(stub.author_pub_id.clone(), filled);
        }
        self.authors.insert(author.scholar_id.clone(), author);
        self
    }

    pub fn author_calls(&self) -> usize {
        self.author_calls.load(Ordering::SeqCst)
    }

    pub fn target_urls(&self) -> Vec<String> {
        self.target_urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceProvider for FakeSource {
    async fn fetch_author(&self, target_url: &str, author_id: &str) -> Result<RawAuthor, SourceError> {
        self.author_calls.fetch_add(1, Ordering::SeqCst);
        self.target_urls.lock().unwrap().push(target_url.to_string());
        self.authors
            .get(author_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(author_id.to_string()))
    }

    async fn fetch_publication(&self, target_url: &str, publication_id: &str) -> Result<RawPublication, SourceError> {
        self.publication_calls.fetch_add(1, Ordering::SeqCst);
        self.target_urls.lock().unwrap().push(target_url.to_string());
        self.publications
            .get(publication_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(publication_id.to_string()))
    }
}

/// Queue whose transport is down
pub struct BrokenQueue;

#[async_trait]
impl PushQueue for BrokenQueue {
    async fn create_task(&self, _task: &RefreshTask) -> Result<(), QueueError> {
        Err(QueueError::Backend("connection refused".to_string()))
    }
}

/// Local queue whose first `complete` call fails, as on a busy database
pub struct FlakyQueue {
    inner: SqliteTaskQueue,
    failed: AtomicBool,
}

impl FlakyQueue {
    pub fn new(inner: SqliteTaskQueue) -> Self {
        Self {
            inner,
            failed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl WorkQueue for FlakyQueue {
    async fn claim_next(&self) -> Result<Option<RefreshTask>, QueueError> {
        self.inner.claim_next().await
    }

    async fn complete(&self, name: &str) -> Result<(), QueueError> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(QueueError::Backend("database is locked".to_string()));
        }
        self.inner.complete(name).await
    }

    async fn fail(&self, name: &str, error: &str) -> Result<(), QueueError> {
        self.inner.fail(name, error).await
    }

    async fn requeue_running(&self) -> Result<u64, QueueError> {
        self.inner.requeue_running().await
    }
}

/// Warehouse over a store where one raw publication lands right after the
/// first read, as when the queue worker writes during a recomputation
pub struct LateWriteWarehouse {
    inner: StoreWarehouse,
    store: Arc<dyn CacheStore>,
    late: Mutex<Option<(String, serde_json::Value)>>,
}

impl LateWriteWarehouse {
    pub fn new(store: Arc<dyn CacheStore>, publication_id: &str, payload: serde_json::Value) -> Self {
        Self {
            inner: StoreWarehouse::new(store.clone()),
            store,
            late: Mutex::new(Some((publication_id.to_string(), payload))),
        }
    }
}

#[async_trait]
impl Warehouse for LateWriteWarehouse {
    async fn author_record(&self, author_id: &str) -> pip_common::Result<Option<WarehouseRecord>> {
        let record = self.inner.author_record(author_id).await?;
        let late = self.late.lock().unwrap().take();
        if let Some((publication_id, payload)) = late {
            self.store.set(RAW_PUBLICATION_COLLECTION, &publication_id, payload).await;
        }
        Ok(record)
    }
}
