//! pip-stats library interface
//!
//! Productivity-percentile (PiP) scoring for academic authors, kept in step
//! with an externally scraped source through an idempotent refresh queue.

pub mod api;
pub mod cache;
pub mod dispatch;
pub mod error;
pub mod orchestrator;
pub mod scoring;
pub mod services;
pub mod worker;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use pip_common::config::TomlConfig;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::cache::{CacheStore, SqliteDocumentStore};
use crate::dispatch::TaskDispatcher;
use crate::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::scoring::ScoringEngine;
use crate::services::{CoauthorCandidateSource, SourceProvider, SqliteTaskQueue, StoreWarehouse};
use crate::worker::QueueWorker;

/// Service components wired over one database
#[derive(Clone)]
pub struct Components {
    pub store: Arc<SqliteDocumentStore>,
    pub queue: SqliteTaskQueue,
    pub dispatcher: TaskDispatcher,
    pub orchestrator: Arc<Orchestrator>,
    document_ceiling: usize,
}

impl Components {
    pub fn new(pool: SqlitePool, config: &TomlConfig, engine: Arc<ScoringEngine>) -> Self {
        let store = Arc::new(SqliteDocumentStore::new(pool.clone()));
        let shared: Arc<dyn CacheStore> = store.clone();
        let queue = SqliteTaskQueue::new(pool);

        let dispatcher = TaskDispatcher::new(
            Arc::new(queue.clone()),
            Arc::new(CoauthorCandidateSource::new(
                shared.clone(),
                config.queue.candidate_scan_limit,
            )),
            config.queue.clone(),
        );

        let orchestrator = Orchestrator::new(
            engine,
            shared.clone(),
            Arc::new(StoreWarehouse::new(shared)),
            dispatcher.clone(),
            OrchestratorSettings {
                scoring: config.scoring.clone(),
                document_ceiling: config.cache.document_ceiling_bytes,
            },
        );

        Self {
            store,
            queue,
            dispatcher,
            orchestrator: Arc::new(orchestrator),
            document_ceiling: config.cache.document_ceiling_bytes,
        }
    }

    /// Queue worker fetching from `source`
    pub fn worker(&self, source: Arc<dyn SourceProvider>) -> QueueWorker {
        QueueWorker::new(
            Arc::new(self.queue.clone()),
            source,
            self.store.clone(),
            self.dispatcher.clone(),
            self.document_ceiling,
        )
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::author_routes())
        .merge(api::refresh_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
