//! Request orchestration
//!
//! Answers "get author stats", "get publication stats", "get temporal stats"
//! and "refresh authors" by composing the cache, staleness resolver,
//! warehouse, scoring engine and dispatcher. Holds no state between requests
//! besides what the document store holds; all collaborators are injected.
//!
//! Author stats:
//!
//! ```text
//! fresh cache ─────────────────────────────────────────────► CacheHit
//! missing / stale ─► warehouse ─► score ─► fit ─► write ───► Recomputed
//!                        └─ no record ─► enqueue author ───► SourceUnavailable (not cached)
//! ```
//!
//! Derived documents are stamped with the time taken just before the
//! warehouse read, so a raw record written while scoring is still newer than
//! the cached result and the next read recomputes. Two concurrent
//! recomputations for the same author both write; the last writer wins.

use pip_common::config::ScoringConfig;
use pip_common::models::{
    AuthorAggregate, PublicationStats, TemporalStats, AUTHOR_STATS_COLLECTION, PUBLICATION_STATS_COLLECTION,
    RAW_AUTHOR_COLLECTION,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::cache::{fit_aggregate, CacheStore, StalenessResolver};
use crate::dispatch::{EnqueueOutcome, TaskDispatcher};
use crate::scoring::{sanitize_publications, ScoringEngine};
use crate::services::Warehouse;

/// Default number of authors picked when a refresh names none
pub const DEFAULT_REFRESH_COUNT: usize = 10;

/// How an author-stats response was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsStatus {
    CacheHit,
    Recomputed,
    /// No source data yet; the aggregate is empty and was not cached
    SourceUnavailable,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorStatsResponse {
    pub status: StatsStatus,
    pub aggregate: AuthorAggregate,
    /// Set when an author fetch was requested while answering
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh: Option<EnqueueOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicationStatsResponse {
    pub status: StatsStatus,
    /// Absent while the source has nothing for the author
    pub stats: Option<PublicationStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh: Option<EnqueueOutcome>,
}

/// Which authors to refresh
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshRequest {
    /// Explicit author ids; when empty the least recently updated authors are used
    #[serde(default)]
    pub author_ids: Vec<String>,
    /// Number of authors to pick when no ids are given
    #[serde(default)]
    pub count: Option<usize>,
    /// Also schedule a sample of coauthors not yet stored
    #[serde(default)]
    pub include_new_coauthors: bool,
}

/// Per-author line of a refresh report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorRefresh {
    pub author_id: String,
    pub name: Option<String>,
    pub publications: usize,
    pub outcome: EnqueueOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefreshReport {
    pub total_authors: usize,
    pub total_publications: usize,
    pub authors: Vec<AuthorRefresh>,
    pub not_scheduled: usize,
}

/// Orchestration settings
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub scoring: ScoringConfig,
    pub document_ceiling: usize,
}

#[derive(Clone)]
pub struct Orchestrator {
    engine: Arc<ScoringEngine>,
    store: Arc<dyn CacheStore>,
    staleness: StalenessResolver,
    warehouse: Arc<dyn Warehouse>,
    dispatcher: TaskDispatcher,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        engine: Arc<ScoringEngine>,
        store: Arc<dyn CacheStore>,
        warehouse: Arc<dyn Warehouse>,
        dispatcher: TaskDispatcher,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            engine,
            staleness: StalenessResolver::new(store.clone()),
            store,
            warehouse,
            dispatcher,
            settings,
        }
    }

    /// Current statistics for one author
    pub async fn get_author_stats(&self, author_id: &str) -> AuthorStatsResponse {
        let author_id = author_id.trim();
        if author_id.is_empty() {
            return AuthorStatsResponse {
                status: StatsStatus::SourceUnavailable,
                aggregate: AuthorAggregate::empty(author_id),
                refresh: None,
            };
        }

        let stale = match self.staleness.author_is_stale(author_id).await {
            Ok(stale) => stale,
            Err(e) => {
                warn!(author_id, error = %e, "Staleness check failed; recomputing");
                true
            }
        };

        if !stale {
            if let Some(aggregate) = self.cached(AUTHOR_STATS_COLLECTION, author_id).await {
                return AuthorStatsResponse {
                    status: StatsStatus::CacheHit,
                    aggregate,
                    refresh: None,
                };
            }
        }

        match self.recompute(author_id).await {
            Some(aggregate) => AuthorStatsResponse {
                status: StatsStatus::Recomputed,
                aggregate,
                refresh: None,
            },
            None => AuthorStatsResponse {
                status: StatsStatus::SourceUnavailable,
                aggregate: AuthorAggregate::empty(author_id),
                refresh: Some(self.request_author_fetch(author_id).await),
            },
        }
    }

    /// Statistics for one of an author's publications
    ///
    /// `None` when the author is known but the publication is not among their
    /// scorable publications.
    pub async fn get_publication_stats(
        &self,
        author_id: &str,
        publication_id: &str,
    ) -> Option<PublicationStatsResponse> {
        let author_id = author_id.trim();
        let publication_id = publication_id.trim();
        if author_id.is_empty() || publication_id.is_empty() {
            return None;
        }

        let stale = match self.staleness.publication_is_stale(author_id, publication_id).await {
            Ok(stale) => stale,
            Err(e) => {
                warn!(author_id, publication_id, error = %e, "Staleness check failed; recomputing");
                true
            }
        };

        if !stale {
            let cached: Option<PublicationStats> = self.cached(PUBLICATION_STATS_COLLECTION, publication_id).await;
            if let Some(stats) = cached.filter(|stats| stats.author_id == author_id) {
                return Some(PublicationStatsResponse {
                    status: StatsStatus::CacheHit,
                    stats: Some(stats),
                    refresh: None,
                });
            }
        }

        let snapshot = pip_common::time::now();
        let aggregate = match self.score_record(author_id).await {
            Some(aggregate) => aggregate,
            None => {
                return Some(PublicationStatsResponse {
                    status: StatsStatus::SourceUnavailable,
                    stats: None,
                    refresh: Some(self.request_author_fetch(author_id).await),
                })
            }
        };

        let author_publications = aggregate.publications.len();
        let scored = aggregate
            .publications
            .into_iter()
            .find(|p| p.publication.publication_id == publication_id)?;
        let stats = PublicationStats {
            author_id: author_id.to_string(),
            scored,
            author_publications,
        };

        match serde_json::to_value(&stats) {
            Ok(payload) => {
                if self
                    .store
                    .set_at(PUBLICATION_STATS_COLLECTION, publication_id, payload, snapshot)
                    .await
                {
                    debug!(author_id, publication_id, rank = stats.scored.rank, "Publication statistics recomputed");
                }
            }
            Err(e) => error!(publication_id, error = %e, "Publication statistics not serializable; not cached"),
        }

        Some(PublicationStatsResponse {
            status: StatsStatus::Recomputed,
            stats: Some(stats),
            refresh: None,
        })
    }

    /// Year-by-year statistics, optionally limited to `[start_year, end_year]`
    ///
    /// `Ok(None)` when the source has nothing for the author yet; an author
    /// fetch is requested in that case.
    pub async fn get_author_temporal_stats(
        &self,
        author_id: &str,
        start_year: Option<i32>,
        end_year: Option<i32>,
    ) -> pip_common::Result<Option<TemporalStats>> {
        let author_id = author_id.trim();
        let record = match self.warehouse.author_record(author_id).await? {
            Some(record) => record,
            None => {
                self.request_author_fetch(author_id).await;
                return Ok(None);
            }
        };

        let current_year = pip_common::time::current_year();
        let publications = sanitize_publications(&record.publications, current_year, &self.settings.scoring);
        Ok(Some(
            self.engine
                .temporal_stats(author_id, &publications, start_year, end_year),
        ))
    }

    async fn request_author_fetch(&self, author_id: &str) -> EnqueueOutcome {
        let outcome = self.dispatcher.enqueue_author_refresh(author_id).await;
        info!(author_id, outcome = ?outcome, "No source data for author yet");
        outcome
    }

    async fn cached<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Option<T> {
        let (payload, _) = self.store.lookup(collection, id).await;
        match serde_json::from_value(payload?) {
            Ok(document) => Some(document),
            Err(e) => {
                warn!(collection, document_id = id, error = %e, "Cached document unreadable; recomputing");
                None
            }
        }
    }

    /// Score the author's current warehouse record; `None` when there is no record
    async fn score_record(&self, author_id: &str) -> Option<AuthorAggregate> {
        let record = match self.warehouse.author_record(author_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                error!(author_id, error = %e, "Warehouse read failed");
                return None;
            }
        };

        let current_year = pip_common::time::current_year();
        let publications = sanitize_publications(&record.publications, current_year, &self.settings.scoring);
        Some(
            self.engine
                .score_author(author_id, record.name, publications, current_year),
        )
    }

    /// Score the warehouse record and write it back; `None` when there is no record
    async fn recompute(&self, author_id: &str) -> Option<AuthorAggregate> {
        let snapshot = pip_common::time::now();
        let mut aggregate = self.score_record(author_id).await?;

        if let Err(e) = fit_aggregate(&mut aggregate, self.settings.document_ceiling) {
            error!(author_id, error = %e, "Aggregate not serializable; not cached");
            return Some(aggregate);
        }

        match serde_json::to_value(&aggregate) {
            Ok(payload) => {
                if self
                    .store
                    .set_at(AUTHOR_STATS_COLLECTION, author_id, payload, snapshot)
                    .await
                {
                    info!(
                        author_id,
                        publications = aggregate.total_publications,
                        pip_auc = aggregate.pip_auc,
                        "Author statistics recomputed"
                    );
                }
            }
            Err(e) => error!(author_id, error = %e, "Aggregate not serializable; not cached"),
        }
        Some(aggregate)
    }

    /// Schedule author fetches and report what was scheduled
    ///
    /// Returns as soon as tasks are enqueued; results are observed on a later read.
    pub async fn refresh(&self, request: &RefreshRequest) -> RefreshReport {
        let mut seen = HashSet::new();
        let mut candidates: Vec<String> = request
            .author_ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty() && seen.insert(id.clone()))
            .collect();

        let count = request.count.unwrap_or(DEFAULT_REFRESH_COUNT);
        if candidates.is_empty() {
            match self.store.oldest_ids(RAW_AUTHOR_COLLECTION, count).await {
                Ok(ids) => candidates.extend(ids.into_iter().filter(|id| seen.insert(id.clone()))),
                Err(e) => error!(error = %e, "Could not list refresh candidates"),
            }
        }

        if request.include_new_coauthors {
            let wanted = if request.author_ids.is_empty() {
                count
            } else {
                request.count.unwrap_or(candidates.len().max(1))
            };
            match self.dispatcher.sample_coauthor_candidates(wanted).await {
                Ok(ids) => candidates.extend(ids.into_iter().filter(|id| seen.insert(id.clone()))),
                Err(e) => error!(error = %e, "Could not sample coauthor candidates"),
            }
        }

        let mut report = RefreshReport::default();
        for author_id in candidates {
            let outcome = self.dispatcher.enqueue_author_refresh(&author_id).await;
            let (name, publications) = match self.warehouse.author_record(&author_id).await {
                Ok(Some(record)) => (record.name, record.publications.len()),
                _ => (None, 0),
            };

            if !outcome.is_pending() {
                report.not_scheduled += 1;
            }
            report.total_publications += publications;
            report.authors.push(AuthorRefresh {
                author_id,
                name,
                publications,
                outcome,
            });
        }
        report.total_authors = report.authors.len();

        info!(
            total_authors = report.total_authors,
            total_publications = report.total_publications,
            not_scheduled = report.not_scheduled,
            "Refresh requested"
        );
        report
    }
}
