//! Local queue worker
//!
//! Drains pending refresh tasks: author tasks fetch and store the raw author
//! record and fan out one publication task per listed publication;
//! publication tasks fetch and store the filled publication record.
//!
//! A failed fetch marks the task failed. Nothing is retried inline; the next
//! stale read or refresh request schedules the work again.
//!
//! A queue error ends the current pass, not the worker: `run` waits one poll
//! interval, returns tasks the failed pass left running to pending, and
//! carries on. One worker per database is assumed.

use anyhow::{anyhow, Context};
use pip_common::models::{RefreshTask, RAW_AUTHOR_COLLECTION, RAW_PUBLICATION_COLLECTION};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::cache::{fit_raw_author, CacheStore};
use crate::dispatch::TaskDispatcher;
use crate::services::{SourceProvider, WorkQueue};

/// Totals for one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct QueueWorker {
    queue: Arc<dyn WorkQueue>,
    source: Arc<dyn SourceProvider>,
    store: Arc<dyn CacheStore>,
    dispatcher: TaskDispatcher,
    document_ceiling: usize,
}

impl QueueWorker {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        source: Arc<dyn SourceProvider>,
        store: Arc<dyn CacheStore>,
        dispatcher: TaskDispatcher,
        document_ceiling: usize,
    ) -> Self {
        Self {
            queue,
            source,
            store,
            dispatcher,
            document_ceiling,
        }
    }

    /// Process one pending task; `None` when the queue is empty
    pub async fn run_once(&self) -> anyhow::Result<Option<bool>> {
        let task = match self.queue.claim_next().await? {
            Some(task) => task,
            None => return Ok(None),
        };

        match self.process(&task).await {
            Ok(()) => {
                self.queue.complete(&task.name).await?;
                Ok(Some(true))
            }
            Err(e) => {
                warn!(task = %task.name, error = %e, "Refresh task failed");
                self.queue.fail(&task.name, &e.to_string()).await?;
                Ok(Some(false))
            }
        }
    }

    /// Process tasks until the queue is empty or `limit` tasks have run
    pub async fn drain(&self, limit: Option<usize>) -> anyhow::Result<WorkerSummary> {
        let mut summary = WorkerSummary::default();
        while limit.map_or(true, |l| summary.processed < l) {
            match self.run_once().await? {
                Some(true) => summary.succeeded += 1,
                Some(false) => summary.failed += 1,
                None => break,
            }
            summary.processed += 1;
        }
        if summary.processed > 0 {
            info!(
                processed = summary.processed,
                succeeded = summary.succeeded,
                failed = summary.failed,
                "Queue drained"
            );
        }
        Ok(summary)
    }

    /// Poll the queue until `shutdown` flips to true
    pub async fn run(&self, poll_interval: Duration, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        // Tasks left running by a previous worker are picked up first
        let mut needs_recovery = true;

        loop {
            if *shutdown.borrow() {
                break;
            }

            if needs_recovery {
                match self.queue.requeue_running().await {
                    Ok(recovered) => {
                        needs_recovery = false;
                        if recovered > 0 {
                            info!(recovered, "Re-queued tasks left running");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Could not re-queue running tasks");
                        idle(poll_interval, &mut shutdown).await;
                        continue;
                    }
                }
            }

            match self.drain(None).await {
                Ok(summary) if summary.processed > 0 => {}
                Ok(_) => idle(poll_interval, &mut shutdown).await,
                Err(e) => {
                    error!(error = %e, "Queue pass failed; retrying after {:?}", poll_interval);
                    needs_recovery = true;
                    idle(poll_interval, &mut shutdown).await;
                }
            }
        }
        info!("Queue worker stopped");
        Ok(())
    }

    async fn process(&self, task: &RefreshTask) -> anyhow::Result<()> {
        let config = self.dispatcher.config();
        if task.queue == config.authors_queue {
            let author_id = TaskDispatcher::author_id_from_payload(&task.payload)
                .ok_or_else(|| anyhow!("Author task without scholar_id"))?;
            self.refresh_author(&task.target_url, author_id).await
        } else if task.queue == config.publications_queue {
            let publication_id = task
                .payload
                .get("author_pub_id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow!("Publication task without author_pub_id"))?;
            self.refresh_publication(&task.target_url, publication_id).await
        } else {
            Err(anyhow!("Unknown queue: {}", task.queue))
        }
    }

    async fn refresh_author(&self, target_url: &str, author_id: &str) -> anyhow::Result<()> {
        let mut author = self
            .source
            .fetch_author(target_url, author_id)
            .await
            .with_context(|| format!("Fetch author {}", author_id))?;

        if author.scholar_id.trim().is_empty() {
            author.scholar_id = author_id.to_string();
        }
        fit_raw_author(&mut author, self.document_ceiling)?;

        let payload = serde_json::to_value(&author)?;
        if !self.store.set(RAW_AUTHOR_COLLECTION, author_id, payload).await {
            return Err(anyhow!("Raw author {} not stored", author_id));
        }

        let mut pending = 0usize;
        for stub in &author.publications {
            if self.dispatcher.enqueue_publication_refresh(stub).await.is_pending() {
                pending += 1;
            }
        }
        debug!(
            author_id,
            publications = author.publications.len(),
            pending,
            "Stored raw author"
        );
        Ok(())
    }

    async fn refresh_publication(&self, target_url: &str, publication_id: &str) -> anyhow::Result<()> {
        let mut publication = self
            .source
            .fetch_publication(target_url, publication_id)
            .await
            .with_context(|| format!("Fetch publication {}", publication_id))?;

        if publication.author_pub_id.trim().is_empty() {
            publication.author_pub_id = publication_id.to_string();
        }

        let payload = serde_json::to_value(&publication)?;
        if !self.store.set(RAW_PUBLICATION_COLLECTION, publication_id, payload).await {
            return Err(anyhow!("Raw publication {} not stored", publication_id));
        }
        debug!(publication_id, "Stored raw publication");
        Ok(())
    }
}

/// Wait one poll interval or until shutdown is signalled
async fn idle(poll_interval: Duration, shutdown: &mut watch::Receiver<bool>) {
    tokio::select! {
        _ = tokio::time::sleep(poll_interval) => {}
        changed = shutdown.changed() => {
            // Sender gone: nothing can signal shutdown, keep the poll pace
            if changed.is_err() {
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}
