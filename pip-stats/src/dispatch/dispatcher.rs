//! Idempotent refresh task dispatch
//!
//! Every task name is a pure function of queue and entity id, so repeated
//! submissions for the same entity collapse onto one live task. The queue
//! reporting that the task already exists is a success.

use pip_common::config::QueueConfig;
use pip_common::models::{PublicationStub, RefreshTask};
use pip_common::Result;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::region::{region_endpoint, select_region};
use crate::services::{CandidateSource, PushQueue, QueueError};

/// Result of one enqueue attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnqueueOutcome {
    /// A new task was created
    Scheduled,
    /// A live task with the same name already exists
    AlreadyQueued,
    /// Nothing was scheduled; the refresh will not happen on its own
    NotScheduled,
}

impl EnqueueOutcome {
    /// Whether a refresh is pending after this attempt
    pub fn is_pending(&self) -> bool {
        matches!(self, EnqueueOutcome::Scheduled | EnqueueOutcome::AlreadyQueued)
    }
}

/// Queue-safe form of an entity id (`:` → `__`, `/` → `___`)
pub fn sanitize_task_id(entity_id: &str) -> String {
    entity_id.replace('/', "___").replace(':', "__")
}

/// Deterministic task name for an entity on a queue
pub fn task_name(queue: &str, entity_id: &str) -> String {
    format!("{}/tasks/{}", queue, sanitize_task_id(entity_id))
}

/// Order-preserving dedup, then a uniform sample of `count` without replacement
///
/// Returns the whole deduplicated pool when it holds `count` ids or fewer.
pub fn sample_from_pool<R: Rng + ?Sized>(pool: Vec<String>, count: usize, rng: &mut R) -> Vec<String> {
    let mut seen = HashSet::new();
    let unique: Vec<String> = pool.into_iter().filter(|id| seen.insert(id.clone())).collect();

    if unique.len() <= count {
        return unique;
    }
    unique.choose_multiple(rng, count).cloned().collect()
}

/// Enqueues author and publication refresh work
#[derive(Clone)]
pub struct TaskDispatcher {
    queue: Arc<dyn PushQueue>,
    candidates: Arc<dyn CandidateSource>,
    config: QueueConfig,
}

impl TaskDispatcher {
    pub fn new(queue: Arc<dyn PushQueue>, candidates: Arc<dyn CandidateSource>, config: QueueConfig) -> Self {
        Self {
            queue,
            candidates,
            config,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn target_url(&self, template: &str) -> String {
        let region = select_region(pip_common::time::now(), self.config.region_epoch, &self.config.regions);
        region_endpoint(template, region)
    }

    /// Schedule a fetch of one author's raw record
    pub async fn enqueue_author_refresh(&self, author_id: &str) -> EnqueueOutcome {
        let task = RefreshTask {
            queue: self.config.authors_queue.clone(),
            name: task_name(&self.config.authors_queue, author_id),
            target_url: self.target_url(&self.config.author_endpoint),
            payload: json!({ "scholar_id": author_id }),
        };
        self.submit(author_id, task).await
    }

    /// Schedule a fetch of one publication's filled record
    pub async fn enqueue_publication_refresh(&self, publication: &PublicationStub) -> EnqueueOutcome {
        let payload = match serde_json::to_value(publication) {
            Ok(payload) => payload,
            Err(e) => {
                error!(publication_id = %publication.author_pub_id, error = %e, "Task payload not serializable");
                return EnqueueOutcome::NotScheduled;
            }
        };
        let task = RefreshTask {
            queue: self.config.publications_queue.clone(),
            name: task_name(&self.config.publications_queue, &publication.author_pub_id),
            target_url: self.target_url(&self.config.publication_endpoint),
            payload,
        };
        self.submit(&publication.author_pub_id, task).await
    }

    async fn submit(&self, entity_id: &str, task: RefreshTask) -> EnqueueOutcome {
        if entity_id.trim().is_empty() {
            error!(queue = %task.queue, "Refusing to enqueue task for blank id");
            return EnqueueOutcome::NotScheduled;
        }

        match self.queue.create_task(&task).await {
            Ok(()) => {
                info!(task = %task.name, target = %task.target_url, "Refresh task scheduled");
                EnqueueOutcome::Scheduled
            }
            Err(QueueError::AlreadyExists(_)) => {
                debug!(task = %task.name, "Refresh task already queued");
                EnqueueOutcome::AlreadyQueued
            }
            Err(e) => {
                error!(task = %task.name, error = %e, "Failed to enqueue refresh task");
                EnqueueOutcome::NotScheduled
            }
        }
    }

    /// Uniform sample of `count` new coauthor ids
    ///
    /// Over-fetches `count × oversample_factor` ids so the sample is not skewed
    /// toward the head of the candidate pool.
    pub async fn sample_coauthor_candidates(&self, count: usize) -> Result<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let fetch = count.saturating_mul(self.config.oversample_factor.max(1));
        let pool = self.candidates.candidate_ids(fetch).await?;
        let pool_size = pool.len();

        let sample = {
            let mut rng = rand::thread_rng();
            sample_from_pool(pool, count, &mut rng)
        };

        debug!(requested = count, pool_size, sampled = sample.len(), "Sampled coauthor candidates");
        Ok(sample)
    }

    /// Payload of an author task, if it names an author
    pub fn author_id_from_payload(payload: &Value) -> Option<&str> {
        payload.get("scholar_id").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_task_name_is_deterministic_and_sanitized() {
        assert_eq!(task_name("process-pubs", "abc:x/y"), "process-pubs/tasks/abc__x___y");
        assert_eq!(task_name("process-authors", "abc"), task_name("process-authors", "abc"));
        assert_ne!(task_name("process-authors", "abc"), task_name("process-pubs", "abc"));
    }

    #[test]
    fn test_sample_returns_whole_small_pool() {
        let mut rng = StdRng::seed_from_u64(7);
        let pool = vec!["a".to_string(), "b".to_string(), "a".to_string(), "c".to_string()];
        let sample = sample_from_pool(pool, 5, &mut rng);
        assert_eq!(sample, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_sample_is_exact_size_without_replacement() {
        let mut rng = StdRng::seed_from_u64(42);
        let pool: Vec<String> = (0..500).map(|i| format!("id{}", i % 250)).collect();
        let sample = sample_from_pool(pool, 10, &mut rng);

        assert_eq!(sample.len(), 10);
        let unique: HashSet<&String> = sample.iter().collect();
        assert_eq!(unique.len(), 10);
    }

    #[test]
    fn test_outcome_pending() {
        assert!(EnqueueOutcome::Scheduled.is_pending());
        assert!(EnqueueOutcome::AlreadyQueued.is_pending());
        assert!(!EnqueueOutcome::NotScheduled.is_pending());
    }
}
