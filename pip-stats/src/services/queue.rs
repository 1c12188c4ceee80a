//! Push queue transport
//!
//! Task identity is the task name. Creating a task whose name is already
//! live reports [`QueueError::AlreadyExists`]; finished or failed tasks may
//! be re-armed under the same name.

use async_trait::async_trait;
use pip_common::models::RefreshTask;
use pip_common::time::{now, to_micros};
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::debug;

/// Push queue errors
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Task already exists: {0}")]
    AlreadyExists(String),

    #[error("Queue backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for QueueError {
    fn from(e: sqlx::Error) -> Self {
        QueueError::Backend(e.to_string())
    }
}

/// Task creation contract of the push queue
#[async_trait]
pub trait PushQueue: Send + Sync {
    async fn create_task(&self, task: &RefreshTask) -> Result<(), QueueError>;
}

/// Consumer side of the local task queue
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Take the oldest pending task and mark it running
    async fn claim_next(&self) -> Result<Option<RefreshTask>, QueueError>;

    async fn complete(&self, name: &str) -> Result<(), QueueError>;

    async fn fail(&self, name: &str, error: &str) -> Result<(), QueueError>;

    /// Return tasks left running by an interrupted pass to pending
    async fn requeue_running(&self) -> Result<u64, QueueError>;
}

/// Lifecycle state of a local task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Done,
    Failed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Done => "done",
            TaskState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskState::Pending),
            "running" => Some(TaskState::Running),
            "done" => Some(TaskState::Done),
            "failed" => Some(TaskState::Failed),
            _ => None,
        }
    }
}

/// Task queue persisted in the service database
#[derive(Clone)]
pub struct SqliteTaskQueue {
    pool: SqlitePool,
}

impl SqliteTaskQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn finish(&self, name: &str, state: TaskState, error: Option<&str>) -> Result<(), QueueError> {
        sqlx::query("UPDATE tasks SET state = ?, last_error = ?, updated_at_us = ? WHERE name = ?")
            .bind(state.as_str())
            .bind(error)
            .bind(to_micros(now()))
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// State of a task by name
    pub async fn state(&self, name: &str) -> Result<Option<TaskState>, QueueError> {
        let state: Option<String> = sqlx::query_scalar("SELECT state FROM tasks WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(state.as_deref().and_then(TaskState::parse))
    }

    /// Number of tasks in a state
    pub async fn count(&self, state: TaskState) -> Result<i64, QueueError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE state = ?")
            .bind(state.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl WorkQueue for SqliteTaskQueue {
    async fn claim_next(&self) -> Result<Option<RefreshTask>, QueueError> {
        let row = sqlx::query(
            r#"
            UPDATE tasks
            SET state = 'running', attempts = attempts + 1, updated_at_us = ?
            WHERE name = (
                SELECT name FROM tasks
                WHERE state = 'pending'
                ORDER BY created_at_us ASC, name ASC
                LIMIT 1
            )
            RETURNING name, queue, target_url, payload
            "#,
        )
        .bind(to_micros(now()))
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            let payload: String = r.get("payload");
            Ok(RefreshTask {
                name: r.get("name"),
                queue: r.get("queue"),
                target_url: r.get("target_url"),
                payload: serde_json::from_str(&payload)
                    .map_err(|e| QueueError::Backend(format!("Corrupt task payload: {}", e)))?,
            })
        })
        .transpose()
    }

    async fn complete(&self, name: &str) -> Result<(), QueueError> {
        self.finish(name, TaskState::Done, None).await
    }

    async fn fail(&self, name: &str, error: &str) -> Result<(), QueueError> {
        self.finish(name, TaskState::Failed, Some(error)).await
    }

    async fn requeue_running(&self) -> Result<u64, QueueError> {
        let result = sqlx::query("UPDATE tasks SET state = 'pending', updated_at_us = ? WHERE state = 'running'")
            .bind(to_micros(now()))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PushQueue for SqliteTaskQueue {
    async fn create_task(&self, task: &RefreshTask) -> Result<(), QueueError> {
        let payload = serde_json::to_string(&task.payload)
            .map_err(|e| QueueError::Backend(format!("Serialize task payload failed: {}", e)))?;
        let now_us = to_micros(now());

        // A live (pending or running) task with the same name blocks the insert
        let result = sqlx::query(
            r#"
            INSERT INTO tasks (name, queue, target_url, payload, state, attempts, created_at_us, updated_at_us)
            VALUES (?, ?, ?, ?, 'pending', 0, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                queue = excluded.queue,
                target_url = excluded.target_url,
                payload = excluded.payload,
                state = 'pending',
                attempts = 0,
                last_error = NULL,
                created_at_us = excluded.created_at_us,
                updated_at_us = excluded.updated_at_us
            WHERE tasks.state IN ('done', 'failed')
            "#,
        )
        .bind(&task.name)
        .bind(&task.queue)
        .bind(&task.target_url)
        .bind(payload)
        .bind(now_us)
        .bind(now_us)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::AlreadyExists(task.name.clone()));
        }

        debug!(task = %task.name, queue = %task.queue, "Task created");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pip_common::db::init_memory_database;
    use serde_json::json;

    fn task(name: &str) -> RefreshTask {
        RefreshTask {
            queue: "process-authors".to_string(),
            name: name.to_string(),
            target_url: "https://r0.example.test/search_author_id".to_string(),
            payload: json!({ "scholar_id": name }),
        }
    }

    async fn queue() -> SqliteTaskQueue {
        SqliteTaskQueue::new(init_memory_database().await.unwrap())
    }

    #[tokio::test]
    async fn test_duplicate_live_task_rejected() {
        let queue = queue().await;
        queue.create_task(&task("a")).await.unwrap();

        let err = queue.create_task(&task("a")).await.unwrap_err();
        assert!(matches!(err, QueueError::AlreadyExists(name) if name == "a"));
        assert_eq!(queue.count(TaskState::Pending).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_claim_complete_and_rearm() {
        let queue = queue().await;
        queue.create_task(&task("a")).await.unwrap();

        let claimed = queue.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.name, "a");
        assert_eq!(claimed.payload["scholar_id"], "a");
        assert_eq!(queue.state("a").await.unwrap(), Some(TaskState::Running));

        // Still live while running
        assert!(queue.create_task(&task("a")).await.is_err());
        assert!(queue.claim_next().await.unwrap().is_none());

        queue.complete("a").await.unwrap();
        assert_eq!(queue.state("a").await.unwrap(), Some(TaskState::Done));

        // A finished task can be scheduled again
        queue.create_task(&task("a")).await.unwrap();
        assert_eq!(queue.state("a").await.unwrap(), Some(TaskState::Pending));
    }

    #[tokio::test]
    async fn test_fail_and_requeue_running() {
        let queue = queue().await;
        queue.create_task(&task("a")).await.unwrap();
        queue.create_task(&task("b")).await.unwrap();

        let first = queue.claim_next().await.unwrap().unwrap();
        queue.fail(&first.name, "not found").await.unwrap();
        assert_eq!(queue.state(&first.name).await.unwrap(), Some(TaskState::Failed));

        let second = queue.claim_next().await.unwrap().unwrap();
        assert_ne!(first.name, second.name);
        assert_eq!(queue.requeue_running().await.unwrap(), 1);
        assert_eq!(queue.count(TaskState::Pending).await.unwrap(), 1);
    }
}
