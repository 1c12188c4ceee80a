//! SQLite-backed document store over the `documents` table

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pip_common::models::CacheEntry;
use pip_common::time::{from_micros, to_micros};
use pip_common::Result;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use super::store::{prefix_end, CacheStore};

/// Document store persisted in the service database
#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn entry_from_row(collection: &str, row: &sqlx::sqlite::SqliteRow) -> Result<CacheEntry> {
    let document_id: String = row.get("document_id");
    let payload: String = row.get("payload");
    let timestamp_us: i64 = row.get("timestamp_us");

    Ok(CacheEntry {
        collection: collection.to_string(),
        document_id,
        payload: serde_json::from_str(&payload)?,
        timestamp: from_micros(timestamp_us),
    })
}

#[async_trait]
impl CacheStore for SqliteDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<CacheEntry>> {
        let row = sqlx::query(
            r#"
            SELECT document_id, payload, timestamp_us
            FROM documents
            WHERE collection = ? AND document_id = ?
            "#,
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| entry_from_row(collection, &r)).transpose()
    }

    async fn put(
        &self,
        collection: &str,
        id: &str,
        payload: Value,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let payload = serde_json::to_string(&payload)?;

        sqlx::query(
            r#"
            INSERT INTO documents (collection, document_id, payload, timestamp_us)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(collection, document_id) DO UPDATE SET
                payload = excluded.payload,
                timestamp_us = excluded.timestamp_us
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(payload)
        .bind(to_micros(timestamp))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn contains(&self, collection: &str, id: &str) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM documents WHERE collection = ? AND document_id = ?")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn latest_timestamp_in_range(
        &self,
        collection: &str,
        start: &str,
        end: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let latest: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT MAX(timestamp_us)
            FROM documents
            WHERE collection = ? AND document_id >= ? AND document_id < ?
            "#,
        )
        .bind(collection)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        Ok(latest.map(from_micros))
    }

    async fn entries_by_prefix(&self, collection: &str, prefix: &str) -> Result<Vec<CacheEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT document_id, payload, timestamp_us
            FROM documents
            WHERE collection = ? AND document_id >= ? AND document_id < ?
            ORDER BY document_id
            "#,
        )
        .bind(collection)
        .bind(prefix)
        .bind(prefix_end(prefix))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|r| entry_from_row(collection, r)).collect()
    }

    async fn oldest_ids(&self, collection: &str, limit: usize) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT document_id
            FROM documents
            WHERE collection = ?
            ORDER BY timestamp_us ASC, document_id ASC
            LIMIT ?
            "#,
        )
        .bind(collection)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pip_common::db::init_memory_database;
    use serde_json::json;

    async fn store() -> SqliteDocumentStore {
        SqliteDocumentStore::new(init_memory_database().await.unwrap())
    }

    #[tokio::test]
    async fn test_put_get_roundtrip_overwrites() {
        let store = store().await;
        let t0 = pip_common::time::now();

        store.put("c", "a", json!({"v": 1}), t0).await.unwrap();
        store
            .put("c", "a", json!({"v": 2}), t0 + Duration::seconds(5))
            .await
            .unwrap();

        let entry = store.get("c", "a").await.unwrap().unwrap();
        assert_eq!(entry.payload, json!({"v": 2}));
        assert_eq!(to_micros(entry.timestamp), to_micros(t0 + Duration::seconds(5)));
        assert_eq!(store.oldest_ids("c", 10).await.unwrap(), vec!["a"]);
        assert!(store.contains("c", "a").await.unwrap());
        assert!(!store.contains("other", "a").await.unwrap());
        assert!(store.get("other", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_rejects_blank_ids() {
        let store = store().await;
        assert!(!store.set("c", "", json!({})).await);
        assert!(!store.set("c", "   ", json!({})).await);
        assert!(store.oldest_ids("c", 10).await.unwrap().is_empty());

        assert!(store.set("c", "x", json!({})).await);
        assert_eq!(store.oldest_ids("c", 10).await.unwrap(), vec!["x"]);
    }

    #[tokio::test]
    async fn test_latest_timestamp_in_prefix_range() {
        let store = store().await;
        let t0 = pip_common::time::now();

        store.put("p", "abc:1", json!({}), t0).await.unwrap();
        store.put("p", "abc:2", json!({}), t0 + Duration::seconds(10)).await.unwrap();
        store.put("p", "abd:1", json!({}), t0 + Duration::seconds(99)).await.unwrap();

        let latest = store
            .latest_timestamp_in_range("p", "abc", &prefix_end("abc"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(to_micros(latest), to_micros(t0 + Duration::seconds(10)));

        let none = store
            .latest_timestamp_in_range("p", "zzz", &prefix_end("zzz"))
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_prefix_listing_and_oldest() {
        let store = store().await;
        let t0 = pip_common::time::now();

        store.put("a", "new", json!({}), t0 + Duration::seconds(3)).await.unwrap();
        store.put("a", "old", json!({}), t0).await.unwrap();
        store.put("a", "mid", json!({}), t0 + Duration::seconds(1)).await.unwrap();

        assert_eq!(store.oldest_ids("a", 2).await.unwrap(), vec!["old", "mid"]);
        assert_eq!(store.ids_by_prefix("a", "n").await.unwrap(), vec!["new"]);
        assert!(store.ids_by_prefix("a", "q").await.unwrap().is_empty());
    }
}
