//! Database initialization tests

use pip_common::db::{init_database, init_memory_database};
use tempfile::TempDir;

async fn table_exists(pool: &sqlx::SqlitePool, name: &str) -> bool {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_optional(pool)
            .await
            .unwrap();
    row.is_some()
}

#[tokio::test]
async fn test_init_creates_database_file_and_tables() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("pip.db");

    let pool = init_database(&db_path).await.unwrap();

    assert!(db_path.exists());
    assert!(table_exists(&pool, "documents").await);
    assert!(table_exists(&pool, "tasks").await);
}

#[tokio::test]
async fn test_init_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("pip.db");

    let pool = init_database(&db_path).await.unwrap();
    sqlx::query(
        "INSERT INTO documents (collection, document_id, payload, timestamp_us) VALUES ('c', 'd', '{}', 1)",
    )
    .execute(&pool)
    .await
    .unwrap();
    pool.close().await;

    // Reopening must keep existing rows
    let pool = init_database(&db_path).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_memory_database_has_schema() {
    let pool = init_memory_database().await.unwrap();
    assert!(table_exists(&pool, "documents").await);
    assert!(table_exists(&pool, "tasks").await);
}
