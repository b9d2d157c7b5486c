use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::index_sync::{self, IndexBinding};

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the document/page/textblock schema and bind the full-text index.
/// Safe to call on every start.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // AUTOINCREMENT keeps row ids from being reused after a delete, so an
    // index entry can never be mistaken for a later row.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_ref TEXT NOT NULL UNIQUE,
            start_index INTEGER NOT NULL,
            end_index INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS page (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id INTEGER NOT NULL,
            number INTEGER NOT NULL,
            width REAL NOT NULL,
            height REAL NOT NULL,
            UNIQUE(document_id, number),
            FOREIGN KEY (document_id) REFERENCES document(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS textblock (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            page_id INTEGER NOT NULL,
            number INTEGER NOT NULL,
            bbox0 REAL NOT NULL,
            bbox1 REAL NOT NULL,
            bbox2 REAL NOT NULL,
            bbox3 REAL NOT NULL,
            text TEXT NOT NULL,
            size REAL NOT NULL,
            UNIQUE(page_id, number),
            FOREIGN KEY (page_id) REFERENCES page(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_page_document_id ON page(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_textblock_page_id ON textblock(page_id)")
        .execute(pool)
        .await?;

    index_sync::bind(pool, &IndexBinding::textblock()).await?;

    Ok(())
}
