//! Document repository: CRUD over `document`, `page` and `textblock`.
//!
//! Every write here commits on its own (the pool runs in autocommit mode)
//! except [`delete_document`], which removes a document's whole ownership
//! chain and its artifact directory inside one transaction.

use std::path::{Path, PathBuf};

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::config::StorageConfig;
use crate::error::{IndexingError, Result};
use crate::models::{DocumentRow, PageRow, Rect, TextBlockRow};

fn document_from_row(row: &SqliteRow) -> DocumentRow {
    DocumentRow {
        id: row.get("id"),
        file_ref: row.get("file_ref"),
        start_index: row.get("start_index"),
        end_index: row.get("end_index"),
    }
}

fn page_from_row(row: &SqliteRow) -> PageRow {
    PageRow {
        id: row.get("id"),
        document_id: row.get("document_id"),
        number: row.get("number"),
        width: row.get("width"),
        height: row.get("height"),
    }
}

fn block_from_row(row: &SqliteRow) -> TextBlockRow {
    TextBlockRow {
        id: row.get("id"),
        page_id: row.get("page_id"),
        number: row.get("number"),
        bbox: Rect {
            left: row.get("bbox0"),
            top: row.get("bbox1"),
            right: row.get("bbox2"),
            bottom: row.get("bbox3"),
        },
        text: row.get("text"),
        size: row.get("size"),
    }
}

/// Insert a document in the in-progress state (`start_index == end_index`).
pub async fn create_document(pool: &SqlitePool, file_ref: &str, now_ms: i64) -> Result<DocumentRow> {
    let result = sqlx::query("INSERT INTO document (file_ref, start_index, end_index) VALUES (?, ?, ?)")
        .bind(file_ref)
        .bind(now_ms)
        .bind(now_ms)
        .execute(pool)
        .await?;

    Ok(DocumentRow {
        id: result.last_insert_rowid(),
        file_ref: file_ref.to_string(),
        start_index: now_ms,
        end_index: now_ms,
    })
}

/// Stamp the end of indexing. The stored value is kept strictly after
/// `start_index` so a finished document never reads as in progress.
pub async fn finish_document(pool: &SqlitePool, document: &DocumentRow, now_ms: i64) -> Result<i64> {
    let end = now_ms.max(document.start_index + 1);
    let result = sqlx::query("UPDATE document SET end_index = ? WHERE id = ?")
        .bind(end)
        .bind(document.id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(IndexingError::NotFound(document.file_ref.clone()));
    }
    Ok(end)
}

pub async fn find_by_file(pool: &SqlitePool, file_ref: &str) -> Result<Option<DocumentRow>> {
    let row = sqlx::query("SELECT id, file_ref, start_index, end_index FROM document WHERE file_ref = ?")
        .bind(file_ref)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(document_from_row))
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<DocumentRow>> {
    let row = sqlx::query("SELECT id, file_ref, start_index, end_index FROM document WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(document_from_row))
}

pub async fn list_documents(pool: &SqlitePool) -> Result<Vec<DocumentRow>> {
    let rows = sqlx::query("SELECT id, file_ref, start_index, end_index FROM document ORDER BY id ASC")
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(document_from_row).collect())
}

pub async fn create_page(
    pool: &SqlitePool,
    document_id: i64,
    number: i64,
    width: f64,
    height: f64,
) -> Result<PageRow> {
    let result = sqlx::query("INSERT INTO page (document_id, number, width, height) VALUES (?, ?, ?, ?)")
        .bind(document_id)
        .bind(number)
        .bind(width)
        .bind(height)
        .execute(pool)
        .await?;

    Ok(PageRow {
        id: result.last_insert_rowid(),
        document_id,
        number,
        width,
        height,
    })
}

pub async fn pages(pool: &SqlitePool, document_id: i64) -> Result<Vec<PageRow>> {
    let rows = sqlx::query(
        "SELECT id, document_id, number, width, height FROM page WHERE document_id = ? ORDER BY number ASC",
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(page_from_row).collect())
}

pub async fn create_block(
    pool: &SqlitePool,
    page_id: i64,
    number: i64,
    bbox: &Rect,
    text: &str,
    size: f64,
) -> Result<TextBlockRow> {
    let [b0, b1, b2, b3] = bbox.to_array();
    let result = sqlx::query(
        "INSERT INTO textblock (page_id, number, bbox0, bbox1, bbox2, bbox3, text, size) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(page_id)
    .bind(number)
    .bind(b0)
    .bind(b1)
    .bind(b2)
    .bind(b3)
    .bind(text)
    .bind(size)
    .execute(pool)
    .await?;

    Ok(TextBlockRow {
        id: result.last_insert_rowid(),
        page_id,
        number,
        bbox: *bbox,
        text: text.to_string(),
        size,
    })
}

pub async fn blocks(pool: &SqlitePool, page_id: i64) -> Result<Vec<TextBlockRow>> {
    let rows = sqlx::query(
        "SELECT id, page_id, number, bbox0, bbox1, bbox2, bbox3, text, size \
         FROM textblock WHERE page_id = ? ORDER BY number ASC",
    )
    .bind(page_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(block_from_row).collect())
}

pub async fn count_blocks(pool: &SqlitePool, document_id: i64) -> Result<i64> {
    let n = sqlx::query_scalar(
        "SELECT COUNT(*) FROM textblock t JOIN page p ON t.page_id = p.id WHERE p.document_id = ?",
    )
    .bind(document_id)
    .fetch_one(pool)
    .await?;
    Ok(n)
}

/// Rows removed by [`delete_document`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteReport {
    pub file_ref: String,
    pub pages: u64,
    pub blocks: u64,
    pub artifacts_removed: bool,
}

/// `<dir>.deleting`, the name an artifact directory holds while its rows
/// are being deleted.
pub fn tombstone_path(dir: &Path) -> PathBuf {
    let mut name = dir.as_os_str().to_os_string();
    name.push(".deleting");
    PathBuf::from(name)
}

/// Delete a document with its pages, blocks and artifact directory.
///
/// Leaves are removed before parents. Before the commit the artifact
/// directory is renamed to a tombstone next to it; a failed commit renames it
/// back so rows and files stay together. The tombstone is removed only once
/// the commit has succeeded. A directory that is already gone is not an error.
pub async fn delete_document(pool: &SqlitePool, storage: &StorageConfig, id: i64) -> Result<DeleteReport> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query("SELECT id, file_ref, start_index, end_index FROM document WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
    let document = match row {
        Some(row) => document_from_row(&row),
        None => return Err(IndexingError::NotFound(format!("document id {}", id))),
    };
    let dir = storage.artifact_dir(&document.file_ref)?;
    let tombstone = tombstone_path(&dir);

    let blocks = sqlx::query("DELETE FROM textblock WHERE page_id IN (SELECT id FROM page WHERE document_id = ?)")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let pages = sqlx::query("DELETE FROM page WHERE document_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    sqlx::query("DELETE FROM document WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    // Left over from an interrupted delete.
    match tokio::fs::remove_dir_all(&tombstone).await {
        Ok(()) => log::warn!("removed stale tombstone {}", tombstone.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    let moved = match tokio::fs::rename(&dir, &tombstone).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::warn!("artifact directory {} already absent", dir.display());
            false
        }
        Err(e) => return Err(e.into()),
    };

    if let Err(e) = tx.commit().await {
        if moved {
            if let Err(restore) = tokio::fs::rename(&tombstone, &dir).await {
                log::error!(
                    "could not restore {} from {}: {}",
                    dir.display(),
                    tombstone.display(),
                    restore
                );
            }
        }
        return Err(e.into());
    }

    let artifacts_removed = moved
        && match tokio::fs::remove_dir_all(&tombstone).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("could not remove {}: {}", tombstone.display(), e);
                false
            }
        };

    Ok(DeleteReport {
        file_ref: document.file_ref,
        pages,
        blocks,
        artifacts_removed,
    })
}
