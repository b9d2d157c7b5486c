//! Document listing and inspection.
//!
//! Backs the `sift list` and `sift get` commands.

use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::ingest::format_duration;
use crate::models::{DocumentRow, PageRow, TextBlockRow};
use crate::repository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    Indexing,
    Indexed,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: i64,
    pub file_ref: String,
    pub start_index: String, // ISO8601
    pub end_index: String,   // ISO8601
    pub status: Status,
    /// `None` while indexing.
    pub duration_ms: Option<i64>,
}

impl From<&DocumentRow> for DocumentSummary {
    fn from(doc: &DocumentRow) -> Self {
        let indexing = doc.is_indexing();
        DocumentSummary {
            id: doc.id,
            file_ref: doc.file_ref.clone(),
            start_index: format_ts_iso(doc.start_index),
            end_index: format_ts_iso(doc.end_index),
            status: if indexing {
                Status::Indexing
            } else {
                Status::Indexed
            },
            duration_ms: (!indexing).then(|| doc.duration_ms()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageDetail {
    pub page: PageRow,
    pub blocks: Vec<TextBlockRow>,
}

#[derive(Debug, Clone)]
pub struct DocumentDetail {
    pub summary: DocumentSummary,
    pub pages: Vec<PageDetail>,
}

pub async fn list_documents(pool: &SqlitePool) -> Result<Vec<DocumentSummary>> {
    let docs = repository::list_documents(pool).await?;
    Ok(docs.iter().map(DocumentSummary::from).collect())
}

pub async fn get_document(pool: &SqlitePool, id: i64) -> Result<DocumentDetail> {
    let doc = match repository::find_by_id(pool, id).await? {
        Some(doc) => doc,
        None => bail!("document not found: {}", id),
    };

    let mut pages = Vec::new();
    for page in repository::pages(pool, doc.id).await? {
        let blocks = repository::blocks(pool, page.id).await?;
        pages.push(PageDetail { page, blocks });
    }

    Ok(DocumentDetail {
        summary: DocumentSummary::from(&doc),
        pages,
    })
}

/// CLI entry point for `sift list`.
pub async fn run_list(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let docs = list_documents(&pool).await;
    pool.close().await;
    let docs = docs?;

    if docs.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    println!("{:<6} {:<10} {:<12} FILE", "ID", "STATUS", "DURATION");
    for doc in &docs {
        let status = match doc.status {
            Status::Indexing => "indexing",
            Status::Indexed => "indexed",
        };
        let duration = doc
            .duration_ms
            .map(format_duration)
            .unwrap_or_else(|| "-".to_string());
        println!("{:<6} {:<10} {:<12} {}", doc.id, status, duration, doc.file_ref);
    }
    Ok(())
}

/// CLI entry point for `sift get`.
pub async fn run_get(config: &Config, id: i64) -> Result<()> {
    let pool = db::connect(config).await?;
    let detail = get_document(&pool, id).await;
    pool.close().await;

    let detail = match detail {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let doc = &detail.summary;

    println!("--- Document ---");
    println!("id:          {}", doc.id);
    println!("file:        {}", doc.file_ref);
    println!("start_index: {}", doc.start_index);
    println!("end_index:   {}", doc.end_index);
    match doc.duration_ms {
        Some(ms) => println!("status:      indexed in {}", format_duration(ms)),
        None => println!("status:      indexing"),
    }
    println!();

    for p in &detail.pages {
        println!(
            "--- Page {} ({:.0} x {:.0}, {} blocks) ---",
            p.page.number + 1,
            p.page.width,
            p.page.height,
            p.blocks.len()
        );
        for b in &p.blocks {
            println!(
                "[block {}] size {:.1} bbox ({:.1}, {:.1}, {:.1}, {:.1})",
                b.number, b.size, b.bbox.left, b.bbox.top, b.bbox.right, b.bbox.bottom
            );
            println!("{}", b.text);
            println!();
        }
    }

    Ok(())
}

fn format_ts_iso(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}
