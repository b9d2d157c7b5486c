//! Full-text search over indexed text blocks.

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::highlight::{highlight, SearchContext};

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub document_id: i64,
    pub file_ref: String,
    /// 0-based.
    pub page_number: i64,
    pub block_number: i64,
    pub rank: f64,
    pub text: String,
    pub highlighted: String,
}

impl SearchHit {
    /// Link to the hit's page for a PDF viewer, carrying the query terms,
    /// e.g. `report.pdf#page=3&search="invoice+total"`.
    pub fn page_anchor(&self, ctx: &SearchContext) -> String {
        let mut anchor = format!("{}#page={}", self.file_ref, self.page_number + 1);
        if !ctx.is_empty() {
            anchor.push_str(&format!("&search=\"{}\"", ctx.terms.join("+")));
        }
        anchor
    }
}

/// Run an FTS5 `MATCH` query against `textblock_fts`, best match first.
pub async fn search_blocks(
    pool: &SqlitePool,
    query: &str,
    limit: i64,
    ctx: &SearchContext,
    threshold: f64,
) -> Result<Vec<SearchHit>> {
    let rows = sqlx::query(
        r#"
        SELECT t.number AS block_number, t.text AS text,
               p.number AS page_number,
               d.id AS document_id, d.file_ref AS file_ref,
               bm25(textblock_fts) AS score
        FROM textblock_fts
        JOIN textblock t ON t.id = textblock_fts.rowid
        JOIN page p ON p.id = t.page_id
        JOIN document d ON d.id = p.document_id
        WHERE textblock_fts MATCH ?
        ORDER BY score ASC, t.id ASC
        LIMIT ?
        "#,
    )
    .bind(query)
    .bind(limit)
    .fetch_all(pool)
    .await
    .with_context(|| format!("full-text query failed: {}", query))?;

    Ok(rows
        .iter()
        .map(|row| {
            let text: String = row.get("text");
            SearchHit {
                document_id: row.get("document_id"),
                file_ref: row.get("file_ref"),
                page_number: row.get("page_number"),
                block_number: row.get("block_number"),
                rank: row.get("score"),
                highlighted: highlight(&text, ctx, threshold),
                text,
            }
        })
        .collect())
}

pub async fn run_search(config: &Config, query: &str, limit: Option<i64>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let pool = db::connect(config).await?;
    let ctx = SearchContext::from_query(query);
    let limit = limit.unwrap_or(config.search.final_limit);
    let hits = search_blocks(&pool, query, limit, &ctx, config.search.similarity_threshold).await;
    pool.close().await;
    let hits = hits?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.3}] {}  (page {}, block {})",
            i + 1,
            hit.rank,
            hit.page_anchor(&ctx),
            hit.page_number + 1,
            hit.block_number
        );
        println!("    {}", hit.highlighted);
        println!();
    }

    Ok(())
}
