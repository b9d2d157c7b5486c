//! Ingestion pipeline: PDF → spans → clusters → `page` / `textblock` rows.
//!
//! The document row is committed first with `start_index == end_index`, then
//! every page and every block is committed on its own as it is produced.
//! Only after the last page succeeds is `end_index` stamped. A failure part
//! way through leaves the committed pages in place and the document marked
//! as still indexing.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use sqlx::SqlitePool;

use crate::cluster::{block_text, cluster_page};
use crate::config::Config;
use crate::decode::{DecodedDocument, PdfDecoder};
use crate::error::{IndexingError, Result};
use crate::notify::{Notifier, Severity};
use crate::repository;

/// Cooperative cancellation, checked between pages.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub document_id: i64,
    pub file_ref: String,
    pub pages: usize,
    pub blocks: usize,
    pub duration_ms: i64,
}

/// Name of the layout file written into a document's artifact directory.
pub const LAYOUT_FILE: &str = "layout.json";

#[derive(Serialize)]
struct LayoutPage {
    number: u32,
    width: f64,
    height: f64,
    blocks: Vec<LayoutBlock>,
}

#[derive(Serialize)]
struct LayoutBlock {
    number: usize,
    bbox: [f64; 4],
    size: f64,
    font: String,
    /// Style labels of the member that set the block's font.
    style: Vec<&'static str>,
    text: String,
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// `1234` -> `1.234s`, `125000` -> `2m05.000s`.
pub fn format_duration(ms: i64) -> String {
    let ms = ms.max(0);
    let minutes = ms / 60_000;
    let rest = ms % 60_000;
    if minutes > 0 {
        format!("{}m{:02}.{:03}s", minutes, rest / 1000, rest % 1000)
    } else {
        format!("{}.{:03}s", rest / 1000, rest % 1000)
    }
}

async fn decode(decoder: Arc<dyn PdfDecoder>, path: PathBuf) -> Result<DecodedDocument> {
    let display = path.display().to_string();
    match tokio::task::spawn_blocking(move || decoder.open(&path)).await {
        Ok(result) => result,
        Err(e) => Err(IndexingError::Decode {
            path: display,
            reason: format!("decoder task failed: {}", e),
        }),
    }
}

/// Index one stored PDF.
///
/// `file_ref` is relative to `storage.root`. Page progress goes to `user`
/// through `notifier` every `queue.progress_every` pages.
pub async fn ingest(
    pool: &SqlitePool,
    config: &Config,
    decoder: Arc<dyn PdfDecoder>,
    notifier: &Notifier,
    user: &str,
    file_ref: &str,
    cancel: &CancelFlag,
) -> Result<IngestReport> {
    let source = config.storage.source_path(file_ref)?;
    let artifact_dir = config.storage.artifact_dir(file_ref)?;
    let progress_every = config.queue.progress_every.max(1);

    let document = repository::create_document(pool, file_ref, now_ms()).await?;
    log::info!("indexing {} as document {}", file_ref, document.id);

    let decoded = decode(decoder, source).await?;
    let total = decoded.pages.len();

    tokio::fs::create_dir_all(&artifact_dir).await?;

    let mut layout = Vec::with_capacity(total);
    let mut block_count = 0;

    for page in &decoded.pages {
        if cancel.is_cancelled() {
            return Err(IndexingError::Cancelled(file_ref.to_string()));
        }
        if page.number % progress_every == 0 {
            notifier.send(
                user,
                format!("Indexing page: {}/{}", page.number, total),
                Severity::Info,
            );
        }

        let row = repository::create_page(
            pool,
            document.id,
            i64::from(page.number),
            page.width,
            page.height,
        )
        .await?;

        let clusters = cluster_page(&page.spans, config.clustering.ratio);
        let mut blocks = Vec::with_capacity(clusters.len());
        for (number, cluster) in clusters.iter().enumerate() {
            let text = block_text(cluster);
            let style = cluster
                .members
                .iter()
                .find(|m| m.font == cluster.font && m.size == cluster.size)
                .map(|m| m.flags.describe())
                .unwrap_or_default();
            repository::create_block(pool, row.id, number as i64, &cluster.rect, &text, cluster.size)
                .await?;
            blocks.push(LayoutBlock {
                number,
                bbox: cluster.rect.to_array(),
                size: cluster.size,
                font: cluster.font.clone(),
                style,
                text,
            });
        }
        log::debug!(
            "{}: page {} -> {} blocks from {} spans",
            file_ref,
            page.number,
            blocks.len(),
            page.spans.len()
        );
        block_count += blocks.len();
        layout.push(LayoutPage {
            number: page.number,
            width: page.width,
            height: page.height,
            blocks,
        });
    }

    let json = serde_json::to_vec_pretty(&layout).map_err(std::io::Error::from)?;
    tokio::fs::write(artifact_dir.join(LAYOUT_FILE), json).await?;

    let end = repository::finish_document(pool, &document, now_ms()).await?;

    Ok(IngestReport {
        document_id: document.id,
        file_ref: file_ref.to_string(),
        pages: total,
        blocks: block_count,
        duration_ms: end - document.start_index,
    })
}
