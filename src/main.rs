//! # pdfsift CLI (`sift`)
//!
//! ```bash
//! sift --config ./config/sift.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sift init` | Create the SQLite schema and bind the full-text index |
//! | `sift index <FILE>...` | Index (or reindex) PDFs stored under `storage.root` |
//! | `sift delete <FILE>...` | Delete indexed documents and their artifacts |
//! | `sift search "<query>"` | Full-text search with highlighted hits |
//! | `sift list` | List documents and their indexing status |
//! | `sift get <ID>` | Show the pages and blocks of one document |
//! | `sift verify` | Check the full-text index against the block table |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tokio::task::JoinHandle;

use pdfsift::decode::LopdfDecoder;
use pdfsift::index_sync::{self, IndexBinding};
use pdfsift::notify::{Notifier, Severity, Subscription};
use pdfsift::queue::TaskQueue;
use pdfsift::{config, db, get, migrate, search};

/// Full-text search over stored PDF documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "sift",
    about = "pdfsift: full-text search over the text blocks of PDF documents",
    version
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "./config/sift.toml")]
    config: PathBuf,

    /// User that notifications are addressed to.
    #[arg(long, global = true, default_value = "cli")]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema and full-text index.
    Init,

    /// Index PDFs, given relative to `storage.root`.
    Index {
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Delete indexed documents.
    Delete {
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Search indexed text blocks.
    Search {
        query: String,

        /// Maximum number of hits (defaults to `search.final_limit`).
        #[arg(long)]
        limit: Option<i64>,
    },

    /// List documents.
    List,

    /// Show one document's pages and blocks.
    Get { id: i64 },

    /// Compare the full-text index with the block table.
    Verify,
}

/// Print notifications for `user` as they arrive. Resolves to the number of
/// failures seen once the subscription is dropped by the notifier.
fn print_notifications(mut sub: Subscription) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut failures = 0;
        while let Some(note) = sub.receiver.recv().await {
            if note.severity == Severity::Danger {
                failures += 1;
            }
            println!("[{}] {}", note.severity, note.message);
        }
        failures
    })
}

async fn run_tasks(cfg: config::Config, user: &str, files: &[String], delete: bool) -> anyhow::Result<()> {
    let notifier = Arc::new(Notifier::new());
    let sub = notifier.subscribe(user);
    let sub_id = sub.id;
    let printer = print_notifications(sub);

    let queue = TaskQueue::start(cfg, Arc::new(LopdfDecoder), notifier.clone()).await?;
    for file in files {
        // Rejections are already reported through the notifier.
        let _ = if delete {
            queue.enqueue_delete(file, user).await
        } else {
            queue.enqueue_index(file, user).await
        };
    }
    queue.wait_idle().await;
    queue.shutdown().await;

    notifier.unsubscribe(sub_id);
    let failures = printer.await?;
    if failures > 0 {
        bail!("{} task(s) failed", failures);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Index { files } => {
            run_tasks(cfg, &cli.user, &files, false).await?;
        }
        Commands::Delete { files } => {
            run_tasks(cfg, &cli.user, &files, true).await?;
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit).await?;
        }
        Commands::List => {
            get::run_list(&cfg).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, id).await?;
        }
        Commands::Verify => {
            let pool = db::connect(&cfg).await?;
            let binding = IndexBinding::textblock();
            let drift = index_sync::drift(&pool, &binding).await?;
            let check = index_sync::integrity_check(&pool, &binding).await;
            let rows = index_sync::indexed_row_ids(&pool, &binding).await?.len();
            pool.close().await;

            if !drift.is_clean() {
                bail!(
                    "index out of sync: {} orphaned entries {:?}, {} missing rows {:?}",
                    drift.orphans.len(),
                    drift.orphans,
                    drift.missing.len(),
                    drift.missing
                );
            }
            check?;
            println!("Index consistent: {} rows.", rows);
        }
    }

    Ok(())
}
