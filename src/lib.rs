//! # pdfsift
//!
//! Full-text search over the text blocks of stored PDF documents.
//!
//! Each PDF is decoded into positioned text spans, the spans of every page are
//! grouped into paragraph-like blocks by geometric adjacency, and the blocks
//! are persisted to SQLite. An FTS5 index over the block table is kept in step
//! by triggers, and search hits are highlighted by approximate word match.
//! Index and delete requests go through a task queue that serializes work per
//! document over a small worker pool.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────────────┐
//! │  decode  │──▶│ cluster  │──▶│  ingest  │──▶│ SQLite           │
//! │ (lopdf)  │   │ (blocks) │   │ per page │   │ textblock + FTS5 │
//! └──────────┘   └──────────┘   └────▲─────┘   └────────┬─────────┘
//!                                    │                  │
//!                              ┌─────┴─────┐      ┌─────▼─────┐
//!                              │   queue   │      │  search   │
//!                              │ + notify  │      │ highlight │
//!                              └───────────┘      └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Spans, rectangles, clusters and persisted rows |
//! | [`geometry`] | Bounding-box overlap and union |
//! | [`cluster`] | Block clustering and block text |
//! | [`decode`] | PDF decoding into spans |
//! | [`repository`] | CRUD over document, page and textblock |
//! | [`index_sync`] | FTS5 index binding and triggers |
//! | [`migrate`] | Schema creation |
//! | [`ingest`] | Ingestion pipeline |
//! | [`queue`] | Task queue and worker pool |
//! | [`notify`] | User notifications |
//! | [`highlight`] | Search hit highlighting |
//! | [`search`] | Full-text search |
//! | [`get`] | Document listing and inspection |
//! | [`error`] | Indexing error kinds |
//! | [`config`] | TOML configuration |
//! | [`db`] | Database connection |

pub mod cluster;
pub mod config;
pub mod db;
pub mod decode;
pub mod error;
pub mod geometry;
pub mod get;
pub mod highlight;
pub mod index_sync;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod notify;
pub mod queue;
pub mod repository;
pub mod search;
