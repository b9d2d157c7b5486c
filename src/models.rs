//! Core data models used throughout pdfsift.
//!
//! Spans and rectangles come out of the PDF decoder, clusters are the
//! transient grouping produced per page, and the `*Row` types mirror the
//! persisted `document` / `page` / `textblock` tables.

use bitflags::bitflags;
use serde::Serialize;

/// Axis-aligned rectangle with the origin at the top of the page
/// (`top` is the smaller y).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Rect {
    /// Build a rectangle, normalizing swapped edges so that
    /// `left <= right` and `top <= bottom` always hold.
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left: left.min(right),
            top: top.min(bottom),
            right: left.max(right),
            bottom: top.max(bottom),
        }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    /// Bbox as the `[bbox0, bbox1, bbox2, bbox3]` column order of `textblock`.
    pub fn to_array(&self) -> [f64; 4] {
        [self.left, self.top, self.right, self.bottom]
    }
}

bitflags! {
    /// Font style bits as reported by the decoder.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
    pub struct StyleFlags: u32 {
        const SUPERSCRIPT = 1;
        const ITALIC = 1 << 1;
        const SERIF = 1 << 2;
        const MONOSPACE = 1 << 3;
        const BOLD = 1 << 4;
    }
}

impl StyleFlags {
    /// Human-readable decomposition, e.g. `["italic", "sans", "proportional"]`.
    pub fn describe(&self) -> Vec<&'static str> {
        let mut labels = Vec::new();
        if self.contains(StyleFlags::SUPERSCRIPT) {
            labels.push("superscript");
        }
        if self.contains(StyleFlags::ITALIC) {
            labels.push("italic");
        }
        labels.push(if self.contains(StyleFlags::SERIF) {
            "serifed"
        } else {
            "sans"
        });
        labels.push(if self.contains(StyleFlags::MONOSPACE) {
            "monospaced"
        } else {
            "proportional"
        });
        if self.contains(StyleFlags::BOLD) {
            labels.push("bold");
        }
        labels
    }
}

/// A positioned, styled text fragment. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Span {
    pub font: String,
    pub flags: StyleFlags,
    pub size: f64,
    /// sRGB packed as `0xRRGGBB`.
    pub color: u32,
    pub text: String,
    pub bbox: Rect,
    pub page: u32,
}

/// Spans grouped by geometric adjacency on one page. Never persisted.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub page: u32,
    /// Bounding union of all members.
    pub rect: Rect,
    /// Smallest member font size.
    pub size: f64,
    /// Font of the smallest-size member.
    pub font: String,
    /// Members sorted by `(top, left)`.
    pub members: Vec<Span>,
}

/// A row of the `document` table.
///
/// `start_index == end_index` marks a document whose indexing has not
/// finished (or was interrupted).
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRow {
    pub id: i64,
    pub file_ref: String,
    /// Unix milliseconds.
    pub start_index: i64,
    /// Unix milliseconds.
    pub end_index: i64,
}

impl DocumentRow {
    pub fn is_indexing(&self) -> bool {
        self.start_index == self.end_index
    }

    pub fn duration_ms(&self) -> i64 {
        self.end_index - self.start_index
    }
}

/// A row of the `page` table.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRow {
    pub id: i64,
    pub document_id: i64,
    /// 0-based page number.
    pub number: i64,
    pub width: f64,
    pub height: f64,
}

/// A row of the `textblock` table: the committed form of a [`Cluster`].
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlockRow {
    pub id: i64,
    pub page_id: i64,
    pub number: i64,
    pub bbox: Rect,
    pub text: String,
    pub size: f64,
}
