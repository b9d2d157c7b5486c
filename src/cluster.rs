//! Geometric text-block clustering.
//!
//! PDFs carry no paragraph structure, so blocks are rebuilt from the flat
//! list of spans on a page. Spans are sorted by `(top, left)`; each unvisited
//! span seeds a cluster and a single sweep over the remaining unvisited spans
//! absorbs every span adjacent to the *growing* cluster box.
//!
//! Adjacency tolerance (`epsilon`) is relative to the seed's height:
//! `height(seed) * ratio / 100`. A candidate `t` joins when either
//!
//! - `t.left - current.right < epsilon` and the boxes overlap vertically, or
//! - `t.top - current.bottom < epsilon` and the boxes overlap horizontally,
//!
//! and its size equals the cluster size, unless the last absorbed span is
//! shorter than [`SHORT_TEXT_CHARS`] characters (superscripts, bullets).
//!
//! Rejected spans are not revisited once the cluster box grows; this is a
//! single pass, not a fixed point.

use std::cmp::Ordering;

use crate::geometry::{overlaps_horizontally, overlaps_vertically, union};
use crate::models::{Cluster, Rect, Span};

/// Default adjacency ratio, in percent of the seed height.
pub const DEFAULT_RATIO: f64 = 50.0;

/// Texts shorter than this may continue a cluster despite a size mismatch.
pub const SHORT_TEXT_CHARS: usize = 3;

fn reading_order(a: &Rect, b: &Rect) -> Ordering {
    a.top
        .total_cmp(&b.top)
        .then(a.left.total_cmp(&b.left))
        .then(a.bottom.total_cmp(&b.bottom))
        .then(a.right.total_cmp(&b.right))
}

fn span_order(a: &Span, b: &Span) -> Ordering {
    reading_order(&a.bbox, &b.bbox)
        .then(a.size.total_cmp(&b.size))
        .then_with(|| a.text.cmp(&b.text))
}

/// Partition the spans of one page into clusters, ordered top-to-bottom then
/// left-to-right by cluster box.
pub fn cluster_page(spans: &[Span], ratio: f64) -> Vec<Cluster> {
    let mut order: Vec<&Span> = spans.iter().collect();
    order.sort_by(|a, b| span_order(a, b));

    let mut visited = vec![false; order.len()];
    let mut clusters = Vec::new();

    for i in 0..order.len() {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        let seed = order[i];
        let epsilon = seed.bbox.height() * ratio / 100.0;

        let mut current = seed.bbox;
        let mut size = seed.size;
        let mut font = seed.font.clone();
        let mut last_text_len = seed.text.chars().count();
        let mut members = vec![seed.clone()];

        for j in (i + 1)..order.len() {
            if visited[j] {
                continue;
            }
            let t = order[j];
            let size_ok = t.size == size || last_text_len < SHORT_TEXT_CHARS;
            if !size_ok {
                continue;
            }
            let horizontal =
                t.bbox.left - current.right < epsilon && overlaps_vertically(&t.bbox, &current);
            let vertical =
                t.bbox.top - current.bottom < epsilon && overlaps_horizontally(&t.bbox, &current);
            if !(horizontal || vertical) {
                continue;
            }

            visited[j] = true;
            current = union(&current, &t.bbox);
            if t.size < size {
                size = t.size;
                font = t.font.clone();
            }
            last_text_len = t.text.chars().count();
            members.push(t.clone());
        }

        members.sort_by(span_order);
        clusters.push(Cluster {
            page: seed.page,
            rect: current,
            size,
            font,
            members,
        });
    }

    clusters.sort_by(|a: &Cluster, b: &Cluster| {
        reading_order(&a.rect, &b.rect).then_with(|| span_order(&a.members[0], &b.members[0]))
    });
    clusters
}

/// Synthesize the text of a cluster.
///
/// Members are joined with a line break when a member starts below the
/// previous member's bottom edge, and with a single space otherwise. No
/// separator is added when either side already carries whitespace.
pub fn block_text(cluster: &Cluster) -> String {
    let mut text = String::new();
    let mut prev: Option<&Span> = None;
    for span in &cluster.members {
        if let Some(p) = prev {
            if span.bbox.top > p.bbox.bottom {
                text.push('\n');
            } else if !text.ends_with(char::is_whitespace)
                && !span.text.starts_with(char::is_whitespace)
            {
                text.push(' ');
            }
        }
        text.push_str(&span.text);
        prev = Some(span);
    }
    text
}
