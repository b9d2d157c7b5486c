//! Approximate-match highlighting of retrieved block text.
//!
//! Query terms come from a request-scoped [`SearchContext`]. A word of the
//! retrieved text is a hit when its similarity to any term exceeds the
//! threshold, so small OCR or typography differences still light up.

use std::collections::BTreeSet;

use regex::RegexBuilder;

/// Default similarity a word must exceed to be highlighted.
pub const DEFAULT_THRESHOLD: f64 = 0.7;

const OPEN: &str = "<mark>";
const CLOSE: &str = "</mark>";
const BREAK: &str = "<br>";

fn is_operator(token: &str) -> bool {
    matches!(token, "AND" | "OR" | "NOT")
}

/// Query terms active for one search request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchContext {
    pub terms: Vec<String>,
}

impl SearchContext {
    /// Derive highlight terms from a raw full-text query: boolean operators
    /// are dropped, quoting and grouping characters stripped, duplicates
    /// removed (first occurrence wins).
    pub fn from_query(query: &str) -> Self {
        let mut terms: Vec<String> = Vec::new();
        for token in query.split_whitespace() {
            if is_operator(token) {
                continue;
            }
            let term = token.trim_matches(|c| matches!(c, '"' | '\'' | '(' | ')' | '*'));
            if !term.is_empty() && !terms.iter().any(|t| t == term) {
                terms.push(term.to_string());
            }
        }
        Self { terms }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Normalized indel similarity in `[0, 1]`: `2 * lcs / (len(a) + len(b))`,
/// compared case-insensitively. Two empty strings are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    // Longest common subsequence, one row at a time.
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for ca in &a {
        for (j, cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                cur[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    let lcs = prev[b.len()];
    (2 * lcs) as f64 / total as f64
}

/// Words of `text` similar enough to any query term.
pub fn matching_words(text: &str, ctx: &SearchContext, threshold: f64) -> BTreeSet<String> {
    let mut hits = BTreeSet::new();
    for token in text.split_whitespace() {
        if is_operator(token) {
            continue;
        }
        let word = token.trim_matches(|c| matches!(c, '.' | ',' | ';' | '(' | ')'));
        if word.is_empty() {
            continue;
        }
        if ctx.terms.iter().any(|term| similarity(word, term) > threshold) {
            hits.insert(word.to_string());
        }
    }
    hits
}

fn escape_into(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\r' => {}
            '\n' => out.push_str(BREAK),
            c => out.push(c),
        }
    }
}

/// Render `text` for display with every occurrence of a hit word wrapped in
/// `<mark>`. Occurrences are found case-insensitively and keep their original
/// casing. Line feeds become `<br>`, carriage returns are dropped, and the
/// rest of the text is HTML-escaped.
pub fn highlight(text: &str, ctx: &SearchContext, threshold: f64) -> String {
    let hits = matching_words(text, ctx, threshold);

    let mut out = String::with_capacity(text.len() + hits.len() * (OPEN.len() + CLOSE.len()));
    if hits.is_empty() {
        escape_into(&mut out, text);
        return out;
    }

    // Longest first so a word is never split by a shorter hit it contains.
    let mut words: Vec<&String> = hits.iter().collect();
    words.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
    let pattern = words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");

    let re = match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(re) => re,
        Err(e) => {
            log::warn!("highlight pattern rejected: {}", e);
            escape_into(&mut out, text);
            return out;
        }
    };

    let mut last = 0;
    for m in re.find_iter(text) {
        escape_into(&mut out, &text[last..m.start()]);
        out.push_str(OPEN);
        escape_into(&mut out, m.as_str());
        out.push_str(CLOSE);
        last = m.end();
    }
    escape_into(&mut out, &text[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_terms_drop_operators_and_quotes() {
        let ctx = SearchContext::from_query(r#""invoice" AND total OR 'tax' NOT refund total"#);
        assert_eq!(ctx.terms, vec!["invoice", "total", "tax", "refund"]);
        assert!(SearchContext::from_query("AND OR").is_empty());
    }

    #[test]
    fn similarity_matches_indel_ratio() {
        assert_eq!(similarity("kitten", "kitten"), 1.0);
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("abc", ""), 0.0);
        // lcs("kitten", "sitting") = 4 -> 8 / 13
        assert!((similarity("kitten", "sitting") - 8.0 / 13.0).abs() < 1e-12);
        assert_eq!(similarity("Invoice", "INVOICE"), 1.0);
    }

    #[test]
    fn approximate_words_are_marked() {
        let ctx = SearchContext::from_query("invoice");
        let out = highlight("Total of lnvoice 42.", &ctx, DEFAULT_THRESHOLD);
        assert_eq!(out, "Total of <mark>lnvoice</mark> 42.");
    }

    #[test]
    fn punctuation_is_stripped_before_comparing() {
        let ctx = SearchContext::from_query("total");
        let out = highlight("(Total), total; TOTAL.", &ctx, DEFAULT_THRESHOLD);
        assert_eq!(
            out,
            "(<mark>Total</mark>), <mark>total</mark>; <mark>TOTAL</mark>."
        );
    }

    #[test]
    fn dissimilar_words_are_untouched() {
        let ctx = SearchContext::from_query("invoice");
        assert_eq!(highlight("nothing here", &ctx, DEFAULT_THRESHOLD), "nothing here");
    }

    #[test]
    fn line_breaks_and_escaping() {
        let ctx = SearchContext::default();
        assert_eq!(
            highlight("a < b\r\nc & d", &ctx, DEFAULT_THRESHOLD),
            "a &lt; b<br>c &amp; d"
        );
    }

    #[test]
    fn longer_hit_wins_over_contained_hit() {
        let ctx = SearchContext::from_query("report reports");
        let out = highlight("reports and report", &ctx, DEFAULT_THRESHOLD);
        assert_eq!(out, "<mark>reports</mark> and <mark>report</mark>");
    }
}
