//! Full-text index synchronizer.
//!
//! Binds an FTS5 external-content table to a base table and installs the
//! three triggers that keep it in step with every insert, update and delete.
//! The index is never rebuilt wholesale: from the moment it is bound it is
//! maintained purely by the triggers.
//!
//! For a base table `textblock` bound to `textblock_fts` the result is:
//!
//! ```sql
//! CREATE VIRTUAL TABLE textblock_fts USING fts5(
//!     text, page_id UNINDEXED, number UNINDEXED, size UNINDEXED,
//!     content='textblock', content_rowid='id');
//! CREATE TRIGGER textblock_fts_ai AFTER INSERT ON textblock ...
//! CREATE TRIGGER textblock_fts_ad AFTER DELETE ON textblock ...
//! CREATE TRIGGER textblock_fts_au AFTER UPDATE ON textblock ...
//! ```

use anyhow::{bail, Result};
use sqlx::SqlitePool;

/// Declares how an index table mirrors a base table.
#[derive(Debug, Clone)]
pub struct IndexBinding {
    pub base_table: String,
    pub index_table: String,
    /// Integer primary key of the base table, used as the FTS rowid.
    pub rowid_column: String,
    /// Columns tokenized for matching.
    pub indexed_columns: Vec<String>,
    /// Columns stored in the index but declared `UNINDEXED`.
    pub passthrough_columns: Vec<String>,
}

impl IndexBinding {
    pub fn new(base_table: &str, index_table: &str) -> Self {
        Self {
            base_table: base_table.to_string(),
            index_table: index_table.to_string(),
            rowid_column: "id".to_string(),
            indexed_columns: Vec::new(),
            passthrough_columns: Vec::new(),
        }
    }

    pub fn indexed(mut self, column: &str) -> Self {
        self.indexed_columns.push(column.to_string());
        self
    }

    pub fn passthrough(mut self, column: &str) -> Self {
        self.passthrough_columns.push(column.to_string());
        self
    }

    /// The binding used for text blocks.
    pub fn textblock() -> Self {
        Self::new("textblock", "textblock_fts")
            .indexed("text")
            .passthrough("page_id")
            .passthrough("number")
            .passthrough("size")
    }

    fn columns(&self) -> impl Iterator<Item = &String> {
        self.indexed_columns
            .iter()
            .chain(self.passthrough_columns.iter())
    }

    fn validate(&self) -> Result<()> {
        if self.indexed_columns.is_empty() {
            bail!("index {} declares no indexed columns", self.index_table);
        }
        let names = [&self.base_table, &self.index_table, &self.rowid_column];
        for name in names.into_iter().chain(self.columns()) {
            if !is_identifier(name) {
                bail!("invalid SQL identifier in index binding: {:?}", name);
            }
        }
        Ok(())
    }

    fn create_table_sql(&self) -> String {
        let mut cols: Vec<String> = self.indexed_columns.clone();
        cols.extend(
            self.passthrough_columns
                .iter()
                .map(|c| format!("{} UNINDEXED", c)),
        );
        format!(
            "CREATE VIRTUAL TABLE {} USING fts5({}, content='{}', content_rowid='{}')",
            self.index_table,
            cols.join(", "),
            self.base_table,
            self.rowid_column
        )
    }

    fn insert_stmt(&self, row: &str) -> String {
        let cols: Vec<&str> = self.columns().map(String::as_str).collect();
        let vals: Vec<String> = cols.iter().map(|c| format!("{}.{}", row, c)).collect();
        format!(
            "INSERT INTO {t}(rowid, {cols}) VALUES ({row}.{id}, {vals});",
            t = self.index_table,
            cols = cols.join(", "),
            row = row,
            id = self.rowid_column,
            vals = vals.join(", ")
        )
    }

    fn delete_stmt(&self, row: &str) -> String {
        let cols: Vec<&str> = self.columns().map(String::as_str).collect();
        let vals: Vec<String> = cols.iter().map(|c| format!("{}.{}", row, c)).collect();
        format!(
            "INSERT INTO {t}({t}, rowid, {cols}) VALUES ('delete', {row}.{id}, {vals});",
            t = self.index_table,
            cols = cols.join(", "),
            row = row,
            id = self.rowid_column,
            vals = vals.join(", ")
        )
    }

    fn trigger_sql(&self) -> [String; 3] {
        let (t, b) = (&self.index_table, &self.base_table);
        [
            format!(
                "CREATE TRIGGER IF NOT EXISTS {t}_ai AFTER INSERT ON {b} BEGIN {} END",
                self.insert_stmt("new")
            ),
            format!(
                "CREATE TRIGGER IF NOT EXISTS {t}_ad AFTER DELETE ON {b} BEGIN {} END",
                self.delete_stmt("old")
            ),
            // FTS5 has no partial-column update: drop the old entry, add the new.
            format!(
                "CREATE TRIGGER IF NOT EXISTS {t}_au AFTER UPDATE ON {b} BEGIN {} {} END",
                self.delete_stmt("old"),
                self.insert_stmt("new")
            ),
        ]
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Create the index table and its triggers if absent. Idempotent.
pub async fn bind(pool: &SqlitePool, binding: &IndexBinding) -> Result<()> {
    binding.validate()?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let exists: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?")
            .bind(&binding.index_table)
            .fetch_one(pool)
            .await?;

    if !exists {
        sqlx::query(&binding.create_table_sql()).execute(pool).await?;
        log::info!(
            "created full-text index {} over {}",
            binding.index_table,
            binding.base_table
        );
    }

    for sql in binding.trigger_sql() {
        sqlx::query(&sql).execute(pool).await?;
    }
    log::debug!("triggers bound for {}", binding.index_table);
    Ok(())
}

/// Row identities present in the index, ascending.
///
/// Read from the `_docsize` shadow table: an external-content table reads its
/// rows back through the content table, so querying it directly would always
/// mirror the base table.
pub async fn indexed_row_ids(pool: &SqlitePool, binding: &IndexBinding) -> Result<Vec<i64>> {
    binding.validate()?;
    let ids = sqlx::query_scalar(&format!(
        "SELECT id FROM {}_docsize ORDER BY id",
        binding.index_table
    ))
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

/// Row identities present in the base table, ascending.
pub async fn base_row_ids(pool: &SqlitePool, binding: &IndexBinding) -> Result<Vec<i64>> {
    binding.validate()?;
    let ids = sqlx::query_scalar(&format!(
        "SELECT {} FROM {} ORDER BY 1",
        binding.rowid_column, binding.base_table
    ))
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

/// Difference between base and index row identities.
#[derive(Debug, Default, PartialEq)]
pub struct Drift {
    /// In the index but not in the base table.
    pub orphans: Vec<i64>,
    /// In the base table but not in the index.
    pub missing: Vec<i64>,
}

impl Drift {
    pub fn is_clean(&self) -> bool {
        self.orphans.is_empty() && self.missing.is_empty()
    }
}

pub async fn drift(pool: &SqlitePool, binding: &IndexBinding) -> Result<Drift> {
    let base = base_row_ids(pool, binding).await?;
    let indexed = indexed_row_ids(pool, binding).await?;
    Ok(Drift {
        orphans: sorted_difference(&indexed, &base),
        missing: sorted_difference(&base, &indexed),
    })
}

fn sorted_difference(a: &[i64], b: &[i64]) -> Vec<i64> {
    a.iter()
        .filter(|x| b.binary_search(x).is_err())
        .copied()
        .collect()
}

/// Run the FTS5 `integrity-check` command. Fails if the index does not
/// match the content table.
pub async fn integrity_check(pool: &SqlitePool, binding: &IndexBinding) -> Result<()> {
    binding.validate()?;
    sqlx::query(&format!(
        "INSERT INTO {t}({t}) VALUES('integrity-check')",
        t = binding.index_table
    ))
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn textblock_table_sql() {
        assert_eq!(
            IndexBinding::textblock().create_table_sql(),
            "CREATE VIRTUAL TABLE textblock_fts USING fts5(text, page_id UNINDEXED, \
             number UNINDEXED, size UNINDEXED, content='textblock', content_rowid='id')"
        );
    }

    #[test]
    fn update_trigger_deletes_then_inserts() {
        let [_, _, update] = IndexBinding::textblock().trigger_sql();
        let del = update.find("'delete'").unwrap();
        let ins = update.rfind("INSERT INTO textblock_fts(rowid").unwrap();
        assert!(del < ins);
        assert!(update.contains("old.id"));
        assert!(update.contains("new.id"));
    }

    #[test]
    fn rejects_bad_identifiers() {
        let binding = IndexBinding::new("textblock; DROP TABLE x", "fts").indexed("text");
        assert!(binding.validate().is_err());
        assert!(IndexBinding::new("a", "b").validate().is_err());
        assert!(IndexBinding::textblock().validate().is_ok());
    }

    #[test]
    fn difference_of_sorted_ids() {
        assert_eq!(sorted_difference(&[1, 2, 3, 5], &[2, 5]), vec![1, 3]);
        assert!(sorted_difference(&[], &[1]).is_empty());
    }
}
