//! In-memory index over one spreadsheet sheet.
//!
//! The index caches the parsed rows keyed by (path, sheet, mtime) and
//! reloads transparently when the file changes on disk. Lookups compare
//! stringified, trimmed cell text so "42" typed by the operator matches a
//! numeric 42 in the sheet.

use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::info;

use crate::error::FilerError;
use crate::excel;
use crate::types::Record;

/// Which rows feed a filter column's value list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistinctValuesPolicy {
    /// Every value in the column, regardless of earlier filter choices.
    #[default]
    FullSheet,
    /// Only values from rows matching the filters already chosen.
    FilteredByPrior,
}

#[derive(Debug, Clone, PartialEq)]
struct CacheKey {
    path: PathBuf,
    sheet: String,
    mtime: Option<SystemTime>,
}

/// Cached view of one sheet's header row and data rows.
#[derive(Debug, Default)]
pub struct RowIndex {
    key: Option<CacheKey>,
    columns: Vec<String>,
    rows: Vec<Record>,
}

impl RowIndex {
    pub fn new() -> Self {
        RowIndex::default()
    }

    /// Load the sheet, reusing the cached rows when the file is unchanged.
    pub fn load(&mut self, path: &Path, sheet: &str) -> Result<(), FilerError> {
        let mtime = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        let key = CacheKey {
            path: path.to_path_buf(),
            sheet: sheet.to_string(),
            mtime,
        };
        if self.key.as_ref() == Some(&key) && key.mtime.is_some() {
            return Ok(());
        }
        let (columns, rows) = excel::read_sheet(path, sheet)?;
        info!(sheet, rows = rows.len(), "row index loaded");
        self.key = Some(key);
        self.columns = columns;
        self.rows = rows;
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    /// Distinct non-empty values of `column`, sorted. Values are returned
    /// exactly as they appear in the rows; duplicates and blanks are decided
    /// on trimmed text, matching the comparison `find_one` uses.
    ///
    /// Under `FilteredByPrior` only rows matching every `(column, value)`
    /// pair in `prior_filters` contribute.
    pub fn distinct_values(
        &self,
        column: &str,
        prior_filters: &[(String, String)],
        policy: DistinctValuesPolicy,
    ) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for row in &self.rows {
            if policy == DistinctValuesPolicy::FilteredByPrior
                && !matches_all(row, prior_filters)
            {
                continue;
            }
            let Some(value) = row.get(column) else {
                continue;
            };
            let text = value.as_display();
            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }
            if seen.insert(trimmed.to_string()) {
                out.push(text);
            }
        }
        out.sort();
        out
    }

    /// First row matching every `(column, value)` pair exactly, by
    /// stringified trimmed text. Returns the 0-based data row index and the
    /// matched record.
    pub fn find_one(&self, filters: &[(String, String)]) -> Result<(usize, &Record), FilerError> {
        self.rows
            .iter()
            .enumerate()
            .find(|(_, row)| matches_all(row, filters))
            .ok_or_else(|| {
                let wanted: Vec<&str> = filters.iter().map(|(_, v)| v.as_str()).collect();
                FilerError::NotFound(wanted.join(", "))
            })
    }
}

fn matches_all(row: &Record, filters: &[(String, String)]) -> bool {
    filters.iter().all(|(column, value)| {
        row.get(column)
            .map(|cell| cell.as_display().trim() == value.trim())
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CellValue;

    fn record(pairs: &[(&str, CellValue)]) -> Record {
        let mut r = Record::default();
        for (k, v) in pairs {
            r.insert(*k, v.clone());
        }
        r
    }

    fn index_with(rows: Vec<Record>, columns: &[&str]) -> RowIndex {
        RowIndex {
            key: None,
            columns: columns.iter().map(|s| s.to_string()).collect(),
            rows,
        }
    }

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn distinct_values_dedup_and_sort() {
        let idx = index_with(
            vec![
                record(&[("Client", text("Acme"))]),
                record(&[("Client", text("Globex"))]),
                record(&[("Client", text("Acme"))]),
                record(&[("Client", text("  "))]),
            ],
            &["Client"],
        );
        assert_eq!(
            idx.distinct_values("Client", &[], DistinctValuesPolicy::FullSheet),
            vec!["Acme", "Globex"]
        );
    }

    #[test]
    fn distinct_values_are_verbatim_cell_text() {
        let idx = index_with(
            vec![record(&[("Client", text(" Padded "))])],
            &["Client"],
        );
        let values = idx.distinct_values("Client", &[], DistinctValuesPolicy::FullSheet);
        assert_eq!(values, vec![" Padded "]);
        // The padded value still matches operator input via trimmed equality.
        let filters = vec![("Client".to_string(), "Padded".to_string())];
        assert_eq!(idx.find_one(&filters).unwrap().0, 0);
    }

    #[test]
    fn distinct_values_filtered_by_prior() {
        let idx = index_with(
            vec![
                record(&[("Client", text("Acme")), ("Month", text("Jan"))]),
                record(&[("Client", text("Acme")), ("Month", text("Feb"))]),
                record(&[("Client", text("Globex")), ("Month", text("Mar"))]),
            ],
            &["Client", "Month"],
        );
        let prior = vec![("Client".to_string(), "Acme".to_string())];
        assert_eq!(
            idx.distinct_values("Month", &prior, DistinctValuesPolicy::FilteredByPrior),
            vec!["Feb", "Jan"]
        );
        assert_eq!(
            idx.distinct_values("Month", &prior, DistinctValuesPolicy::FullSheet),
            vec!["Feb", "Jan", "Mar"]
        );
    }

    #[test]
    fn find_one_returns_first_match() {
        let idx = index_with(
            vec![
                record(&[("Client", text("Globex")), ("Month", text("Jan"))]),
                record(&[("Client", text("Acme")), ("Month", text("Jan"))]),
                record(&[("Client", text("Acme")), ("Month", text("Jan"))]),
            ],
            &["Client", "Month"],
        );
        let filters = vec![
            ("Client".to_string(), "Acme".to_string()),
            ("Month".to_string(), "Jan".to_string()),
        ];
        let (row_idx, row) = idx.find_one(&filters).unwrap();
        assert_eq!(row_idx, 1);
        assert_eq!(row.get("Client").unwrap().as_display(), "Acme");
    }

    #[test]
    fn find_one_matches_numbers_as_text() {
        let idx = index_with(
            vec![record(&[("Nr", CellValue::Number(42.0))])],
            &["Nr"],
        );
        let filters = vec![("Nr".to_string(), "42".to_string())];
        assert_eq!(idx.find_one(&filters).unwrap().0, 0);
    }

    #[test]
    fn find_one_missing_is_not_found() {
        let idx = index_with(vec![record(&[("Client", text("Acme"))])], &["Client"]);
        let filters = vec![("Client".to_string(), "Globex".to_string())];
        assert!(matches!(
            idx.find_one(&filters).unwrap_err(),
            FilerError::NotFound(_)
        ));
    }

    #[test]
    fn load_caches_until_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let ws = workbook.add_worksheet();
        ws.set_name("Data").unwrap();
        ws.write_string(0, 0, "Client").unwrap();
        ws.write_string(1, 0, "Acme").unwrap();
        workbook.save(&path).unwrap();

        let mut idx = RowIndex::new();
        idx.load(&path, "Data").unwrap();
        assert_eq!(idx.columns(), &["Client".to_string()]);
        assert_eq!(idx.rows().len(), 1);
        // Unchanged file: second load is a cache hit and keeps the rows.
        idx.load(&path, "Data").unwrap();
        assert_eq!(idx.rows().len(), 1);
    }
}
