//! Result assembly
//!
//! Merges per-page results into the final table. Pages are concatenated in
//! ascending sequence order after validating the coverage invariants: no
//! duplicate or missing sequence index, contiguous offsets, and no data
//! after a short page. A violation means the planner or scheduler misbehaved
//! and surfaces as [`Error::Assembly`], never as a transient condition.

use crate::error::{Error, Result};
use crate::types::{PageResult, Row};

/// The merged, ordered table returned to the caller. Read-only afterward.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledTable {
    /// Column names, in payload order
    pub columns: Vec<String>,

    /// All rows, in ascending page / original-row order
    pub rows: Vec<Row>,
}

impl AssembledTable {
    /// An empty table with no columns
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table holds no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a named column, if present
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Merge page results into one table, truncating to `row_limit` when
/// look-ahead over-fetched (`0` = no limit).
pub fn assemble(mut pages: Vec<PageResult>, row_limit: u64) -> Result<AssembledTable> {
    pages.sort_by_key(|p| p.seq);

    // Sequence indices must be exactly 0..n after sorting.
    for (i, page) in pages.iter().enumerate() {
        if page.seq != i {
            return Err(Error::assembly(format!(
                "page sequence broken at index {i}: found seq {}",
                page.seq
            )));
        }
    }

    // Offsets must tile the covered range without gap or overlap.
    let mut expected_offset = 0u64;
    for page in &pages {
        if page.offset != expected_offset {
            return Err(Error::assembly(format!(
                "page seq {} starts at offset {} but {} was expected",
                page.seq, page.offset, expected_offset
            )));
        }
        expected_offset += u64::from(page.requested);
    }

    // A short page ends the data; any rows beyond it were fetched from a
    // range the planner believed empty.
    let mut short_at: Option<usize> = None;
    for page in &pages {
        if let Some(seq) = short_at {
            if !page.rows.is_empty() {
                return Err(Error::assembly(format!(
                    "page seq {} carries rows after short page seq {seq}",
                    page.seq
                )));
            }
        }
        if page.is_short() {
            short_at.get_or_insert(page.seq);
        }
    }

    let mut columns: Vec<String> = Vec::new();
    for page in &pages {
        if page.columns.is_empty() {
            continue;
        }
        if columns.is_empty() {
            columns = page.columns.clone();
        } else if columns != page.columns {
            return Err(Error::assembly(format!(
                "page seq {} columns {:?} disagree with {:?}",
                page.seq, page.columns, columns
            )));
        }
    }

    let mut rows: Vec<Row> = Vec::with_capacity(pages.iter().map(|p| p.rows.len()).sum());
    for page in pages {
        rows.extend(page.rows);
    }
    if row_limit > 0 && rows.len() as u64 > row_limit {
        rows.truncate(row_limit as usize);
    }

    Ok(AssembledTable { columns, rows })
}
