//! Reference percentile distributions
//!
//! A [`PercentileTable`] maps a scalar key (paper age, or years since first
//! publication) to a row of metric values, one per percentile column. Tables
//! are loaded once at start-up and are read-only afterwards. The table only
//! answers lookups; interpolation lives in the scoring engine.

use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Reference table errors
#[derive(Debug, Error)]
pub enum TableError {
    /// The table has no rows; every lookup against it is unavailable
    #[error("Reference table is empty")]
    EmptyTable,

    #[error("Table parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Table IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One keyed row of a percentile table
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub key: f64,
    /// `(percentile, value)` pairs ordered by ascending percentile
    cells: Vec<(f64, f64)>,
}

impl TableRow {
    pub fn new(key: f64, cells: Vec<(f64, f64)>) -> Self {
        let mut cells = cells;
        cells.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { key, cells }
    }

    /// `(percentile, value)` pairs ordered by ascending percentile
    pub fn cells(&self) -> &[(f64, f64)] {
        &self.cells
    }

    pub fn min(&self) -> Option<f64> {
        self.cells.iter().map(|&(_, v)| v).reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.cells.iter().map(|&(_, v)| v).reduce(f64::max)
    }

    /// Metric value attained at an exact percentile column
    pub fn value_at(&self, percentile: f64) -> Option<f64> {
        self.cells
            .iter()
            .find(|&&(p, _)| p == percentile)
            .map(|&(_, v)| v)
    }

    /// Lowest percentile column holding exactly `value`
    pub fn percentile_at(&self, value: f64) -> Option<f64> {
        self.cells
            .iter()
            .find(|&&(_, v)| v == value)
            .map(|&(p, _)| p)
    }

    /// Element-wise mean of two rows sharing the same columns
    pub fn averaged(&self, other: &TableRow) -> TableRow {
        let cells = self
            .cells
            .iter()
            .zip(other.cells.iter())
            .map(|(&(p, a), &(_, b))| (p, (a + b) / 2.0))
            .collect();
        TableRow {
            key: (self.key + other.key) / 2.0,
            cells,
        }
    }

    fn is_non_decreasing(&self) -> bool {
        self.cells.windows(2).all(|w| w[0].1 <= w[1].1)
    }
}

/// Immutable 2-D reference distribution
#[derive(Debug, Clone, Default)]
pub struct PercentileTable {
    rows: Vec<TableRow>,
}

impl PercentileTable {
    /// Build a table; rows are sorted by ascending key
    pub fn new(rows: Vec<TableRow>) -> Self {
        let mut rows = rows;
        rows.sort_by(|a, b| a.key.total_cmp(&b.key));
        for row in rows.iter().filter(|r| !r.is_non_decreasing()) {
            warn!(key = row.key, "Percentile row is not non-decreasing");
        }
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    /// Row whose key is closest to `key`; ties go to the smaller key
    pub fn nearest_row(&self, key: f64) -> Result<&TableRow, TableError> {
        self.nearest_index(key).map(|i| &self.rows[i])
    }

    /// Index of [`nearest_row`](Self::nearest_row) within the sorted rows
    pub fn nearest_index(&self, key: f64) -> Result<usize, TableError> {
        let mut best: Option<(usize, f64)> = None;
        for (i, row) in self.rows.iter().enumerate() {
            let distance = (row.key - key).abs();
            match best {
                Some((_, d)) if distance >= d => {}
                _ => best = Some((i, distance)),
            }
        }
        best.map(|(i, _)| i).ok_or(TableError::EmptyTable)
    }

    /// Row with exactly this key, if present
    pub fn exact_row(&self, key: f64) -> Option<&TableRow> {
        self.rows.iter().find(|r| r.key == key)
    }

    /// Mean of the rows either side of `index` (clamped at the table edges)
    pub fn neighbor_average(&self, index: usize) -> Result<TableRow, TableError> {
        if self.rows.is_empty() {
            return Err(TableError::EmptyTable);
        }
        let last = self.rows.len() - 1;
        let prev = &self.rows[index.saturating_sub(1).min(last)];
        let next = &self.rows[(index + 1).min(last)];
        Ok(prev.averaged(next))
    }

    pub fn value_at(&self, row: &TableRow, percentile: f64) -> Option<f64> {
        row.value_at(percentile)
    }

    pub fn percentile_at(&self, row: &TableRow, value: f64) -> Option<f64> {
        row.percentile_at(value)
    }

    /// Load a table from a CSV file
    pub fn from_csv_path(path: &Path) -> Result<Self, TableError> {
        let content = std::fs::read_to_string(path)?;
        let table = Self::from_csv_str(&content)?;
        debug!(path = %path.display(), rows = table.len(), "Loaded percentile table");
        Ok(table)
    }

    /// Parse CSV text: a header `key,<p1>,<p2>,...` followed by numeric rows
    ///
    /// Blank lines are skipped. A header without data rows yields an empty
    /// table, which lookups report as [`TableError::EmptyTable`].
    pub fn from_csv_str(content: &str) -> Result<Self, TableError> {
        let mut lines = content
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty());

        let (_, header) = match lines.next() {
            Some(h) => h,
            None => return Ok(Self::default()),
        };

        let percentiles = header
            .split(',')
            .skip(1)
            .map(|cell| parse_cell(cell, 1))
            .collect::<Result<Vec<f64>, TableError>>()?;

        let mut rows = Vec::new();
        for (index, line) in lines {
            let line_no = index + 1;
            let cells = line
                .split(',')
                .map(|cell| parse_cell(cell, line_no))
                .collect::<Result<Vec<f64>, TableError>>()?;

            if cells.len() != percentiles.len() + 1 {
                return Err(TableError::Parse {
                    line: line_no,
                    message: format!(
                        "expected {} cells, found {}",
                        percentiles.len() + 1,
                        cells.len()
                    ),
                });
            }

            let key = cells[0];
            let values = percentiles.iter().copied().zip(cells[1..].iter().copied());
            rows.push(TableRow::new(key, values.collect()));
        }

        Ok(Self::new(rows))
    }
}

fn parse_cell(cell: &str, line: usize) -> Result<f64, TableError> {
    let trimmed = cell.trim().trim_matches('"');
    trimmed.parse::<f64>().map_err(|_| TableError::Parse {
        line,
        message: format!("not a number: {:?}", trimmed),
    })
}
