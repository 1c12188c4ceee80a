//! Percentile scoring over reference distributions

pub mod engine;
pub mod sanitize;
pub mod table;

pub use engine::{best_year, find_closest, round_to, InvertedRow, ScoringEngine};
pub use sanitize::sanitize_publications;
pub use table::{PercentileTable, TableError, TableRow};
