//! Percentile interpolation scoring
//!
//! Turns a paper's (age, citations) pair into a citation percentile, an
//! author's paper rank into a productivity percentile, and the resulting
//! curve into the PiP-AUC aggregate and its own percentile.
//!
//! Lookup failures never escape this module: an empty reference table makes
//! the affected value unavailable (`None`), and aggregate-level callers
//! degrade that to 0.

use pip_common::models::{AuthorAggregate, Publication, ScoredPublication, TemporalStats, YearlyStats};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::table::{PercentileTable, TableRow};

/// Value-to-percentile mapping derived from one table row
///
/// Entries are sorted by ascending value with one entry per distinct value;
/// where several percentile columns share a value the highest column wins.
#[derive(Debug, Clone, PartialEq)]
pub struct InvertedRow {
    entries: Vec<(f64, f64)>,
}

impl InvertedRow {
    pub fn from_row(row: &TableRow) -> Self {
        let mut entries: Vec<(f64, f64)> = Vec::with_capacity(row.cells().len());
        let mut by_value: Vec<(f64, f64)> = row.cells().iter().map(|&(p, v)| (v, p)).collect();
        // Stable sort keeps column order within equal values
        by_value.sort_by(|a, b| a.0.total_cmp(&b.0));

        for (value, percentile) in by_value {
            match entries.last_mut() {
                Some(last) if last.0 == value => last.1 = last.1.max(percentile),
                _ => entries.push((value, percentile)),
            }
        }
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(value, percentile)` pairs by ascending value
    pub fn entries(&self) -> &[(f64, f64)] {
        &self.entries
    }
}

/// Percentile whose value is nearest `number` (ties: smaller value)
pub fn find_closest(inverted: &InvertedRow, number: f64) -> Option<f64> {
    let mut best: Option<(f64, f64)> = None;
    for &(value, percentile) in &inverted.entries {
        let distance = (value - number).abs();
        match best {
            Some((d, _)) if distance >= d => {}
            _ => best = Some((distance, percentile)),
        }
    }
    best.map(|(_, p)| p)
}

/// Round half away from zero to `places` decimals
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Scoring engine over the three reference distributions
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    /// Citation counts keyed by paper age
    citations: PercentileTable,
    /// Paper counts keyed by years since first publication
    productivity: PercentileTable,
    /// PiP-AUC scores across authors (single row)
    pip_auc: PercentileTable,
}

impl ScoringEngine {
    pub fn new(
        citations: PercentileTable,
        productivity: PercentileTable,
        pip_auc: PercentileTable,
    ) -> Self {
        for (name, table) in [
            ("citations", &citations),
            ("productivity", &productivity),
            ("pip_auc", &pip_auc),
        ] {
            if table.is_empty() {
                warn!(table = name, "Reference table is empty; dependent scores are unavailable");
            }
        }
        Self {
            citations,
            productivity,
            pip_auc,
        }
    }

    /// Citation percentile of a paper among papers of the nearest tabulated age
    ///
    /// Piecewise-linear inverse-CDF interpolation within one age row: 0 at or
    /// below the row minimum, 100 at or above the row maximum, the exact column
    /// on a table hit, linear between the bracketing columns otherwise.
    pub fn score_paper(&self, age: f64, citations: f64) -> Option<f64> {
        let row = match self.citations.nearest_row(age) {
            Ok(row) => row,
            Err(e) => {
                debug!(age, error = %e, "Citation percentile unavailable");
                return None;
            }
        };
        interpolate_percentile(row, citations)
    }

    /// Score, rank and order publications by citation percentile
    ///
    /// Scores are rounded to two decimals. Ranks are 1..=N by descending score
    /// with ties resolved by input order; the returned list is in rank order.
    /// `productivity_percentile` is left at 0 (see [`assign_productivity`](Self::assign_productivity)).
    pub fn rank_publications(&self, publications: Vec<Publication>) -> Vec<ScoredPublication> {
        let mut unavailable = 0usize;
        let mut scored: Vec<ScoredPublication> = publications
            .into_iter()
            .map(|publication| {
                let score = self
                    .score_paper(f64::from(publication.age), publication.citation_count as f64)
                    .unwrap_or_else(|| {
                        unavailable += 1;
                        0.0
                    });
                ScoredPublication {
                    publication,
                    percentile_score: round_to(score, 2),
                    rank: 0,
                    productivity_percentile: 0.0,
                }
            })
            .collect();

        if unavailable > 0 {
            warn!(unavailable, "Citation percentiles unavailable; scored as 0");
        }

        // Stable sort: equal scores keep first-seen order
        scored.sort_by(|a, b| descending(a.percentile_score, b.percentile_score));
        for (i, publication) in scored.iter_mut().enumerate() {
            publication.rank = i + 1;
        }
        scored
    }

    /// Inverted paper-count row for an author tenure
    ///
    /// When the tenure has no exact row and the nearest row holds a value
    /// outside [0, 100], the rows either side of it are averaged first.
    pub fn productivity_curve(&self, years_since_first_pub: u32) -> Option<InvertedRow> {
        let key = f64::from(years_since_first_pub);

        if let Some(row) = self.productivity.exact_row(key) {
            return Some(InvertedRow::from_row(row));
        }

        let index = match self.productivity.nearest_index(key) {
            Ok(index) => index,
            Err(e) => {
                debug!(years_since_first_pub, error = %e, "Productivity percentile unavailable");
                return None;
            }
        };
        let nearest = &self.productivity.rows()[index];

        let in_range = nearest
            .cells()
            .iter()
            .all(|&(_, v)| v.is_finite() && (0.0..=100.0).contains(&v));

        if in_range {
            Some(InvertedRow::from_row(nearest))
        } else {
            debug!(
                years_since_first_pub,
                nearest = nearest.key,
                "Nearest productivity row out of range; averaging neighbours"
            );
            self.productivity
                .neighbor_average(index)
                .ok()
                .map(|row| InvertedRow::from_row(&row))
        }
    }

    /// Productivity percentile for a paper rank at a given tenure
    pub fn productivity_percentile(&self, rank: usize, years_since_first_pub: u32) -> Option<f64> {
        let curve = self.productivity_curve(years_since_first_pub)?;
        find_closest(&curve, rank as f64)
    }

    /// Fill `productivity_percentile` for every ranked publication
    pub fn assign_productivity(&self, scored: &mut [ScoredPublication], years_since_first_pub: u32) {
        let curve = self.productivity_curve(years_since_first_pub);
        if curve.is_none() && !scored.is_empty() {
            warn!(years_since_first_pub, "Productivity percentiles unavailable; scored as 0");
        }
        for publication in scored.iter_mut() {
            publication.productivity_percentile = curve
                .as_ref()
                .and_then(|c| find_closest(c, publication.rank as f64))
                .unwrap_or(0.0);
        }
    }

    /// PiP-AUC score in [0, 1] and its percentile among authors
    ///
    /// Fewer than two publications leave the curve undefined; that case is
    /// reported as `(0.0, 0.0)`.
    pub fn pip_auc(&self, scored: &[ScoredPublication]) -> (f64, f64) {
        if scored.len() < 2 {
            return (0.0, 0.0);
        }

        let mut by_score: Vec<(f64, f64)> = scored
            .iter()
            .map(|p| (p.productivity_percentile, p.percentile_score))
            .collect();
        by_score.sort_by(|a, b| descending(a.1, b.1));

        // Keep the highest-scoring paper at each productivity level
        let mut curve: Vec<(f64, f64)> = Vec::with_capacity(by_score.len());
        for point in by_score {
            if !curve.iter().any(|&(x, _)| x == point.0) {
                curve.push(point);
            }
        }
        curve.sort_by(|a, b| a.0.total_cmp(&b.0));

        let area: f64 = curve
            .windows(2)
            .map(|w| (w[1].0 - w[0].0) * (w[0].1 + w[1].1) / 2.0)
            .sum();
        let score = round_to((area / (100.0 * 100.0)).clamp(0.0, 1.0), 4);

        (score, self.pip_auc_percentile(score))
    }

    /// Nearest tabulated percentile for a PiP-AUC score (0 when unavailable)
    pub fn pip_auc_percentile(&self, score: f64) -> f64 {
        self.pip_auc
            .rows()
            .first()
            .map(InvertedRow::from_row)
            .and_then(|curve| find_closest(&curve, score))
            .unwrap_or(0.0)
    }

    /// Full recomputation of an author's aggregate from their publications
    pub fn score_author(
        &self,
        author_id: &str,
        name: Option<String>,
        publications: Vec<Publication>,
        current_year: i32,
    ) -> AuthorAggregate {
        let first_year_active = publications.iter().map(|p| p.publication_year).min();
        let years_active = first_year_active
            .map(|first| (i64::from(current_year) - i64::from(first) + 1).max(1) as u32)
            .unwrap_or(0);

        let total_publications = publications.len();
        let mut ranked = self.rank_publications(publications);
        self.assign_productivity(&mut ranked, years_active);
        let (pip_auc, pip_auc_percentile) = self.pip_auc(&ranked);

        AuthorAggregate {
            author_id: author_id.to_string(),
            name,
            publications: ranked,
            total_publications,
            pip_auc,
            pip_auc_percentile,
            first_year_active,
            years_active,
            truncated: false,
        }
    }

    /// Per-year citations, paper counts and mean citation percentile
    ///
    /// Papers outside `[start_year, end_year]` are left out. A paper whose
    /// percentile is unavailable counts as 0 towards its year's mean.
    pub fn yearly_stats(
        &self,
        publications: &[Publication],
        start_year: Option<i32>,
        end_year: Option<i32>,
    ) -> Vec<YearlyStats> {
        let mut years: BTreeMap<i32, (u64, usize, f64)> = BTreeMap::new();
        for publication in publications {
            let year = publication.publication_year;
            if start_year.is_some_and(|start| year < start) || end_year.is_some_and(|end| year > end) {
                continue;
            }
            let score = self
                .score_paper(f64::from(publication.age), publication.citation_count as f64)
                .unwrap_or(0.0);
            let totals = years.entry(year).or_default();
            totals.0 += publication.citation_count;
            totals.1 += 1;
            totals.2 += score;
        }

        years
            .into_iter()
            .map(|(year, (citations, count, score_sum))| YearlyStats {
                year,
                citations,
                publications: count,
                mean_score: round_to(score_sum / count as f64, 2),
            })
            .collect()
    }

    /// Year-by-year view of an author's publications
    pub fn temporal_stats(
        &self,
        author_id: &str,
        publications: &[Publication],
        start_year: Option<i32>,
        end_year: Option<i32>,
    ) -> TemporalStats {
        let years = self.yearly_stats(publications, start_year, end_year);
        TemporalStats {
            author_id: author_id.to_string(),
            best_year: best_year(&years),
            years,
        }
    }
}

/// Year with the largest combined citations, paper count and mean score
///
/// Each measure is divided by its maximum across years (a zero maximum
/// contributes 0). Ties go to the earliest year.
pub fn best_year(years: &[YearlyStats]) -> Option<i32> {
    let max_citations = years.iter().map(|y| y.citations).max().unwrap_or(0) as f64;
    let max_publications = years.iter().map(|y| y.publications).max().unwrap_or(0) as f64;
    let max_score = years.iter().map(|y| y.mean_score).fold(0.0, f64::max);

    let normalized = |value: f64, max: f64| if max > 0.0 { value / max } else { 0.0 };

    let mut best: Option<(f64, i32)> = None;
    for year in years {
        let combined = normalized(year.citations as f64, max_citations)
            + normalized(year.publications as f64, max_publications)
            + normalized(year.mean_score, max_score);
        if best.map_or(true, |(score, _)| combined > score) {
            best = Some((combined, year.year));
        }
    }
    best.map(|(_, year)| year)
}

/// Piecewise-linear inverse CDF within one row
fn interpolate_percentile(row: &TableRow, value: f64) -> Option<f64> {
    let min = row.min()?;
    let max = row.max()?;

    if value <= min {
        return Some(0.0);
    }
    if value >= max {
        return Some(100.0);
    }

    // First column holding the largest value <= `value`, and first column
    // holding the smallest value >= `value`. Plateaus resolve to their first
    // column so an exact hit never divides by zero.
    let mut below: Option<(f64, f64)> = None;
    let mut above: Option<(f64, f64)> = None;
    for &(p, v) in row.cells() {
        if v <= value && below.map_or(true, |(_, bv)| v > bv) {
            below = Some((p, v));
        }
        if v >= value && above.map_or(true, |(_, av)| v < av) {
            above = Some((p, v));
        }
    }

    let (below_p, below_v) = below?;
    let (above_p, above_v) = above?;

    if below_p == above_p || below_v == above_v {
        return Some(below_p);
    }

    let weight = (value - below_v) / (above_v - below_v);
    Some(below_p + weight * (above_p - below_p))
}

fn descending(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}
