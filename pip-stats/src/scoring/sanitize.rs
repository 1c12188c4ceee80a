//! Raw publication records to scorable publications

use pip_common::config::ScoringConfig;
use pip_common::models::{Publication, RawPublication};
use tracing::debug;

/// Keep publications with a usable year and derive their age
///
/// Records without a year, or dated before `min_publication_year`, are
/// dropped. Missing citation counts already read as 0.
pub fn sanitize_publications(
    raw: &[RawPublication],
    current_year: i32,
    config: &ScoringConfig,
) -> Vec<Publication> {
    let publications: Vec<Publication> = raw
        .iter()
        .filter_map(|r| {
            let year = r.pub_year?;
            if year < config.min_publication_year {
                return None;
            }
            Some(Publication::new(
                r.author_pub_id.clone(),
                r.title.clone(),
                r.num_citations,
                year,
                current_year,
                config.max_age,
            ))
        })
        .collect();

    if publications.len() < raw.len() {
        debug!(
            kept = publications.len(),
            skipped = raw.len() - publications.len(),
            "Skipped publications without a usable year"
        );
    }
    publications
}
