//! Document size ceiling
//!
//! The document store rejects payloads above a fixed serialized size. Large
//! records are shortened deterministically before writing instead of failing
//! the write.

use pip_common::models::{AuthorAggregate, RawAuthor};
use pip_common::Result;
use serde::Serialize;
use tracing::warn;

/// Serialized JSON size in bytes
pub fn serialized_size<T: Serialize>(value: &T) -> Result<usize> {
    Ok(serde_json::to_vec(value)?.len())
}

/// Shrink a raw author record until it fits under `ceiling` bytes
///
/// The coauthor list goes first, then the publication list is halved
/// repeatedly. Returns whether anything was dropped.
pub fn fit_raw_author(author: &mut RawAuthor, ceiling: usize) -> Result<bool> {
    let original_size = serialized_size(author)?;
    if original_size <= ceiling {
        return Ok(false);
    }

    let original_publications = author.publications.len();
    author.coauthors.clear();

    while serialized_size(author)? > ceiling && !author.publications.is_empty() {
        let keep = author.publications.len() / 2;
        author.publications.truncate(keep);
    }

    warn!(
        author_id = %author.scholar_id,
        original_size,
        original_publications,
        kept_publications = author.publications.len(),
        "Raw author record truncated to fit document ceiling"
    );
    Ok(true)
}

/// Shrink an author aggregate until it fits under `ceiling` bytes
///
/// Publications are ordered best-first, so halving keeps the top-scored
/// papers. `total_publications` keeps the full count and `truncated` is set.
pub fn fit_aggregate(aggregate: &mut AuthorAggregate, ceiling: usize) -> Result<bool> {
    let original_size = serialized_size(aggregate)?;
    if original_size <= ceiling {
        return Ok(false);
    }

    aggregate.truncated = true;
    while serialized_size(aggregate)? > ceiling && !aggregate.publications.is_empty() {
        let keep = aggregate.publications.len() / 2;
        aggregate.publications.truncate(keep);
    }

    warn!(
        author_id = %aggregate.author_id,
        original_size,
        kept_publications = aggregate.publications.len(),
        "Author aggregate truncated to fit document ceiling"
    );
    Ok(true)
}
