//! Domain models shared by the scoring and refresh pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Document store collection holding raw author records
pub const RAW_AUTHOR_COLLECTION: &str = "scholar_raw_author";

/// Document store collection holding raw publication records
pub const RAW_PUBLICATION_COLLECTION: &str = "scholar_raw_pub";

/// Document store collection holding derived author aggregates
pub const AUTHOR_STATS_COLLECTION: &str = "author_stats";

/// Document store collection holding derived per-publication statistics
pub const PUBLICATION_STATS_COLLECTION: &str = "pub_stats";

/// A publication ready for scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub publication_id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub citation_count: u64,
    pub publication_year: i32,
    /// `current_year - publication_year + 1`, clamped to `1..=max_age`
    pub age: u32,
}

impl Publication {
    pub fn new(
        publication_id: impl Into<String>,
        title: Option<String>,
        citation_count: u64,
        publication_year: i32,
        current_year: i32,
        max_age: u32,
    ) -> Self {
        Self {
            publication_id: publication_id.into(),
            title,
            citation_count,
            publication_year,
            age: publication_age(publication_year, current_year, max_age),
        }
    }
}

/// Age of a paper in years, counting the publication year as year one
pub fn publication_age(publication_year: i32, current_year: i32, max_age: u32) -> u32 {
    let raw = i64::from(current_year) - i64::from(publication_year) + 1;
    raw.clamp(1, i64::from(max_age.max(1))) as u32
}

/// A publication with its derived percentile values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPublication {
    #[serde(flatten)]
    pub publication: Publication,
    /// Citation percentile among same-age papers, 0..=100
    pub percentile_score: f64,
    /// 1-based rank by `percentile_score` descending, ties by first-seen order
    pub rank: usize,
    /// Paper-count percentile of `rank` among same-tenure authors, 0..=100
    pub productivity_percentile: f64,
}

/// Derived statistics for one author, as cached in [`AUTHOR_STATS_COLLECTION`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorAggregate {
    pub author_id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Ordered by `percentile_score` descending
    pub publications: Vec<ScoredPublication>,
    pub total_publications: usize,
    pub pip_auc: f64,
    pub pip_auc_percentile: f64,
    pub first_year_active: Option<i32>,
    pub years_active: u32,
    /// Set when the publication list was shortened to fit the document ceiling
    #[serde(default)]
    pub truncated: bool,
}

impl AuthorAggregate {
    /// An empty-but-valid aggregate used for degraded responses
    pub fn empty(author_id: impl Into<String>) -> Self {
        Self {
            author_id: author_id.into(),
            name: None,
            publications: Vec::new(),
            total_publications: 0,
            pip_auc: 0.0,
            pip_auc_percentile: 0.0,
            first_year_active: None,
            years_active: 0,
            truncated: false,
        }
    }
}

/// One publication's standing within its author's work, as cached in
/// [`PUBLICATION_STATS_COLLECTION`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicationStats {
    pub author_id: String,
    #[serde(flatten)]
    pub scored: ScoredPublication,
    /// Number of the author's publications `rank` is taken among
    pub author_publications: usize,
}

/// One calendar year of an author's output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyStats {
    pub year: i32,
    pub citations: u64,
    pub publications: usize,
    /// Mean citation percentile of the year's papers
    pub mean_score: f64,
}

/// An author's output year by year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalStats {
    pub author_id: String,
    /// Ascending by year; years without papers are absent
    pub years: Vec<YearlyStats>,
    pub best_year: Option<i32>,
}

/// A document as held by the document store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub collection: String,
    pub document_id: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// A unit of asynchronous refresh work
///
/// Not persisted locally beyond the queue backend; `name` is a pure function
/// of queue and entity id so re-submission collapses onto one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshTask {
    pub queue: String,
    pub name: String,
    pub target_url: String,
    pub payload: serde_json::Value,
}

/// Raw author record as written by the source provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAuthor {
    pub scholar_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub affiliation: Option<String>,
    #[serde(default)]
    pub citedby: u64,
    #[serde(default)]
    pub publications: Vec<PublicationStub>,
    #[serde(default)]
    pub coauthors: Vec<CoauthorRef>,
}

/// Abbreviated publication entry carried inside a raw author record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublicationStub {
    /// `"<author_id>:<pub_id>"`
    pub author_pub_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_year")]
    pub pub_year: Option<i32>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub num_citations: u64,
}

/// Raw (filled) publication record as written by the source provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPublication {
    pub author_pub_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_year")]
    pub pub_year: Option<i32>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub num_citations: u64,
}

impl From<&PublicationStub> for RawPublication {
    fn from(stub: &PublicationStub) -> Self {
        Self {
            author_pub_id: stub.author_pub_id.clone(),
            title: stub.title.clone(),
            pub_year: stub.pub_year,
            num_citations: stub.num_citations,
        }
    }
}

/// Coauthor reference inside a raw author record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoauthorRef {
    pub scholar_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Years arrive as numbers or strings ("2019"); anything unparseable is absent
fn lenient_year<'de, D>(deserializer: D) -> std::result::Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Counts arrive as numbers or strings; anything unparseable reads as 0
fn lenient_count<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_publication_age_counts_publication_year() {
        assert_eq!(publication_age(2024, 2024, 40), 1);
        assert_eq!(publication_age(2020, 2024, 40), 5);
    }

    #[test]
    fn test_publication_age_clamped() {
        assert_eq!(publication_age(1900, 2024, 40), 40);
        // Future-dated papers never go below one
        assert_eq!(publication_age(2030, 2024, 40), 1);
    }

    #[test]
    fn test_raw_publication_lenient_fields() {
        let raw: RawPublication = serde_json::from_value(json!({
            "author_pub_id": "abc:123",
            "pub_year": "2019",
            "num_citations": "17"
        }))
        .unwrap();
        assert_eq!(raw.pub_year, Some(2019));
        assert_eq!(raw.num_citations, 17);

        let raw: RawPublication = serde_json::from_value(json!({
            "author_pub_id": "abc:124",
            "pub_year": null
        }))
        .unwrap();
        assert_eq!(raw.pub_year, None);
        assert_eq!(raw.num_citations, 0);
    }

    #[test]
    fn test_scored_publication_flattens() {
        let scored = ScoredPublication {
            publication: Publication::new("a:1", None, 10, 2020, 2024, 40),
            percentile_score: 50.0,
            rank: 1,
            productivity_percentile: 30.0,
        };
        let value = serde_json::to_value(&scored).unwrap();
        assert_eq!(value["publication_id"], "a:1");
        assert_eq!(value["age"], 5);
        assert_eq!(value["rank"], 1);
    }
}
