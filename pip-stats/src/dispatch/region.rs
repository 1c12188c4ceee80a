//! Regional load spreading for scrape-triggering calls
//!
//! The region is a pure function of the current time and a fixed pool:
//! hours since a fixed epoch, modulo the pool size. Consecutive hours walk
//! the pool round-robin.

use chrono::{DateTime, Utc};
use pip_common::time::hours_since;

/// Region for the hour bucket containing `now`; `None` for an empty pool
pub fn select_region<'a>(
    now: DateTime<Utc>,
    epoch: DateTime<Utc>,
    regions: &'a [String],
) -> Option<&'a str> {
    if regions.is_empty() {
        return None;
    }
    let bucket = hours_since(epoch, now);
    let index = (bucket % regions.len() as u64) as usize;
    Some(regions[index].as_str())
}

/// Substitute `{region}` in an endpoint template
pub fn region_endpoint(template: &str, region: Option<&str>) -> String {
    match region {
        Some(region) => template.replace("{region}", region),
        None => template.to_string(),
    }
}
