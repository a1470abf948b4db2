//! Stateless query/aggregation functions over the full record set.
//!
//! Callers fetch records fresh from the store for every invocation; nothing
//! here caches or mutates.

use chrono::{DateTime, Local, LocalResult, NaiveDate, TimeZone};

use crate::records::SubmissionRecord;

/// Last 10 submissions by `identity` (exact trimmed match, case-sensitive),
/// in store order.
pub fn history(records: &[SubmissionRecord], identity: &str) -> Vec<SubmissionRecord> {
    let matches: Vec<&SubmissionRecord> = records
        .iter()
        .filter(|r| r.requester.trim() == identity)
        .collect();
    last_n(&matches, 10)
}

/// Last 10 records whose brand contains `needle`, case-insensitively, in
/// store order.
pub fn search_brand(records: &[SubmissionRecord], needle: &str) -> Vec<SubmissionRecord> {
    let needle = needle.trim().to_lowercase();
    let matches: Vec<&SubmissionRecord> = records
        .iter()
        .filter(|r| r.brand_name.to_lowercase().contains(&needle))
        .collect();
    last_n(&matches, 10)
}

/// Records whose timestamp's date component falls in `[start, end]`, both
/// ends inclusive. Rows with unparsable timestamps are skipped.
pub fn filter_by_date_range(
    records: &[SubmissionRecord],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<SubmissionRecord> {
    records
        .iter()
        .filter(|r| {
            r.parsed_timestamp()
                .map(|ts| {
                    let date = ts.date();
                    start <= date && date <= end
                })
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// All records by `identity` (exact trimmed match), no limit.
pub fn filter_by_requester(records: &[SubmissionRecord], identity: &str) -> Vec<SubmissionRecord> {
    records
        .iter()
        .filter(|r| r.requester.trim() == identity)
        .cloned()
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerStats {
    pub total: usize,
    pub last_7_days: usize,
    pub last_30_days: usize,
    /// Top 5 brands by count; ties keep first-appearance order.
    pub top_brands: Vec<(String, usize)>,
}

/// Aggregate view for the manager report.
///
/// The 7-day and 30-day windows are cumulative, computed from the same
/// timezone-aware parse: a 3-day-old record counts toward both.
pub fn manager_stats(records: &[SubmissionRecord], now: DateTime<Local>) -> ManagerStats {
    let mut last_7_days = 0;
    let mut last_30_days = 0;
    let mut brand_counts: Vec<(String, usize)> = Vec::new();

    for record in records {
        let brand = record.brand_name.trim();
        let key = if brand.is_empty() { "Unknown" } else { brand };
        match brand_counts.iter_mut().find(|(name, _)| name == key) {
            Some((_, count)) => *count += 1,
            None => brand_counts.push((key.to_string(), 1)),
        }

        let Some(naive) = record.parsed_timestamp() else {
            continue;
        };
        let local = match Local.from_local_datetime(&naive) {
            LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => t,
            LocalResult::None => continue,
        };

        let age_days = now.signed_duration_since(local).num_days();
        if age_days <= 7 {
            last_7_days += 1;
        }
        if age_days <= 30 {
            last_30_days += 1;
        }
    }

    // Stable sort: equal counts keep first-appearance order.
    brand_counts.sort_by(|a, b| b.1.cmp(&a.1));
    brand_counts.truncate(5);

    ManagerStats {
        total: records.len(),
        last_7_days,
        last_30_days,
        top_brands: brand_counts,
    }
}

fn last_n(matches: &[&SubmissionRecord], n: usize) -> Vec<SubmissionRecord> {
    matches[matches.len().saturating_sub(n)..]
        .iter()
        .map(|r| (*r).clone())
        .collect()
}
