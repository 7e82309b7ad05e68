//! Repository statistics

use super::timestamp::TimestampGuard;
use crate::model::RecordEnvelope;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate counts over a repository's records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryStats {
    pub total_records: usize,
    /// Records whose timestamp passed the guard
    #[serde(default)]
    pub dated_records: usize,
    /// Records since the start of the current UTC day
    pub records_today: usize,
    /// Records within the last seven days
    pub records_this_week: usize,
    /// Collections holding at least one record
    pub active_collections: usize,
    pub collection_counts: BTreeMap<String, usize>,
    pub last_updated: DateTime<Utc>,
}

impl RepositoryStats {
    /// Stats for a repository with no records
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            total_records: 0,
            dated_records: 0,
            records_today: 0,
            records_this_week: 0,
            active_collections: 0,
            collection_counts: BTreeMap::new(),
            last_updated: now,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_records == 0
    }

    /// Compute stats from every collection's records.
    ///
    /// Only records accepted by `guard` count towards the time windows.
    pub fn compute<'a, I>(collections: I, guard: &TimestampGuard, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [RecordEnvelope])>,
    {
        let start_of_day = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc())
            .unwrap_or(now);
        let week_ago = now - Duration::days(7);

        let mut stats = Self::empty(now);
        for (name, records) in collections {
            *stats.collection_counts.entry(name.to_string()).or_insert(0) += records.len();
            stats.total_records += records.len();

            for ts in records.iter().map(|r| r.indexed_at) {
                if !guard.accepts(ts, now) {
                    continue;
                }
                stats.dated_records += 1;
                if let Some(ts) = ts {
                    if ts >= start_of_day {
                        stats.records_today += 1;
                    }
                    if ts >= week_ago {
                        stats.records_this_week += 1;
                    }
                }
            }
        }
        stats.active_collections = stats.collection_counts.values().filter(|&&n| n > 0).count();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawRecord;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(ts: DateTime<Utc>) -> RecordEnvelope {
        RecordEnvelope::from_raw(
            RawRecord {
                uri: "at://did:plc:a/c/1".to_string(),
                cid: String::new(),
                value: json!({"createdAt": ts.to_rfc3339()}),
                indexed_at: None,
            },
            "c",
        )
    }

    fn undated() -> RecordEnvelope {
        RecordEnvelope::from_raw(
            RawRecord {
                uri: "at://did:plc:a/c/2".to_string(),
                cid: String::new(),
                value: json!({}),
                indexed_at: None,
            },
            "c",
        )
    }

    #[test]
    fn test_windows() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
        let posts = vec![
            at(now - Duration::hours(2)),   // today
            at(now - Duration::hours(13)),  // yesterday, this week
            at(now - Duration::days(6)),    // this week
            at(now - Duration::days(30)),   // older
            at(now),                        // stamped now: allowed for stats
            undated(),
        ];
        let likes: Vec<RecordEnvelope> = Vec::new();
        let guard = TimestampGuard::default().allowing_now();

        let stats = RepositoryStats::compute(
            [
                ("app.bsky.feed.post", posts.as_slice()),
                ("app.bsky.feed.like", likes.as_slice()),
            ],
            &guard,
            now,
        );

        assert_eq!(stats.total_records, 6);
        assert_eq!(stats.dated_records, 5);
        assert_eq!(stats.records_today, 2);
        assert_eq!(stats.records_this_week, 4);
        assert_eq!(stats.active_collections, 1);
        assert_eq!(stats.collection_counts["app.bsky.feed.like"], 0);
        assert_eq!(stats.last_updated, now);
    }

    #[test]
    fn test_empty() {
        let now = Utc::now();
        let stats = RepositoryStats::compute(std::iter::empty(), &TimestampGuard::default(), now);
        assert!(stats.is_empty());
        assert_eq!(stats, RepositoryStats::empty(now));
    }

    #[test]
    fn test_deserializes_without_dated_records() {
        let json = r#"{
            "totalRecords": 10,
            "recordsToday": 1,
            "recordsThisWeek": 3,
            "activeCollections": 2,
            "collectionCounts": {"app.bsky.feed.post": 10},
            "lastUpdated": "2025-01-01T00:00:00.000Z"
        }"#;
        let stats: RepositoryStats = serde_json::from_str(json).unwrap();
        assert_eq!(stats.total_records, 10);
        assert_eq!(stats.dated_records, 0);
    }
}
