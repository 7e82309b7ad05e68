//! Timestamp plausibility guard

use crate::config::TimestampGuardConfig;
use chrono::{DateTime, Duration, Utc};

/// Filters out records whose timestamps are missing or implausible.
///
/// Some upstream records carry the fetch time in place of an unset
/// timestamp; a timestamp within one second of `now` is treated as that
/// sentinel.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampGuard {
    reject_missing: bool,
    reject_now: bool,
    reject_future: bool,
    max_age: Option<Duration>,
}

const NOW_TOLERANCE_MS: i64 = 1_000;

impl Default for TimestampGuard {
    fn default() -> Self {
        Self::from_config(&TimestampGuardConfig::default())
    }
}

impl TimestampGuard {
    pub fn from_config(config: &TimestampGuardConfig) -> Self {
        Self {
            reject_missing: config.reject_missing,
            reject_now: config.reject_now,
            reject_future: config.reject_future,
            max_age: config.max_age_days.map(|d| Duration::days(i64::from(d))),
        }
    }

    /// Guard accepting every record, dated or not
    pub fn permissive() -> Self {
        Self {
            reject_missing: false,
            reject_now: false,
            reject_future: false,
            max_age: None,
        }
    }

    /// Same rules, except a timestamp equal to `now` is accepted
    pub fn allowing_now(&self) -> Self {
        Self {
            reject_now: false,
            ..self.clone()
        }
    }

    pub fn accepts(&self, timestamp: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let Some(ts) = timestamp else {
            return !self.reject_missing;
        };

        let offset_ms = (ts - now).num_milliseconds();
        if self.reject_now && offset_ms.abs() < NOW_TOLERANCE_MS {
            return false;
        }
        if self.reject_future && offset_ms > 0 {
            return false;
        }
        match self.max_age {
            Some(max_age) => now - ts <= max_age,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_default_rules() {
        let guard = TimestampGuard::default();
        let now = now();
        assert!(!guard.accepts(None, now));
        assert!(!guard.accepts(Some(now), now));
        assert!(!guard.accepts(Some(now + Duration::minutes(5)), now));
        assert!(!guard.accepts(Some(now - Duration::days(400)), now));
        assert!(guard.accepts(Some(now - Duration::hours(1)), now));
        assert!(guard.accepts(Some(now - Duration::days(364)), now));
    }

    #[test]
    fn test_now_tolerance() {
        let guard = TimestampGuard::default();
        let now = now();
        assert!(!guard.accepts(Some(now - Duration::milliseconds(300)), now));
        assert!(guard.accepts(Some(now - Duration::milliseconds(1500)), now));
    }

    #[test]
    fn test_allowing_now() {
        let guard = TimestampGuard::default().allowing_now();
        let now = now();
        assert!(guard.accepts(Some(now), now));
        assert!(guard.accepts(Some(now - Duration::milliseconds(10)), now));
        assert!(!guard.accepts(Some(now + Duration::milliseconds(10)), now));
        assert!(!guard.accepts(None, now));
    }

    #[test]
    fn test_configurable() {
        let guard = TimestampGuard::from_config(&TimestampGuardConfig {
            reject_missing: false,
            reject_now: false,
            reject_future: true,
            max_age_days: None,
        });
        let now = now();
        assert!(guard.accepts(None, now));
        assert!(guard.accepts(Some(now - Duration::days(3650)), now));
        assert!(TimestampGuard::permissive().accepts(Some(now + Duration::days(1)), now));
    }
}
