//! Time windows and the liberal ISO-8601 parser used throughout ingest.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RoutingCoreError;

/// A time window with optional bounds; an absent bound is unbounded on that
/// side (`None` start = -∞, `None` end = +∞).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    /// Construct a window, rejecting `start > end` when both are present.
    pub fn new(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Self, RoutingCoreError> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(RoutingCoreError::RoutingError(format!(
                    "start greater than end: {s} > {e}"
                )));
            }
        }
        Ok(TimeWindow { start, end })
    }

    pub fn unbounded() -> Self {
        TimeWindow {
            start: None,
            end: None,
        }
    }

    /// True if `other` lies entirely within `self`.
    pub fn contains(&self, other: &TimeWindow) -> bool {
        let lower_ok = match self.start {
            None => true,
            Some(s) => matches!(other.start, Some(o) if o >= s),
        };
        let upper_ok = match self.end {
            None => true,
            Some(e) => matches!(other.end, Some(o) if o <= e),
        };
        lower_ok && upper_ok
    }

    /// True if the two windows share any instant, treating absent bounds as
    /// ±∞. Reflexive and symmetric.
    pub fn overlap(&self, other: &TimeWindow) -> bool {
        let self_starts_before_other_ends = match (self.start, other.end) {
            (Some(s), Some(e)) => s <= e,
            _ => true,
        };
        let other_starts_before_self_ends = match (other.start, self.end) {
            (Some(s), Some(e)) => s <= e,
            _ => true,
        };
        self_starts_before_other_ends && other_starts_before_self_ends
    }

    /// Intersect with `other`. Fails if the result would be an empty window
    /// (`start >= end` with both present). Commutative and associative.
    pub fn intersection(&self, other: &TimeWindow) -> Result<TimeWindow, RoutingCoreError> {
        let start = match (self.start, other.start) {
            (None, None) => None,
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (Some(a), Some(b)) => Some(a.max(b)),
        };
        let end = match (self.end, other.end) {
            (None, None) => None,
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (Some(a), Some(b)) => Some(a.min(b)),
        };
        if let (Some(s), Some(e)) = (start, end) {
            if s >= e {
                return Err(RoutingCoreError::RoutingError(
                    "intersection is empty".to_string(),
                ));
            }
        }
        Ok(TimeWindow { start, end })
    }

    /// Subtract `other` from `self`, returning 0-2 disjoint remaining
    /// windows. `self.difference(&self) == []`.
    pub fn difference(&self, other: &TimeWindow) -> Vec<TimeWindow> {
        let mut result = Vec::with_capacity(2);

        if let Some(other_start) = other.start {
            let keep_left = match self.start {
                None => true,
                Some(s) => s < other_start,
            };
            if keep_left {
                result.push(TimeWindow {
                    start: self.start,
                    end: Some(other_start),
                });
            }
        }

        if let Some(other_end) = other.end {
            let keep_right = match self.end {
                None => true,
                Some(e) => e > other_end,
            };
            if keep_right {
                result.push(TimeWindow {
                    start: Some(other_end),
                    end: self.end,
                });
            }
        }

        result
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self
            .start
            .map(|d| d.to_rfc3339())
            .unwrap_or_else(|| "-inf".to_string());
        let e = self
            .end
            .map(|d| d.to_rfc3339())
            .unwrap_or_else(|| "+inf".to_string());
        write!(f, "[{s}, {e}]")
    }
}

/// Parse an ISO-8601-ish instant the way the upstream routing documents
/// encode them: replace `-`, `T`, `:`, `.` with spaces, drop `Z`, split on
/// whitespace, and build a date-time from the integer fields in order
/// (year, month, day, hour, minute, second, microsecond). Empty input or
/// anything that fails to parse as all-integers yields `None` (absent),
/// matching ingest's "unparseable ⇒ treat as absent" rule.
pub fn parse_iso_lenient(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }

    let cleaned = raw.replace(['-', 'T', ':', '.'], " ").replace('Z', "");
    let parts: Result<Vec<i64>, _> = cleaned.split_whitespace().map(str::parse::<i64>).collect();
    let parts = parts.ok()?;
    if parts.len() < 3 {
        return None;
    }

    let year = parts[0] as i32;
    let month = parts[1] as u32;
    let day = parts[2] as u32;
    let hour = *parts.get(3).unwrap_or(&0) as u32;
    let minute = *parts.get(4).unwrap_or(&0) as u32;
    let second = *parts.get(5).unwrap_or(&0) as u32;
    let micro = *parts.get(6).unwrap_or(&0) as u32;

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::from_hms_micro_opt(hour, minute, second, micro)?;
    Some(Utc.from_utc_datetime(&NaiveDateTime::new(date, time)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dt(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn overlap_reflexive_and_symmetric() {
        let a = TimeWindow::new(Some(dt(2011, 1, 1)), Some(dt(2014, 1, 1))).unwrap();
        let b = TimeWindow::new(Some(dt(2012, 1, 1)), Some(dt(2013, 1, 1))).unwrap();
        assert!(a.overlap(&a));
        assert!(a.overlap(&b));
        assert!(b.overlap(&a));

        let c = TimeWindow::new(Some(dt(2011, 1, 1)), Some(dt(2012, 1, 1))).unwrap();
        let d = TimeWindow::new(Some(dt(2013, 1, 1)), Some(dt(2014, 1, 1))).unwrap();
        assert!(!c.overlap(&d));
    }

    #[test]
    fn unbounded_overlaps_everything() {
        let unbounded = TimeWindow::unbounded();
        let bounded = TimeWindow::new(Some(dt(1993, 1, 1)), None).unwrap();
        assert!(unbounded.overlap(&bounded));
        assert!(bounded.overlap(&unbounded));
    }

    #[test]
    fn intersection_commutative_and_associative() {
        let a = TimeWindow::new(Some(dt(2010, 1, 1)), Some(dt(2020, 1, 1))).unwrap();
        let b = TimeWindow::new(Some(dt(2015, 1, 1)), None).unwrap();
        let c = TimeWindow::new(None, Some(dt(2018, 1, 1))).unwrap();

        let ab = a.intersection(&b).unwrap();
        let ba = b.intersection(&a).unwrap();
        assert_eq!(ab, ba);

        let ab_c = ab.intersection(&c).unwrap();
        let bc = b.intersection(&c).unwrap();
        let a_bc = a.intersection(&bc).unwrap();
        assert_eq!(ab_c, a_bc);
    }

    #[test]
    fn difference_with_self_is_empty() {
        let a = TimeWindow::new(Some(dt(2010, 1, 1)), Some(dt(2020, 1, 1))).unwrap();
        assert!(a.difference(&a).is_empty());
    }

    #[test]
    fn difference_clips_both_sides() {
        let whole = TimeWindow::new(Some(dt(2010, 1, 1)), Some(dt(2020, 1, 1))).unwrap();
        let middle = TimeWindow::new(Some(dt(2012, 1, 1)), Some(dt(2015, 1, 1))).unwrap();
        let gaps = whole.difference(&middle);
        assert_eq!(gaps.len(), 2);
        assert_eq!(gaps[0].end, Some(dt(2012, 1, 1)));
        assert_eq!(gaps[1].start, Some(dt(2015, 1, 1)));
    }

    #[test]
    fn parse_iso_lenient_handles_typical_forms() {
        let d = parse_iso_lenient("2020-01-01T00:00:00Z").unwrap();
        assert_eq!(d, dt(2020, 1, 1));
        assert!(parse_iso_lenient("").is_none());
        assert!(parse_iso_lenient("not-a-date").is_none());
    }
}
