//! Route records: a service endpoint valid for a time window at a priority.

use serde::{Deserialize, Serialize};

use crate::timewindow::TimeWindow;

/// Default priority assigned to a route when the XML attribute is missing
/// or empty.
pub const DEFAULT_PRIORITY: i32 = 99;

/// A single data-centre endpoint offering a service for some stream pattern.
///
/// Kept as a plain value type per the re-architecture note: no custom
/// ordering operators live on `Route` itself. Priority comparisons are an
/// explicit sort key at call sites (see `crate::query`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub service: String,
    pub address: String,
    pub tw: TimeWindow,
    pub priority: i32,
}

impl Route {
    pub fn new(
        service: impl Into<String>,
        address: impl Into<String>,
        tw: TimeWindow,
        priority: i32,
    ) -> Self {
        Route {
            service: service.into(),
            address: address.into(),
            tw,
            priority,
        }
    }

    /// Two routes overlap iff their services and priorities are equal AND
    /// their time windows overlap. This is the error condition surfaced by
    /// ingest when overlaps are disallowed.
    pub fn overlap(&self, other: &Route) -> bool {
        self.service == other.service
            && self.priority == other.priority
            && self.tw.overlap(&other.tw)
    }

    /// The authority (host[:port]) portion of `address`, used as the
    /// station-cache index key.
    pub fn endpoint_host(&self) -> Option<String> {
        url::Url::parse(&self.address)
            .ok()
            .and_then(|u| u.host_str().map(|h| match u.port() {
                Some(p) => format!("{h}:{p}"),
                None => h.to_string(),
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tw(start: i32, end: i32) -> TimeWindow {
        use chrono::TimeZone;
        TimeWindow::new(
            Some(chrono::Utc.with_ymd_and_hms(start, 1, 1, 0, 0, 0).unwrap()),
            Some(chrono::Utc.with_ymd_and_hms(end, 1, 1, 0, 0, 0).unwrap()),
        )
        .unwrap()
    }

    #[test]
    fn overlap_requires_equal_service_and_priority() {
        let a = Route::new("dataselect", "http://a/", tw(2010, 2020), 1);
        let b = Route::new("dataselect", "http://b/", tw(2015, 2025), 1);
        let c = Route::new("dataselect", "http://b/", tw(2015, 2025), 2);
        let d = Route::new("station", "http://b/", tw(2015, 2025), 1);
        assert!(a.overlap(&b));
        assert!(!a.overlap(&c));
        assert!(!a.overlap(&d));
    }

    #[test]
    fn endpoint_host_extracts_authority() {
        let r = Route::new(
            "dataselect",
            "http://geofon.gfz-potsdam.de/fdsnws/dataselect/1/",
            tw(2010, 2020),
            1,
        );
        assert_eq!(r.endpoint_host().as_deref(), Some("geofon.gfz-potsdam.de"));
    }
}
