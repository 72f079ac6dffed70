//! Station records and the geographic rectangle used to filter them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimal station metadata cached from a station-service response, enough
/// to reconcile a route's coverage against the concrete stations it serves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl Station {
    pub fn new(
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        Station {
            name: name.into(),
            latitude,
            longitude,
            start,
            end,
        }
    }
}

/// A geographic bounding box used to restrict query results to stations
/// falling within it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoRectangle {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl GeoRectangle {
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        GeoRectangle {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    /// The whole globe: `(-90, 90, -180, 180)`.
    pub fn whole_world() -> Self {
        GeoRectangle::new(-90.0, 90.0, -180.0, 180.0)
    }

    /// Inclusive on all sides.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.min_lat <= lat && lat <= self.max_lat && self.min_lon <= lon && lon <= self.max_lon
    }
}
