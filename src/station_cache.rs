//! Builds a [`StationCache`] by querying every `station` service endpoint
//! named in a [`RoutingTable`] and indexing the result by endpoint host.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::route::Route;
use crate::station::Station;
use crate::stream::Stream;
use crate::tables::{RoutingTable, StationCache};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const POLITE_DELAY: Duration = Duration::from_secs(1);
const POLITE_HOST_SUBSTRING: &str = "ingv.it";

/// Parse a `format=text` FDSNWS-station response into `Station`s. Lines
/// starting with `#` are comments; other lines are `|`-separated with
/// station code at index 1, latitude at 2, longitude at 3, start at 6, end
/// at 7. Lines that fail to parse are logged and skipped.
fn parse_station_text(body: &str) -> Vec<Station> {
    let mut stations = Vec::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let cols: Vec<&str> = line.split('|').collect();
        if cols.len() < 4 {
            warn!(line, "skipping malformed station line: too few columns");
            continue;
        }
        let name = cols[1].trim();
        let (Ok(latitude), Ok(longitude)) = (cols[2].trim().parse::<f64>(), cols[3].trim().parse::<f64>()) else {
            warn!(line, "skipping malformed station line: bad coordinates");
            continue;
        };
        let start: Option<DateTime<Utc>> = cols
            .get(6)
            .and_then(|c| crate::timewindow::parse_iso_lenient(c.trim()));
        let end: Option<DateTime<Utc>> = cols
            .get(7)
            .and_then(|c| crate::timewindow::parse_iso_lenient(c.trim()));
        stations.push(Station::new(name, latitude, longitude, start, end));
    }
    stations
}

/// Query a single `station` endpoint for `stream`'s coverage under `route`.
/// Network failures degrade to an empty list; nothing here is fatal.
async fn query_station_endpoint(client: &reqwest::Client, stream: &Stream, route: &Route) -> Vec<Station> {
    let Some(host) = route.endpoint_host() else {
        return Vec::new();
    };
    if host.contains(POLITE_HOST_SUBSTRING) {
        tokio::time::sleep(POLITE_DELAY).await;
    }

    let url = format!("{}query", route.address);
    let mut query = vec![
        ("format", "text".to_string()),
        ("net", stream.n.clone()),
        ("sta", stream.s.clone()),
    ];
    if let Some(start) = route.tw.start {
        query.push(("start", start.to_rfc3339()));
    }
    if let Some(end) = route.tw.end {
        query.push(("end", end.to_rfc3339()));
    }

    let response = match client.get(&url).query(&query).timeout(REQUEST_TIMEOUT).send().await {
        Ok(r) => r,
        Err(err) => {
            warn!(%url, error = %err, "station endpoint unreachable, caching empty station list");
            return Vec::new();
        }
    };

    match response.error_for_status() {
        Ok(response) => match response.text().await {
            Ok(body) => parse_station_text(&body),
            Err(err) => {
                warn!(%url, error = %err, "could not read station endpoint response body");
                Vec::new()
            }
        },
        Err(err) => {
            warn!(%url, error = %err, "station endpoint returned an error status");
            Vec::new()
        }
    }
}

/// Build a station cache from every `station`-service route in `table`.
/// Each `(stream, route)` pair is queried exactly once; the resolved station
/// list is then stored under every endpoint host that appears among `st`'s
/// routes across *all* services, so the query engine can look it up by
/// whichever route it is evaluating.
pub async fn build(client: &reqwest::Client, table: &RoutingTable) -> StationCache {
    let mut cache = StationCache::new();

    for (stream, routes) in table.iter() {
        let station_routes: Vec<&Route> = routes.iter().filter(|r| r.service == "station").collect();
        if station_routes.is_empty() {
            continue;
        }

        let mut stations: Vec<Station> = Vec::new();
        for route in &station_routes {
            stations.extend(query_station_endpoint(client, stream, route).await);
        }

        let hosts: HashSet<String> = routes.iter().filter_map(Route::endpoint_host).collect();
        for host in hosts {
            cache.insert(host, stream.clone(), stations.clone());
        }
    }

    cache
}
