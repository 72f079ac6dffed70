//! The three map-shaped tables owned by the routing cache: the routing
//! table itself, the virtual-network table, and the station cache.
//!
//! Modelled after the reference codebase's data-store convention (see its
//! `WorkloadStore`/`ServiceStore` pair): a small struct wrapping one or more
//! `HashMap`s with typed accessors, rather than exposing the maps directly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::route::Route;
use crate::station::Station;
use crate::stream::Stream;
use crate::timewindow::TimeWindow;

/// Mapping from stream key (wildcards permitted) to an ordered sequence of
/// routes, sorted ascending by priority. The key set is not uniqued up to
/// overlap: two keys may themselves overlap, and the overlap check at
/// insertion time governs whether that is accepted (see [`RoutingTable::insert`]).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RoutingTable {
    routes: HashMap<Stream, Vec<Route>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Stream> {
        self.routes.keys()
    }

    pub fn get(&self, key: &Stream) -> Option<&[Route]> {
        self.routes.get(key).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Stream, &[Route])> {
        self.routes.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Does any existing key overlap `stream` with a route that overlaps
    /// `route` (same service, same priority, overlapping window)? This is
    /// the check ingest performs before accepting a new row when overlaps
    /// are disallowed.
    pub fn has_conflicting_route(&self, stream: &Stream, route: &Route) -> bool {
        self.routes.iter().any(|(existing_stream, existing_routes)| {
            stream.overlap(existing_stream) && existing_routes.iter().any(|r| r.overlap(route))
        })
    }

    /// Insert a route under `stream`, creating the row if absent. Returns
    /// `false` (and skips the insertion) when `allow_overlaps` is false and
    /// an existing route conflicts, per §4.1.
    pub fn insert(&mut self, stream: Stream, route: Route, allow_overlaps: bool) -> bool {
        if !allow_overlaps && self.has_conflicting_route(&stream, &route) {
            return false;
        }
        self.routes.entry(stream).or_default().push(route);
        true
    }

    /// Sort every row ascending by priority. Called once after a whole
    /// document has been ingested.
    pub fn sort_all(&mut self) {
        for routes in self.routes.values_mut() {
            routes.sort_by_key(|r| r.priority);
        }
    }
}

/// Mapping from virtual-network code to an ordered sequence of
/// `(Stream, TimeWindow)` pairs. In every such `Stream` the network
/// component is the literal `*`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VirtualNetworkTable {
    members: HashMap<String, Vec<(Stream, TimeWindow)>>,
}

impl VirtualNetworkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_virtual(&self, code: &str) -> bool {
        self.members.contains_key(code)
    }

    pub fn members(&self, code: &str) -> Option<&[(Stream, TimeWindow)]> {
        self.members.get(code).map(Vec::as_slice)
    }

    pub fn add(&mut self, code: String, stream: Stream, tw: TimeWindow) {
        self.members.entry(code).or_default().push((stream, tw));
    }

    pub fn codes(&self) -> impl Iterator<Item = &String> {
        self.members.keys()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Mapping from endpoint host to a mapping from stream key (as it appeared
/// in the routing table) to the stations that endpoint serves for that
/// stream. Built once by the station-cache builder (`crate::station_cache`)
/// and consulted read-only by the query engine.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StationCache {
    by_host: HashMap<String, HashMap<Stream, Vec<Station>>>,
}

impl StationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stations_for(&self, host: &str, stream: &Stream) -> &[Station] {
        self.by_host
            .get(host)
            .and_then(|by_stream| by_stream.get(stream))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Store the same resolved station list under `host` for `stream`. The
    /// builder calls this once per (host, stream) pair even when the host
    /// appears for a non-station service, so the query engine can always
    /// consult the cache by whichever route it is evaluating.
    pub fn insert(&mut self, host: String, stream: Stream, stations: Vec<Station>) {
        self.by_host.entry(host).or_default().insert(stream, stations);
    }

    pub fn host_count(&self) -> usize {
        self.by_host.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timewindow::TimeWindow;

    fn route(service: &str, priority: i32) -> Route {
        Route::new(service, "http://example/", TimeWindow::unbounded(), priority)
    }

    #[test]
    fn reject_same_priority_overlap_when_disallowed() {
        let mut table = RoutingTable::new();
        let key = Stream::new("GE", "*", "*", "*");
        assert!(table.insert(key.clone(), route("dataselect", 1), false));
        assert!(!table.insert(key.clone(), route("dataselect", 1), false));
        assert_eq!(table.get(&key).unwrap().len(), 1);
    }

    #[test]
    fn allow_overlap_flag_permits_insertion() {
        let mut table = RoutingTable::new();
        let key = Stream::new("GE", "*", "*", "*");
        assert!(table.insert(key.clone(), route("dataselect", 1), true));
        assert!(table.insert(key.clone(), route("dataselect", 1), true));
        assert_eq!(table.get(&key).unwrap().len(), 2);
    }

    #[test]
    fn sort_all_orders_ascending_by_priority() {
        let mut table = RoutingTable::new();
        let key = Stream::new("GE", "*", "*", "*");
        table.insert(key.clone(), route("dataselect", 3), true);
        table.insert(key.clone(), route("dataselect", 1), true);
        table.insert(key.clone(), route("dataselect", 2), true);
        table.sort_all();
        let priorities: Vec<i32> = table.get(&key).unwrap().iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![1, 2, 3]);
    }

    #[test]
    fn station_cache_indexes_by_host_and_stream() {
        let mut cache = StationCache::new();
        let key = Stream::new("GE", "*", "*", "*");
        let station = Station::new("APE", 37.0, 25.5, None, None);
        cache.insert("geofon.gfz-potsdam.de".to_string(), key.clone(), vec![station.clone()]);
        let found = cache.stations_for("geofon.gfz-potsdam.de", &key);
        assert_eq!(found, &[station]);
        assert!(cache.stations_for("other.host", &key).is_empty());
    }
}
