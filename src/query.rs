//! The query engine: virtual-network expansion, per-service route
//! resolution, overlap pruning, and station-cache/geo filtering.

use std::collections::HashSet;

use crate::error::RoutingCoreError;
use crate::request_merge::RequestMerge;
use crate::route::Route;
use crate::station::GeoRectangle;
use crate::stream::Stream;
use crate::tables::{RoutingTable, StationCache, VirtualNetworkTable};
use crate::timewindow::TimeWindow;

/// Expand `stream.n` if it names a virtual network: for every registered
/// `(patternStream, patternTW)`, narrow `patternStream` against the wildcard
/// network and the caller's station/location/channel, and intersect the
/// time windows. Entries whose narrow or intersection fails are dropped. A
/// non-virtual network yields the singleton `[(stream, tw)]`.
fn expand_virtual_network(vnets: &VirtualNetworkTable, stream: &Stream, tw: TimeWindow) -> Vec<(Stream, TimeWindow)> {
    match vnets.members(&stream.n) {
        None => vec![(stream.clone(), tw)],
        Some(members) => {
            let target = Stream::new("*", stream.s.clone(), stream.l.clone(), stream.c.clone());
            members
                .iter()
                .filter_map(|(pattern_stream, pattern_tw)| {
                    let narrowed = pattern_stream.strict_match(&target).ok()?;
                    let window = pattern_tw.intersection(&tw).ok()?;
                    Some((narrowed, window))
                })
                .collect()
        }
    }
}

/// Does the station name component of a (possibly wildcard) stream match a
/// concrete cached station name? Whole-component wildcard only, as with the
/// rest of `Stream` matching (no glob-style partial patterns).
fn station_name_matches(pattern: &str, name: &str) -> bool {
    pattern == crate::stream::WILDCARD || pattern == name
}

/// Per-service resolution for one expanded `(stream, window)` entry (§4.5
/// steps 2a–2f). Returns a partial `RequestMerge` to be merged into the
/// caller's aggregate result; an entry with no matching routes yields an
/// empty merge rather than an error.
fn get_route_ds(
    routing_table: &RoutingTable,
    stations: &StationCache,
    stream: &Stream,
    tw: TimeWindow,
    service: &str,
    geo_loc: Option<GeoRectangle>,
    alternative: bool,
) -> RequestMerge {
    // (a) + (b): candidate keys overlapping `stream`, with routes matching
    // the service and overlapping the window.
    let mut candidates: Vec<(&Stream, &Route)> = Vec::new();
    for (key, routes) in routing_table.iter() {
        if !key.overlap(stream) {
            continue;
        }
        let matching: Vec<&Route> = routes.iter().filter(|r| r.service == service && r.tw.overlap(&tw)).collect();
        if matching.is_empty() {
            continue;
        }

        // (c) priority selection
        if alternative {
            candidates.extend(matching.into_iter().map(|r| (key, r)));
        } else if let Some(best) = matching.into_iter().min_by_key(|r| r.priority) {
            candidates.push((key, best));
        }
    }

    // (d) overlap pruning: ascending priority, reject a candidate that
    // overlaps an already-accepted one (same priority required when
    // `alternative` is set).
    candidates.sort_by_key(|(_, r)| r.priority);
    let mut accepted: Vec<(&Stream, &Route)> = Vec::new();
    'candidates: for (key, route) in candidates {
        for (akey, aroute) in &accepted {
            if key.overlap(akey) && route.tw.overlap(&aroute.tw) && (!alternative || route.priority == aroute.priority) {
                continue 'candidates;
            }
        }
        accepted.push((key, route));
    }

    // (e) station-cache intersection and geo filter.
    let mut result = RequestMerge::new();
    for (key, route) in accepted {
        let Some(host) = route.endpoint_host() else { continue };
        let cached_stations = stations.stations_for(&host, key);

        let mut remaining: Vec<TimeWindow> = vec![tw];
        while let Some(w) = remaining.pop() {
            if !route.tw.contains(&w) {
                continue;
            }

            for gap in w.difference(&route.tw) {
                if gap == w {
                    break;
                }
                remaining.push(gap);
            }

            let mut matched_any = false;
            for cached in cached_stations {
                let geo_ok = geo_loc.map_or(true, |rect| rect.contains(cached.latitude, cached.longitude));
                if !station_name_matches(&stream.s, &cached.name) || !geo_ok {
                    continue;
                }

                let Ok(intersected) = w.intersection(&route.tw) else { continue };
                let Ok(mut narrowed) = stream.strict_match(key) else { continue };
                if geo_loc.is_some() {
                    let station_pattern = Stream::new("*", cached.name.clone(), "*", "*");
                    narrowed = match narrowed.strict_match(&station_pattern) {
                        Ok(n) => n,
                        Err(_) => continue,
                    };
                }

                result.append(service, route.address.clone(), route.priority, &narrowed, intersected);
                matched_any = true;

                if geo_loc.is_none() {
                    break;
                }
            }

            if !matched_any {
                tracing::debug!(%key, station = %stream.s, "no cached station matched, skipping window fragment");
            }
        }
    }

    result
}

/// Resolve routes for `stream`/`tw` across `services` (case-insensitive,
/// deduplicated). Virtual-network codes in `stream.n` are expanded first.
/// Fails with [`RoutingCoreError::NoRoutesFound`] when either the expansion
/// or the accumulated result is empty.
pub fn get_route(
    routing_table: &RoutingTable,
    vnets: &VirtualNetworkTable,
    stations: &StationCache,
    stream: &Stream,
    tw: TimeWindow,
    services: &[String],
    geo_loc: Option<GeoRectangle>,
    alternative: bool,
) -> Result<RequestMerge, RoutingCoreError> {
    let expansion = expand_virtual_network(vnets, stream, tw);
    if expansion.is_empty() {
        return Err(RoutingCoreError::NoRoutesFound);
    }

    let wanted: HashSet<String> = services.iter().map(|s| s.to_lowercase()).collect();

    let mut result = RequestMerge::new();
    for (s, t) in &expansion {
        for service in &wanted {
            let partial = get_route_ds(routing_table, stations, s, *t, service, geo_loc, alternative);
            result.extend(partial);
        }
    }

    if result.is_empty() {
        Err(RoutingCoreError::NoRoutesFound)
    } else {
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::Station;
    use chrono::{TimeZone, Utc};

    fn dt(y: i32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0).unwrap()
    }

    fn build_table() -> RoutingTable {
        let mut table = RoutingTable::new();
        let key = Stream::new("GE", "*", "*", "*");
        table.insert(
            key.clone(),
            Route::new("dataselect", "http://geofon.gfz-potsdam.de/fdsnws/dataselect/1/", TimeWindow::unbounded(), 1),
            true,
        );
        table.sort_all();
        table
    }

    /// Emission always requires a station-cache hit, for every service, not
    /// only the `station` service itself — the cache is the source of truth
    /// for which concrete stations exist under a wildcard key.
    fn station_cache_with_ape(host: &str, key: &Stream) -> StationCache {
        let mut cache = StationCache::new();
        cache.insert(host.to_string(), key.clone(), vec![Station::new("APE", 37.0, 25.5, None, None)]);
        cache
    }

    // Scenario A
    #[test]
    fn single_priority_route_resolves_to_one_row() {
        let table = build_table();
        let vnets = VirtualNetworkTable::new();
        let stations = station_cache_with_ape("geofon.gfz-potsdam.de", &Stream::new("GE", "*", "*", "*"));
        let stream = Stream::new("GE", "APE", "*", "BHZ");
        let tw = TimeWindow::new(Some(dt(2020)), Some(Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap())).unwrap();

        let result = get_route(&table, &vnets, &stations, &stream, tw, &["dataselect".to_string()], None, false).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.entries()[0].url, "http://geofon.gfz-potsdam.de/fdsnws/dataselect/1/");
        assert_eq!(result.entries()[0].params[0].priority, 1);
        assert_eq!(result.entries()[0].params[0].sta, "APE");
    }

    // Scenario B
    #[test]
    fn alternative_flag_controls_whether_backup_priority_is_returned() {
        let mut table = RoutingTable::new();
        let key = Stream::new("GE", "*", "*", "*");
        table.insert(key.clone(), Route::new("dataselect", "http://primary/", TimeWindow::unbounded(), 1), true);
        table.insert(key.clone(), Route::new("dataselect", "http://backup/", TimeWindow::unbounded(), 2), true);
        table.sort_all();

        let vnets = VirtualNetworkTable::new();
        let mut stations = StationCache::new();
        let ape = vec![Station::new("APE", 37.0, 25.5, None, None)];
        stations.insert("primary".to_string(), key.clone(), ape.clone());
        stations.insert("backup".to_string(), key.clone(), ape);
        let stream = Stream::new("GE", "APE", "*", "BHZ");
        let tw = TimeWindow::unbounded();

        let without_alt = get_route(&table, &vnets, &stations, &stream, tw, &["dataselect".to_string()], None, false).unwrap();
        assert_eq!(without_alt.entries().len(), 1);
        assert_eq!(without_alt.entries()[0].url, "http://primary/");

        let with_alt = get_route(&table, &vnets, &stations, &stream, tw, &["dataselect".to_string()], None, true).unwrap();
        assert_eq!(with_alt.entries().len(), 2);
    }

    // Scenario C
    #[test]
    fn virtual_network_expansion_clips_member_windows() {
        let mut vnets = VirtualNetworkTable::new();
        vnets.add("_GEALL".to_string(), Stream::new("*", "APE", "*", "*"), TimeWindow::unbounded());
        vnets.add(
            "_GEALL".to_string(),
            Stream::new("*", "KARP", "*", "*"),
            TimeWindow::new(Some(dt(2015)), None).unwrap(),
        );

        let stream = Stream::new("_GEALL", "*", "*", "BHZ");
        let tw = TimeWindow::new(Some(dt(2010)), Some(dt(2020))).unwrap();
        let expansion = expand_virtual_network(&vnets, &stream, tw);

        assert_eq!(expansion.len(), 2);
        let karp = expansion.iter().find(|(s, _)| s.s == "KARP").unwrap();
        assert_eq!(karp.1, TimeWindow::new(Some(dt(2015)), Some(dt(2020))).unwrap());
    }

    // Scenario D
    #[test]
    fn same_priority_overlap_is_rejected_at_ingest_not_query() {
        let mut table = RoutingTable::new();
        let key = Stream::new("GE", "*", "*", "*");
        assert!(table.insert(key.clone(), Route::new("dataselect", "http://a/", TimeWindow::unbounded(), 1), false));
        assert!(!table.insert(key.clone(), Route::new("dataselect", "http://b/", TimeWindow::unbounded(), 1), false));
        assert_eq!(table.get(&key).unwrap().len(), 1);
    }

    // Scenario E
    #[test]
    fn geo_filter_excludes_station_outside_rectangle() {
        let table = build_table();
        let vnets = VirtualNetworkTable::new();
        let mut stations = StationCache::new();
        let key = Stream::new("GE", "*", "*", "*");
        stations.insert(
            "geofon.gfz-potsdam.de".to_string(),
            key,
            vec![Station::new("APE", 37.0, 25.5, None, None)],
        );

        let stream = Stream::new("GE", "APE", "*", "BHZ");
        let tw = TimeWindow::unbounded();

        let inside = get_route(
            &table,
            &vnets,
            &stations,
            &stream,
            tw,
            &["dataselect".to_string()],
            Some(GeoRectangle::new(0.0, 90.0, 0.0, 90.0)),
            false,
        );
        assert!(inside.is_ok());
        assert_eq!(inside.unwrap().entries()[0].params[0].sta, "APE");

        let outside = get_route(
            &table,
            &vnets,
            &stations,
            &stream,
            tw,
            &["dataselect".to_string()],
            Some(GeoRectangle::new(40.0, 90.0, 0.0, 90.0)),
            false,
        );
        assert!(matches!(outside, Err(RoutingCoreError::NoRoutesFound)));
    }
}
