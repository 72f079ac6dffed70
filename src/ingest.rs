//! Streaming XML ingest of routing documents into a [`RoutingTable`] and
//! [`VirtualNetworkTable`].
//!
//! Uses `quick-xml`'s pull-parser (`Reader::read_event_into`) with a single
//! reused buffer, so memory use stays bounded regardless of document size —
//! each event's owned bytes are dropped (the buffer is cleared) once it has
//! been processed, mirroring the reference implementation's release-after-use
//! `iterparse` + `.clear()` idiom without needing a DOM tree.

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::Reader;

use crate::error::RoutingCoreError;
use crate::route::{Route, DEFAULT_PRIORITY};
use crate::stream::{normalize_component, Stream};
use crate::tables::{RoutingTable, VirtualNetworkTable};
use crate::timewindow::{parse_iso_lenient, TimeWindow};

/// What element, if any, we are currently inside (routing documents never
/// nest more than one level below the root).
enum Context {
    None,
    /// Inside a `<route>`, with its already-parsed stream key.
    Route(Stream),
    /// Inside a `<vnetwork>`. `None` means the vnetwork had no code and its
    /// members are being silently skipped.
    Vnet(Option<String>),
}

fn local_name_of_start(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned()
}

fn local_name_of_end(e: &BytesEnd) -> String {
    String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned()
}

fn get_attr(e: &BytesStart, name: &str) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        if a.key.as_ref() == name.as_bytes() {
            a.unescape_value().ok().map(|c| c.into_owned())
        } else {
            None
        }
    })
}

/// Read the four stream attributes off a `route` or `vnetwork` element,
/// rejecting any component containing `?`. Returns `None` if rejected.
fn read_stream_attrs(e: &BytesStart) -> Option<Stream> {
    let n = normalize_component(get_attr(e, "networkCode").as_deref());
    let s = normalize_component(get_attr(e, "stationCode").as_deref());
    let l = normalize_component(get_attr(e, "locationCode").as_deref());
    let c = normalize_component(get_attr(e, "streamCode").as_deref());
    let stream = Stream::new(n, s, l, c);
    if stream.has_question_mark() {
        None
    } else {
        Some(stream)
    }
}

fn parse_service_child(e: &BytesStart, table: &mut RoutingTable, stream: &Stream, allow_overlaps: bool) {
    let service = local_name_of_start(e);

    let address = match get_attr(e, "address") {
        Some(a) if !a.is_empty() => a,
        _ => {
            tracing::warn!(service, "skipping route: missing or empty address");
            return;
        }
    };

    let start = get_attr(e, "start").and_then(|s| parse_iso_lenient(&s));
    let end = get_attr(e, "end").and_then(|s| parse_iso_lenient(&s));
    let tw = match TimeWindow::new(start, end) {
        Ok(tw) => tw,
        Err(err) => {
            tracing::warn!(%err, service, "skipping route: invalid time window");
            return;
        }
    };

    let priority = match get_attr(e, "priority") {
        Some(p) if !p.is_empty() => p.parse::<i32>().unwrap_or(DEFAULT_PRIORITY),
        _ => DEFAULT_PRIORITY,
    };

    let route = Route::new(service, address, tw, priority);
    if !table.insert(stream.clone(), route.clone(), allow_overlaps) {
        tracing::warn!(%stream, service = %route.service, priority, "skipping overlapping route");
    }
}

/// Parse an optional `start`/`end` attribute, warning (but not rejecting the
/// member) when it is present but fails to parse.
fn parse_vnet_bound(raw: Option<String>, label: &str, code: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let raw = raw?;
    let parsed = parse_iso_lenient(&raw);
    if parsed.is_none() {
        tracing::warn!(%code, label, value = %raw, "unparseable virtual-network bound, treating as open");
    }
    parsed
}

fn parse_vnet_member(e: &BytesStart, vnets: &mut VirtualNetworkTable, code: &str) {
    let n = get_attr(e, "networkCode").unwrap_or_else(|| "*".to_string());
    let s = get_attr(e, "stationCode").unwrap_or_else(|| "*".to_string());
    let l = get_attr(e, "locationCode").unwrap_or_else(|| "*".to_string());
    let c = get_attr(e, "streamCode").unwrap_or_else(|| "*".to_string());

    for (label, value) in [("networkCode", &n), ("stationCode", &s), ("locationCode", &l), ("streamCode", &c)] {
        if !Stream::is_valid_vnet_component(value) {
            tracing::warn!(%code, label, value, "only the * wildcard is allowed in virtual nets");
            return;
        }
    }

    let start = parse_vnet_bound(get_attr(e, "start"), "start", code);
    let end = parse_vnet_bound(get_attr(e, "end"), "end", code);
    // An unparseable bound is stored as absent (open) rather than rejecting
    // the whole entry; see SPEC_FULL.md §9 Open Questions.
    let tw = TimeWindow { start, end };

    vnets.add(code.to_string(), Stream::new(n, s, l, c), tw);
}

/// Dispatch a freshly-opened element (`<route ...>` or `<vnetwork ...>`) seen
/// while not already inside one, or a child element seen while inside one.
/// Shared by the `Start` and `Empty` branches of [`ingest`].
fn open_or_dispatch(
    local: &str,
    e: &BytesStart,
    ctx: &mut Context,
    table: &mut RoutingTable,
    vnets: &mut VirtualNetworkTable,
    allow_overlaps: bool,
) {
    match ctx {
        Context::None => {
            if local == "route" {
                match read_stream_attrs(e) {
                    Some(stream) => *ctx = Context::Route(stream),
                    None => tracing::warn!("wildcard \"?\" is not allowed; skipping route"),
                }
            } else if local == "vnetwork" {
                let code = get_attr(e, "networkCode").filter(|c| !c.is_empty());
                *ctx = Context::Vnet(code);
            }
        }
        Context::Route(stream) => {
            let stream = stream.clone();
            parse_service_child(e, table, &stream, allow_overlaps);
        }
        Context::Vnet(Some(code)) => {
            let code = code.clone();
            parse_vnet_member(e, vnets, &code);
        }
        Context::Vnet(None) => {
            // vnetwork without a code: skip its members silently.
        }
    }
}

/// Parse a routing document's bytes into `table`/`vnets`. Returns an error
/// only when the document cannot be recognised as a routing document at all
/// (root element missing or wrong local name, or the XML itself is
/// malformed); individual malformed rows are logged and skipped, never
/// propagated as an `Err`.
pub fn ingest(xml: &[u8], table: &mut RoutingTable, vnets: &mut VirtualNetworkTable, allow_overlaps: bool) -> Result<(), RoutingCoreError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut root_checked = false;
    let mut ctx = Context::None;

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                let local = local_name_of_start(&e);

                if !root_checked {
                    if local != "routing" {
                        return Err(RoutingCoreError::RoutingError(
                            "document root is not a routing document".to_string(),
                        ));
                    }
                    root_checked = true;
                    continue;
                }

                open_or_dispatch(&local, &e, &mut ctx, table, vnets, allow_overlaps);
            }
            // A self-closing element never produces a matching `End`, so a
            // top-level `<route/>` or `<vnetwork/>` with no children must
            // close its own context right away; a self-closing child (the
            // common case for service/member elements) leaves the parent
            // context untouched.
            Ok(Event::Empty(e)) => {
                let local = local_name_of_start(&e);

                if !root_checked {
                    if local != "routing" {
                        return Err(RoutingCoreError::RoutingError(
                            "document root is not a routing document".to_string(),
                        ));
                    }
                    root_checked = true;
                    continue;
                }

                let was_top_level = matches!(ctx, Context::None);
                open_or_dispatch(&local, &e, &mut ctx, table, vnets, allow_overlaps);
                if was_top_level && (local == "route" || local == "vnetwork") {
                    ctx = Context::None;
                }
            }
            Ok(Event::End(e)) => {
                let local = local_name_of_end(&e);
                match &ctx {
                    Context::Route(_) if local == "route" => ctx = Context::None,
                    Context::Vnet(_) if local == "vnetwork" => ctx = Context::None,
                    _ => {}
                }
            }
            Ok(_) => {}
            Err(err) => {
                return Err(RoutingCoreError::RoutingError(format!(
                    "malformed routing document: {err}"
                )));
            }
        }
    }

    if !root_checked {
        return Err(RoutingCoreError::RoutingError(
            "empty document has no routing root".to_string(),
        ));
    }

    table.sort_all();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<ns0:routing xmlns:ns0="http://geofon.gfz-potsdam.de/ns/Routing/1.0/">
  <ns0:route networkCode="GE" stationCode="*" locationCode="*" streamCode="*">
    <ns0:dataselect address="http://geofon.gfz-potsdam.de/fdsnws/dataselect/1/" priority="1" start="2000-01-01T00:00:00"/>
    <ns0:dataselect address="http://backup.example/fdsnws/dataselect/1/" priority="2" start="2000-01-01T00:00:00"/>
  </ns0:route>
  <ns0:route networkCode="GE" stationCode="APE" locationCode="" streamCode="">
    <ns0:station address="http://geofon.gfz-potsdam.de/fdsnws/station/1/" priority="1"/>
  </ns0:route>
  <ns0:route networkCode="X?" stationCode="*" locationCode="*" streamCode="*">
    <ns0:dataselect address="http://bad.example/" priority="1"/>
  </ns0:route>
  <ns0:vnetwork networkCode="_GEALL">
    <ns0:stream networkCode="*" stationCode="APE" locationCode="*" streamCode="*"/>
    <ns0:stream networkCode="*" stationCode="KARP" locationCode="*" streamCode="*" start="2015-01-01T00:00:00"/>
  </ns0:vnetwork>
  <ns0:vnetwork networkCode="">
    <ns0:stream networkCode="*" stationCode="IGNORED" locationCode="*" streamCode="*"/>
  </ns0:vnetwork>
</ns0:routing>
"#;

    #[test]
    fn ingest_populates_routes_and_vnets() {
        let mut table = RoutingTable::new();
        let mut vnets = VirtualNetworkTable::new();
        ingest(SAMPLE.as_bytes(), &mut table, &mut vnets, false).unwrap();

        let ge_all = Stream::new("GE", "*", "*", "*");
        let routes = table.get(&ge_all).unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].priority, 1);
        assert_eq!(routes[1].priority, 2);

        // reject-? route must not appear anywhere in the table.
        assert!(table.keys().all(|s| !s.n.contains('?')));

        assert_eq!(vnets.members("_GEALL").unwrap().len(), 2);
        assert!(vnets.members("").is_none());
    }

    #[test]
    fn ingest_rejects_non_routing_document() {
        let mut table = RoutingTable::new();
        let mut vnets = VirtualNetworkTable::new();
        let bogus = b"<?xml version=\"1.0\"?><notrouting></notrouting>";
        assert!(ingest(bogus, &mut table, &mut vnets, false).is_err());
    }

    #[test]
    fn ingest_disallows_overlap_by_default() {
        let mut table = RoutingTable::new();
        let mut vnets = VirtualNetworkTable::new();
        let doc = r#"<routing>
            <route networkCode="IU" stationCode="*" locationCode="*" streamCode="*">
                <dataselect address="http://a/" priority="1" start="2000-01-01T00:00:00" end="2010-01-01T00:00:00"/>
            </route>
            <route networkCode="IU" stationCode="ANMO" locationCode="*" streamCode="*">
                <dataselect address="http://b/" priority="1" start="2005-01-01T00:00:00" end="2006-01-01T00:00:00"/>
            </route>
        </routing>"#;
        ingest(doc.as_bytes(), &mut table, &mut vnets, false).unwrap();
        let total: usize = table.iter().map(|(_, routes)| routes.len()).sum();
        assert_eq!(total, 1);
    }
}
