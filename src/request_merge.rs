//! Groups query-engine output rows by `(service, url)`.
//!
//! The reference implementation does this by subclassing `list`, overriding
//! `append`/`index`/`extend` to get dict-like grouping out of a list type.
//! That structural-subtyping trick doesn't translate into an idiomatic Rust
//! shape; here it is an explicit aggregate struct instead (see
//! SPEC_FULL.md §9).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stream::Stream;
use crate::timewindow::TimeWindow;

/// One row within a grouped `(service, url)` entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamRow {
    pub net: String,
    pub sta: String,
    pub loc: String,
    pub cha: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub priority: i32,
}

/// All rows sharing a `(service, url)` pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub url: String,
    pub params: Vec<ParamRow>,
}

/// The grouped response of a query: one entry per distinct `(service, url)`
/// pair, each carrying every stream/window/priority row routed there.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestMerge {
    entries: Vec<Entry>,
}

impl RequestMerge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index_of(&self, service: &str, url: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == service && e.url == url)
    }

    /// Append one response row, merging into the existing `(service, url)`
    /// entry if one already exists.
    pub fn append(&mut self, service: impl Into<String>, url: impl Into<String>, priority: i32, stream: &Stream, tw: TimeWindow) {
        let service = service.into();
        let url = url.into();
        let row = ParamRow {
            net: stream.n.clone(),
            sta: stream.s.clone(),
            loc: stream.l.clone(),
            cha: stream.c.clone(),
            start: tw.start,
            end: tw.end,
            priority,
        };
        match self.index_of(&service, &url) {
            Some(idx) => self.entries[idx].params.push(row),
            None => self.entries.push(Entry {
                name: service,
                url,
                params: vec![row],
            }),
        }
    }

    /// Merge every entry of `other` into `self`, as repeated `append` calls.
    pub fn extend(&mut self, other: RequestMerge) {
        for entry in other.entries {
            for row in entry.params {
                match self.index_of(&entry.name, &entry.url) {
                    Some(idx) => self.entries[idx].params.push(row),
                    None => self.entries.push(Entry {
                        name: entry.name.clone(),
                        url: entry.url.clone(),
                        params: vec![row],
                    }),
                }
            }
        }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.iter().map(|e| e.params.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> Stream {
        Stream::new("GE", "APE", "*", "BHZ")
    }

    #[test]
    fn append_groups_by_service_and_url() {
        let mut rm = RequestMerge::new();
        rm.append("dataselect", "http://a/", 1, &stream(), TimeWindow::unbounded());
        rm.append("dataselect", "http://a/", 2, &stream(), TimeWindow::unbounded());
        rm.append("station", "http://a/", 1, &stream(), TimeWindow::unbounded());

        assert_eq!(rm.entries().len(), 2);
        assert_eq!(rm.entries()[0].params.len(), 2);
        assert_eq!(rm.len(), 3);
    }

    #[test]
    fn extend_merges_into_existing_entries() {
        let mut rm = RequestMerge::new();
        rm.append("dataselect", "http://a/", 1, &stream(), TimeWindow::unbounded());

        let mut other = RequestMerge::new();
        other.append("dataselect", "http://a/", 2, &stream(), TimeWindow::unbounded());
        other.append("station", "http://b/", 1, &stream(), TimeWindow::unbounded());

        rm.extend(other);
        assert_eq!(rm.entries().len(), 2);
        assert_eq!(rm.index_of("dataselect", "http://a/").map(|i| rm.entries()[i].params.len()), Some(2));
    }
}
