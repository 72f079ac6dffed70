//! Stream identifiers and the wildcard algebra used to match them.
//!
//! A [`Stream`] is the four-component key `(network, station, location, channel)`
//! used throughout the routing core. Each component is either a literal ASCII
//! token or the single-character wildcard `*`; there is no `?` wildcard and no
//! multi-character glob support (see the reference's note on re-architecting
//! shell-style matching into a tiny two-symbol matcher).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RoutingCoreError;

/// The whole-component wildcard. Streams never contain partial wildcards
/// (e.g. `"AB*"`); a component is either exactly this or a literal token.
pub const WILDCARD: &str = "*";

/// A four-component stream pattern: network, station, location, channel.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stream {
    pub n: String,
    pub s: String,
    pub l: String,
    pub c: String,
}

impl Stream {
    pub fn new(
        n: impl Into<String>,
        s: impl Into<String>,
        l: impl Into<String>,
        c: impl Into<String>,
    ) -> Self {
        Stream {
            n: n.into(),
            s: s.into(),
            l: l.into(),
            c: c.into(),
        }
    }

    /// A stream matching everything: `(*, *, *, *)`.
    pub fn any() -> Self {
        Stream::new(WILDCARD, WILDCARD, WILDCARD, WILDCARD)
    }

    fn components(&self) -> [&str; 4] {
        [&self.n, &self.s, &self.l, &self.c]
    }

    /// Does `self` contain `other`? True iff every component of `self`
    /// shell-matches the corresponding component of `other`: `self[i]` is
    /// `*`, or `self[i] == other[i]`.
    pub fn contains(&self, other: &Stream) -> bool {
        self.components()
            .iter()
            .zip(other.components())
            .all(|(a, b)| *a == WILDCARD || *a == b)
    }

    /// Symmetric containment on any assignment: true if either direction's
    /// per-component wildcard-or-equality check passes, for every component.
    pub fn overlap(&self, other: &Stream) -> bool {
        self.components()
            .iter()
            .zip(other.components())
            .all(|(a, b)| *a == WILDCARD || b == WILDCARD || *a == b)
    }

    /// Return the componentwise narrower of `self` and `other`: for each
    /// component, take whichever side is a literal (or `self`'s literal if
    /// both are literal and equal). Fails if both are literal and unequal.
    pub fn strict_match(&self, other: &Stream) -> Result<Stream, RoutingCoreError> {
        let mut out = [String::new(), String::new(), String::new(), String::new()];
        for (i, (a, b)) in self.components().iter().zip(other.components()).enumerate() {
            out[i] = if *a == WILDCARD {
                b.to_string()
            } else if b == WILDCARD {
                a.to_string()
            } else if a == &b {
                a.to_string()
            } else {
                return Err(RoutingCoreError::RoutingError(format!(
                    "no overlap or match between streams: {self} vs {other}"
                )));
            };
        }
        let [n, s, l, c] = out;
        Ok(Stream::new(n, s, l, c))
    }

    /// Rejects any component containing the `?` wildcard, which ingest does
    /// not support (it cannot be reconciled against user input that mixes
    /// `*` and literal characters).
    pub fn has_question_mark(&self) -> bool {
        self.components().iter().any(|c| c.contains('?'))
    }

    /// True for virtual-network members: only the whole-component `*` is
    /// accepted, never a partial wildcard like `A*`.
    pub fn is_valid_vnet_component(component: &str) -> bool {
        !component.contains('?') && !(component.contains('*') && component.len() > 1)
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{},{})", self.n, self.s, self.l, self.c)
    }
}

/// Normalise a raw XML attribute value into a stream component: empty or
/// absent becomes the wildcard.
pub fn normalize_component(raw: Option<&str>) -> String {
    match raw {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => WILDCARD.to_string(),
    }
}
