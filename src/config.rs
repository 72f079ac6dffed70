//! Loads `routing.cfg`'s `[Service]` section with the `ini` crate. A
//! missing file or section yields the all-defaults config rather than an
//! error — refresh must still be able to run against a routing file with no
//! peers configured.

use std::path::Path;

use ini::Ini;
use tracing::warn;

/// Parsed `[Service]` section of `routing.cfg`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceConfig {
    pub baseurl: Option<String>,
    pub synchronize: Vec<(String, String)>,
    pub allowoverlap: bool,
    pub info: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            baseurl: None,
            synchronize: Vec::new(),
            allowoverlap: false,
            info: None,
        }
    }
}

impl ServiceConfig {
    /// Load from `path`. On any read or parse failure, logs and falls back
    /// to [`ServiceConfig::default`].
    pub fn load(path: &Path) -> Self {
        match Ini::load_from_file(path) {
            Ok(ini) => Self::from_ini(&ini),
            Err(err) => {
                warn!(?path, %err, "could not read routing.cfg, using defaults");
                Self::default()
            }
        }
    }

    fn from_ini(ini: &Ini) -> Self {
        let Some(section) = ini.section(Some("Service")) else {
            return Self::default();
        };

        let baseurl = section.get("baseurl").map(str::to_string).filter(|s| !s.is_empty());
        let allowoverlap = section.get("allowoverlap").map(parse_bool).unwrap_or(false);
        let info = section.get("info").map(str::to_string).filter(|s| !s.is_empty());
        let synchronize = section.get("synchronize").map(parse_synchronize).unwrap_or_default();

        ServiceConfig {
            baseurl,
            synchronize,
            allowoverlap,
            info,
        }
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Parse a multiline `dcid,url` value into pairs, skipping blank lines and
/// entries missing either field.
fn parse_synchronize(raw: &str) -> Vec<(String, String)> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let mut parts = line.splitn(2, ',');
            let dcid = parts.next()?.trim();
            let url = parts.next()?.trim();
            if dcid.is_empty() || url.is_empty() {
                None
            } else {
                Some((dcid.to_string(), url.to_string()))
            }
        })
        .collect()
}
