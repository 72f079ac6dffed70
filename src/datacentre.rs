//! The static catalogue of known EIDA data centres (`eidaDCs`), used only by
//! the FDSN federated-catalogue projection (`crate::fdsn_rules`).
//!
//! Loaded from an external JSON document rather than hand-built in code,
//! matching the reference implementation's externally-maintained catalogue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RoutingCoreError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub name: String,
    pub description: String,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceRef {
    pub name: String,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub priority: i32,
    pub starttime: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endtime: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub station: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<ServiceRef>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub description: String,
    pub website: String,
    pub services: Vec<ServiceEntry>,
    #[serde(default)]
    pub datasets: Vec<Dataset>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataCentre {
    pub name: String,
    pub website: String,
    #[serde(rename = "fullName")]
    pub full_name: String,
    pub summary: String,
    pub repositories: Vec<Repository>,
}

/// The full static catalogue.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DataCentreRegistry {
    pub data_centres: Vec<DataCentre>,
}

impl DataCentreRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json(data: &str) -> Result<Self, RoutingCoreError> {
        let data_centres: Vec<DataCentre> = serde_json::from_str(data)
            .map_err(|err| RoutingCoreError::ClientError(format!("invalid data centre registry: {err}")))?;
        Ok(DataCentreRegistry { data_centres })
    }

    /// Locate a data centre offering `service` at a URL `candidate_url` is
    /// prefixed by, searching across every repository's service list.
    pub fn find(&self, service: &str, candidate_url: &str) -> Option<usize> {
        self.data_centres.iter().position(|dc| {
            dc.repositories
                .iter()
                .any(|repo| repo.services.iter().any(|s| s.name == service && candidate_url.starts_with(&s.url)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_registry_entry_by_service_and_url_prefix() {
        let registry = DataCentreRegistry::from_json(
            r#"[{
                "name": "GEOFON",
                "website": "https://geofon.gfz-potsdam.de/",
                "fullName": "GEOFON Program",
                "summary": "summary",
                "repositories": [{
                    "name": "archive",
                    "description": "d",
                    "website": "w",
                    "services": [{"name": "fdsnws-dataselect-1", "description": "d", "url": "http://geofon.gfz-potsdam.de/fdsnws/dataselect/1/"}],
                    "datasets": []
                }]
            }]"#,
        )
        .unwrap();

        let idx = registry.find("fdsnws-dataselect-1", "http://geofon.gfz-potsdam.de/fdsnws/dataselect/1/");
        assert_eq!(idx, Some(0));
        assert!(registry.find("fdsnws-station-1", "http://geofon.gfz-potsdam.de/fdsnws/dataselect/1/").is_none());
    }
}
