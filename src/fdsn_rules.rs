//! Reshapes a [`RequestMerge`] into the FDSN federated-catalogue JSON schema.
//!
//! Like `RequestMerge`, the reference implementation builds this by
//! subclassing `dict` and overriding `append`/`index`. Re-architected here as
//! a plain builder function producing the explicit [`crate::datacentre`]
//! types (SPEC_FULL.md §9).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::datacentre::{DataCentre, DataCentreRegistry, Dataset, ServiceRef};
use crate::request_merge::RequestMerge;

fn normalize_service(service: &str) -> String {
    match service {
        "dataselect" => "fdsnws-dataselect-1",
        "station" => "fdsnws-station-1",
        "availability" => "fdsnws-availability-1",
        "wfcatalog" => "eidaws-wfcatalog",
        other => other,
    }
    .to_string()
}

fn strip_trailing_query(url: &str) -> String {
    url.strip_suffix("query").unwrap_or(url).to_string()
}

fn find_built(built: &[DataCentre], service: &str, url: &str) -> Option<usize> {
    built.iter().position(|dc| {
        dc.repositories
            .iter()
            .any(|repo| repo.services.iter().any(|s| s.name == service && url.starts_with(&s.url)))
    })
}

#[allow(clippy::too_many_arguments)]
fn merge_dataset(dc: &mut DataCentre, service: &str, url: &str, row: &crate::request_merge::ParamRow) {
    let Some(repo) = dc.repositories.first_mut() else {
        return;
    };

    let network = (row.net != "*" && !row.net.is_empty()).then(|| row.net.clone());
    let station = (row.sta != "*" && !row.sta.is_empty()).then(|| row.sta.clone());
    let location = (row.loc != "*" && !row.loc.is_empty()).then(|| row.loc.clone());
    let channel = (row.cha != "*" && !row.cha.is_empty()).then(|| row.cha.clone());
    let service_ref = ServiceRef {
        name: service.to_string(),
        url: url.to_string(),
    };

    let existing = repo.datasets.iter_mut().find(|d| {
        d.network == network
            && d.station == station
            && d.location == location
            && d.channel == channel
            && d.starttime == row.start
            && d.endtime == row.end
            && d.priority == row.priority
    });

    match existing {
        Some(dataset) => dataset.services.get_or_insert_with(Vec::new).push(service_ref),
        None => repo.datasets.push(Dataset {
            priority: row.priority,
            starttime: row.start,
            endtime: row.end,
            network,
            station,
            location,
            channel,
            services: Some(vec![service_ref]),
        }),
    }
}

/// Delete a dataset's `services` field wherever it has accumulated exactly
/// the repository's full service list — it is then redundant.
fn collapse_redundant_services(datacentres: &mut [DataCentre]) {
    for dc in datacentres {
        for repo in &mut dc.repositories {
            let full: HashSet<(String, String)> = repo.services.iter().map(|s| (s.name.clone(), s.url.clone())).collect();
            for dataset in &mut repo.datasets {
                let Some(services) = &dataset.services else { continue };
                let current: HashSet<(String, String)> = services.iter().map(|s| (s.name.clone(), s.url.clone())).collect();
                if current == full {
                    dataset.services = None;
                }
            }
        }
    }
}

/// The top-level federated-catalogue document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FdsnRules {
    pub version: i32,
    pub datacenters: Vec<DataCentre>,
}

impl FdsnRules {
    /// Project `rm` into the federated-catalogue shape, resolving each row's
    /// data centre against `registry` the first time that data centre is
    /// mentioned. Rows whose service+url match no known data centre are
    /// silently dropped, matching the reference behaviour.
    pub fn from_request_merge(rm: &RequestMerge, registry: &DataCentreRegistry) -> Self {
        let mut datacenters: Vec<DataCentre> = Vec::new();

        for entry in rm.entries() {
            let service = normalize_service(&entry.name);
            let url = strip_trailing_query(&entry.url);

            for row in &entry.params {
                let idx = match find_built(&datacenters, &service, &url) {
                    Some(i) => i,
                    None => match registry.find(&service, &url) {
                        Some(reg_idx) => {
                            datacenters.push(registry.data_centres[reg_idx].clone());
                            datacenters.len() - 1
                        }
                        None => continue,
                    },
                };
                merge_dataset(&mut datacenters[idx], &service, &url, row);
            }
        }

        collapse_redundant_services(&mut datacenters);

        FdsnRules { version: 1, datacenters }
    }
}
