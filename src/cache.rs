//! The routing cache lifecycle: `UNLOADED -> LOADING -> READY -> REFRESHING
//! -> READY`, and the compiled snapshot that backs it.
//!
//! Grounded on `RoutingCache.update()` in
//! `examples/original_source/routeutils/utils.py`: read a pickled
//! `(routingTable, stationTable, vnTable, eidaDCs)` tuple if one is present,
//! otherwise re-ingest the primary routing document plus every configured
//! peer's `routing-{dcid}.xml`, rebuild the station cache, and persist the
//! result. The reference keeps synchronisation (fetching peer files) as a
//! separate off-line process from `update()`; here the two are folded
//! together since there is no separate sync daemon in this crate.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ServiceConfig;
use crate::datacentre::DataCentreRegistry;
use crate::error::RoutingCoreError;
use crate::ingest;
use crate::peer_fetch;
use crate::query;
use crate::request_merge::RequestMerge;
use crate::station::GeoRectangle;
use crate::station_cache;
use crate::stream::Stream;
use crate::tables::{RoutingTable, StationCache, VirtualNetworkTable};
use crate::timewindow::TimeWindow;

const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Where a [`RoutingCache`] sits in its lifecycle. Public query operations
/// are only meaningful once `Ready`; `get_route` refuses to serve a request
/// out of a cache that has never finished loading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheState {
    Unloaded,
    Loading,
    Ready,
    Refreshing,
}

/// The four tables compiled from a routing document (or documents), bundled
/// for atomic publication and snapshot persistence.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub routing_table: RoutingTable,
    pub station_cache: StationCache,
    pub vnet_table: VirtualNetworkTable,
    pub registry: DataCentreRegistry,
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Read and validate a compiled snapshot: a `u32` little-endian version
/// header followed by a `bincode` blob. Any mismatch or I/O failure is
/// reported as [`RoutingCoreError::SnapshotCorrupt`] so the caller falls
/// through to a full re-ingest.
async fn read_snapshot(path: &Path) -> Result<Snapshot, RoutingCoreError> {
    let bytes = tokio::fs::read(path).await.map_err(|err| RoutingCoreError::SnapshotCorrupt(err.to_string()))?;
    if bytes.len() < 4 {
        return Err(RoutingCoreError::SnapshotCorrupt("truncated snapshot header".to_string()));
    }
    let version = u32::from_le_bytes(bytes[..4].try_into().expect("slice is exactly 4 bytes"));
    if version != SNAPSHOT_FORMAT_VERSION {
        return Err(RoutingCoreError::SnapshotCorrupt(format!("unsupported snapshot version {version}")));
    }
    bincode::deserialize(&bytes[4..]).map_err(|err| RoutingCoreError::SnapshotCorrupt(err.to_string()))
}

/// Serialise `snapshot` behind the version header and atomically publish it
/// at `path`, reusing the same staged-write-then-rotate dance as peer fetches.
async fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), RoutingCoreError> {
    let payload = bincode::serialize(snapshot).map_err(|err| RoutingCoreError::RoutingError(format!("snapshot serialise failed: {err}")))?;
    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&SNAPSHOT_FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&payload);

    let download_path = append_suffix(path, ".download");
    tokio::fs::write(&download_path, &buf).await.map_err(RoutingCoreError::Io)?;
    peer_fetch::rotate(path, &download_path).await
}

/// Ingest the primary routing document, recovering from a corrupt file by
/// rotating `.wrong`/`.bck` once (§4.3's corruption-recovery rule). Falls
/// back to empty tables if both the primary and the backup fail to parse.
async fn ingest_primary_with_recovery(routing_file: &Path, allow_overlaps: bool) -> (RoutingTable, VirtualNetworkTable) {
    let mut table = RoutingTable::new();
    let mut vnets = VirtualNetworkTable::new();

    let bytes = match tokio::fs::read(routing_file).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(?routing_file, %err, "could not read primary routing file, starting from an empty table");
            return (table, vnets);
        }
    };

    if ingest::ingest(&bytes, &mut table, &mut vnets, allow_overlaps).is_ok() {
        return (table, vnets);
    }

    warn!(?routing_file, "primary routing file failed to parse, attempting corruption recovery");
    let wrong_path = append_suffix(routing_file, ".wrong");
    let bck_path = append_suffix(routing_file, ".bck");
    let _ = tokio::fs::rename(routing_file, &wrong_path).await;

    if tokio::fs::rename(&bck_path, routing_file).await.is_err() {
        warn!("no backup routing file available, falling back to an empty table");
        return (RoutingTable::new(), VirtualNetworkTable::new());
    }

    match tokio::fs::read(routing_file).await {
        Ok(bytes) => {
            let mut table = RoutingTable::new();
            let mut vnets = VirtualNetworkTable::new();
            match ingest::ingest(&bytes, &mut table, &mut vnets, allow_overlaps) {
                Ok(()) => (table, vnets),
                Err(err) => {
                    warn!(%err, "recovered backup routing file also failed to parse, falling back to an empty table");
                    (RoutingTable::new(), VirtualNetworkTable::new())
                }
            }
        }
        Err(err) => {
            warn!(%err, "could not read recovered backup routing file");
            (RoutingTable::new(), VirtualNetworkTable::new())
        }
    }
}

/// Load the static data-centre catalogue from `eidaDCs.json` next to the
/// routing file. Its absence or malformedness is not fatal: the catalogue
/// only feeds the FDSN federated-catalogue projection.
async fn load_registry(routing_file: &Path) -> DataCentreRegistry {
    let path = routing_file.with_file_name("eidaDCs.json");
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => DataCentreRegistry::from_json(&contents).unwrap_or_else(|err| {
            warn!(%err, ?path, "invalid data centre registry, continuing with an empty catalogue");
            DataCentreRegistry::empty()
        }),
        Err(_) => DataCentreRegistry::empty(),
    }
}

/// The live routing cache: an immutable [`Snapshot`] behind a
/// read-write-locked `Arc`, refreshed wholesale by [`RoutingCache::update`].
/// Query calls clone the `Arc` once and evaluate entirely against that
/// cloned snapshot, so a concurrent refresh never blocks or interleaves with
/// an in-flight query (§5).
pub struct RoutingCache {
    routing_file: PathBuf,
    config: ServiceConfig,
    client: reqwest::Client,
    state: RwLock<CacheState>,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl RoutingCache {
    pub fn new(routing_file: PathBuf, config: ServiceConfig) -> Self {
        // Every outbound peer-fetch request gets a 15s ceiling this way;
        // the station-cache builder additionally sets the same timeout
        // per-request since it also needs a politeness delay in between.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("default client configuration is always valid");

        RoutingCache {
            routing_file,
            config,
            client,
            state: RwLock::new(CacheState::Unloaded),
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
        }
    }

    pub fn state(&self) -> CacheState {
        *self.state.read().expect("cache state lock poisoned")
    }

    fn set_state(&self, state: CacheState) {
        *self.state.write().expect("cache state lock poisoned") = state;
    }

    /// Clone the `Arc` to the currently-published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read().expect("cache snapshot lock poisoned"))
    }

    /// Load or rebuild the routing cache and publish the result. The first
    /// call transitions `Unloaded -> Loading -> Ready`; later calls
    /// transition `Ready -> Refreshing -> Ready`.
    #[tracing::instrument(skip(self), fields(routing_file = %self.routing_file.display()))]
    pub async fn update(&self) -> Result<(), RoutingCoreError> {
        let transitional_state = if self.state() == CacheState::Unloaded {
            CacheState::Loading
        } else {
            CacheState::Refreshing
        };
        self.set_state(transitional_state);

        let snapshot_path = append_suffix(&self.routing_file, ".bin");
        if let Ok(snapshot) = read_snapshot(&snapshot_path).await {
            debug!(?snapshot_path, "loaded compiled snapshot, skipping re-ingest");
            *self.snapshot.write().expect("cache snapshot lock poisoned") = Arc::new(snapshot);
            self.set_state(CacheState::Ready);
            return Ok(());
        }
        debug!(?snapshot_path, "no usable compiled snapshot, rebuilding from routing documents");

        let (mut table, mut vnets) = ingest_primary_with_recovery(&self.routing_file, self.config.allowoverlap).await;

        let data_dir = self.routing_file.parent().unwrap_or_else(|| Path::new("."));
        for (dcid, url) in &self.config.synchronize {
            let save_as = data_dir.join(format!("routing-{dcid}.xml"));
            if let Err(err) = peer_fetch::fetch(&self.client, &save_as, url, "dc").await {
                warn!(%dcid, %err, "peer fetch failed, will use whatever is already on disk for this peer");
            }

            match tokio::fs::read(&save_as).await {
                Ok(bytes) => {
                    if let Err(err) = ingest::ingest(&bytes, &mut table, &mut vnets, self.config.allowoverlap) {
                        warn!(%dcid, %err, "peer routing document failed to parse, skipping this peer");
                    }
                }
                Err(_) => debug!(%dcid, "no routing document on disk yet for this peer"),
            }
        }
        table.sort_all();

        let station_cache = station_cache::build(&self.client, &table).await;
        let registry = load_registry(&self.routing_file).await;

        let snapshot = Snapshot {
            routing_table: table,
            station_cache,
            vnet_table: vnets,
            registry,
        };

        if let Err(err) = write_snapshot(&snapshot_path, &snapshot).await {
            warn!(%err, "could not persist compiled snapshot, serving the freshly built one from memory only");
        }

        *self.snapshot.write().expect("cache snapshot lock poisoned") = Arc::new(snapshot);
        self.set_state(CacheState::Ready);
        Ok(())
    }

    /// Resolve a route, failing with [`RoutingCoreError::RoutingError`] if
    /// the cache has never finished an initial load.
    #[tracing::instrument(skip(self, geo_loc), fields(stream = %stream))]
    pub fn get_route(
        &self,
        stream: &Stream,
        tw: TimeWindow,
        services: &[String],
        geo_loc: Option<GeoRectangle>,
        alternative: bool,
    ) -> Result<RequestMerge, RoutingCoreError> {
        if self.state() == CacheState::Unloaded {
            return Err(RoutingCoreError::RoutingError("routing cache has not been loaded yet".to_string()));
        }

        let snapshot = self.snapshot();
        query::get_route(
            &snapshot.routing_table,
            &snapshot.vnet_table,
            &snapshot.station_cache,
            stream,
            tw,
            services,
            geo_loc,
            alternative,
        )
    }
}
