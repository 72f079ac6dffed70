//! Core routing engine for an EIDA-style federated seismological data
//! service: stream/time-window algebra, streaming XML ingest, peer
//! synchronisation, station-cache construction, and the query engine that
//! ties them together behind a refreshable [`cache::RoutingCache`].

pub mod cache;
pub mod config;
pub mod datacentre;
pub mod error;
pub mod fdsn_rules;
pub mod ingest;
pub mod peer_fetch;
pub mod query;
pub mod request_merge;
pub mod route;
pub mod station;
pub mod station_cache;
pub mod stream;
pub mod tables;
pub mod timewindow;

pub use cache::{CacheState, RoutingCache, Snapshot};
pub use config::ServiceConfig;
pub use error::RoutingCoreError;
pub use fdsn_rules::FdsnRules;
pub use request_merge::RequestMerge;
pub use station::GeoRectangle;
pub use stream::Stream;
pub use timewindow::TimeWindow;
