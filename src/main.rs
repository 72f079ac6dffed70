use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use eida_router::{FdsnRules, GeoRectangle, RoutingCache, ServiceConfig, Stream, TimeWindow};

#[derive(Parser, Debug)]
#[command(version, about = "EIDA-style federated routing service", long_about = None)]
struct Args {
    /// Primary routing document (EIDA routing.xml).
    #[arg(long, value_name = "file", default_value = "routing.xml")]
    routing_file: PathBuf,

    /// INI config with the `[Service]` section (baseurl, synchronize, allowoverlap, info).
    #[arg(long, value_name = "file", default_value = "routing.cfg")]
    config: PathBuf,

    /// Network code to resolve (supports `*`); omit to only load and exit.
    #[arg(long)]
    network: Option<String>,

    #[arg(long, default_value = "*")]
    station: String,

    #[arg(long, default_value = "*")]
    location: String,

    #[arg(long, default_value = "*")]
    channel: String,

    /// Comma-separated FDSNWS/EIDAWS service names, e.g. `dataselect,station`.
    #[arg(long, default_value = "dataselect")]
    services: String,

    /// ISO-8601 start of the query window (open if omitted).
    #[arg(long)]
    start: Option<String>,

    /// ISO-8601 end of the query window (open if omitted).
    #[arg(long)]
    end: Option<String>,

    /// Return every alternative priority, not only the lowest.
    #[arg(long)]
    alternative: bool,

    /// Restrict results to stations inside `min_lat,max_lat,min_lon,max_lon`.
    #[arg(long, value_name = "min_lat,max_lat,min_lon,max_lon")]
    geo: Option<String>,

    /// Emit the FDSN federated-catalogue JSON projection instead of the raw routes.
    #[arg(long)]
    fdsn: bool,
}

fn parse_geo(raw: &str) -> Result<GeoRectangle> {
    let parts: Vec<f64> = raw
        .split(',')
        .map(str::trim)
        .map(str::parse::<f64>)
        .collect::<std::result::Result<_, _>>()?;
    match parts.as_slice() {
        [min_lat, max_lat, min_lon, max_lon] => Ok(GeoRectangle::new(*min_lat, *max_lat, *min_lon, *max_lon)),
        _ => anyhow::bail!("--geo expects 4 comma-separated numbers: min_lat,max_lat,min_lon,max_lon"),
    }
}

fn parse_bound(raw: &Option<String>) -> Option<chrono::DateTime<chrono::Utc>> {
    raw.as_deref().and_then(eida_router::timewindow::parse_iso_lenient)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let args = Args::parse();

    let config = ServiceConfig::load(&args.config);
    let cache = RoutingCache::new(args.routing_file.clone(), config);

    cache.update().await?;
    tracing::info!(state = ?cache.state(), "routing cache ready");

    let Some(network) = args.network else {
        return Ok(());
    };

    let stream = Stream::new(network, args.station, args.location, args.channel);
    let tw = TimeWindow::new(parse_bound(&args.start), parse_bound(&args.end))?;
    let services: Vec<String> = args.services.split(',').map(|s| s.trim().to_string()).collect();
    let geo_loc = args.geo.as_deref().map(parse_geo).transpose()?;

    let result = cache.get_route(&stream, tw, &services, geo_loc, args.alternative)?;

    if args.fdsn {
        let snapshot = cache.snapshot();
        let fdsn = FdsnRules::from_request_merge(&result, &snapshot.registry);
        println!("{}", serde_json::to_string_pretty(&fdsn)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    Ok(())
}
