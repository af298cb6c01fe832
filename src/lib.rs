mod config;
mod discovery;
mod errors;
mod fetcher;
mod geolocation;
mod map_sync;
mod normalize;
mod presentation;
mod query;
mod session;
mod telemetry;
#[cfg(test)]
mod testing;

use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde_json::json;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use config::{AppConfig, DiscoverySettings, MAX_RETRIES_CAP};
pub use discovery::{DiscoveryEngine, LookupOutcome, LookupRequest};
pub use errors::{AppError, AppResult, DiscoveryError};
pub use fetcher::{CancelToken, OverpassClient, PlaceFetcher, PlaceSource};
pub use geolocation::{FixedPosition, GeoFailure, GeolocationProvider, NoGeolocation};
pub use map_sync::{MapLayerSync, MapSurface, MarkerHandle, ReconcileReport};
pub use normalize::{normalize, CategoryKind, Coordinates, Place, PlaceAttributes, RawPlace};
pub use presentation::{present, MarkerIcon, MarkerSpec, PopupContent, PopupLine};
pub use query::{
    build_query, CategoryTag, Location, QuerySpec, DEFAULT_RADIUS_METERS, MAX_RADIUS_METERS,
};
pub use session::{DiscoverySession, SessionSnapshot, SessionStatus};
pub use telemetry::{TelemetryClient, TelemetryEvent};

pub fn initialize(
    data_dir: &Path,
    geolocation: Arc<dyn GeolocationProvider>,
    map: Arc<Mutex<dyn MapSurface>>,
) -> AppResult<DiscoveryEngine> {
    init_tracing();
    let config = AppConfig::from_env();
    let telemetry = TelemetryClient::new(data_dir, &config)?;
    let engine = DiscoveryEngine::from_config(&config, geolocation, map)?;

    if let Err(err) = telemetry.record(
        "engine_start",
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "endpoint": config.overpass_endpoint,
            "radius_meters": engine.settings().radius_meters,
            "max_retries": engine.settings().max_retries,
        }),
    ) {
        warn!(?err, "failed to queue telemetry bootstrap event");
    }
    if let Err(err) = telemetry.flush() {
        warn!(?err, "failed to flush telemetry queue");
    }

    Ok(engine.with_telemetry(telemetry))
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,poi_discovery=debug"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    });
}
