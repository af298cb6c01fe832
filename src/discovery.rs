use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde_json::{json, Value};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::{AppConfig, DiscoverySettings, MAX_RETRIES_CAP};
use crate::errors::{AppError, AppResult, DiscoveryError};
use crate::fetcher::{CancelToken, OverpassClient, PlaceFetcher, PlaceSource};
use crate::geolocation::{GeoFailure, GeolocationProvider};
use crate::map_sync::{MapLayerSync, MapSurface};
use crate::normalize::{normalize, RawPlace};
use crate::query::{build_query, Location, QuerySpec};
use crate::session::{DiscoverySession, SessionSnapshot, SessionStatus};
use crate::telemetry::TelemetryClient;

const CURRENT_LOCATION_LABEL: &str = "Current location";
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub enum LookupRequest {
    CurrentPosition,
    At(Location),
}

#[derive(Debug, Clone)]
pub enum LookupOutcome {
    Completed(SessionSnapshot),
    Superseded,
}

impl LookupOutcome {
    pub fn snapshot(&self) -> Option<&SessionSnapshot> {
        match self {
            Self::Completed(snapshot) => Some(snapshot),
            Self::Superseded => None,
        }
    }
}

/// Every lookup gets a fresh session tagged with a monotonically increasing
/// token. Results are applied only while their token is still the current
/// session's, and starting a lookup cancels whatever the previous session
/// had in flight.
pub struct DiscoveryEngine {
    fetcher: PlaceFetcher,
    geolocation: Arc<dyn GeolocationProvider>,
    map: Arc<Mutex<dyn MapSurface>>,
    layer: Mutex<MapLayerSync>,
    session: Mutex<DiscoverySession>,
    generation: AtomicU64,
    in_flight: Mutex<CancelToken>,
    settings: DiscoverySettings,
    telemetry: Option<TelemetryClient>,
    jitter_rng: Mutex<StdRng>,
}

impl DiscoveryEngine {
    pub fn new(
        source: Arc<dyn PlaceSource>,
        geolocation: Arc<dyn GeolocationProvider>,
        map: Arc<Mutex<dyn MapSurface>>,
        mut settings: DiscoverySettings,
    ) -> AppResult<Self> {
        settings.max_retries = settings.max_retries.clamp(1, MAX_RETRIES_CAP);
        if settings.radius_meters == 0 || settings.categories.is_empty() {
            return Err(AppError::Config(
                "discovery needs a positive radius and at least one category".into(),
            ));
        }
        Ok(Self {
            fetcher: PlaceFetcher::new(source),
            geolocation,
            map,
            layer: Mutex::new(MapLayerSync::new()),
            session: Mutex::new(DiscoverySession::idle(0, settings.max_retries)),
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(CancelToken::new()),
            settings,
            telemetry: None,
            jitter_rng: Mutex::new(StdRng::from_entropy()),
        })
    }

    pub fn from_config(
        config: &AppConfig,
        geolocation: Arc<dyn GeolocationProvider>,
        map: Arc<Mutex<dyn MapSurface>>,
    ) -> AppResult<Self> {
        let source = OverpassClient::from_config(config)?;
        let settings = DiscoverySettings::from_config(config)?;
        Self::new(Arc::new(source), geolocation, map, settings)
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryClient) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn settings(&self) -> &DiscoverySettings {
        &self.settings
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().snapshot()
    }

    pub fn placed_ids(&self) -> HashSet<String> {
        self.layer.lock().placed_ids()
    }

    pub async fn lookup(&self, request: LookupRequest) -> AppResult<LookupOutcome> {
        let max_retries = self.settings.max_retries;
        match request {
            LookupRequest::At(location) => {
                let (token, cancel) = self.begin_session(|token| {
                    DiscoverySession::fetching(token, location.clone(), max_retries)
                });
                self.record_started(token, Some(&location));
                self.focus_if_current(token, &location);
                self.run_fetch(token, location, cancel).await
            }
            LookupRequest::CurrentPosition => {
                let (token, cancel) =
                    self.begin_session(|token| DiscoverySession::locating(token, max_retries));
                self.record_started(token, None);
                let Some(resolved) = self.locate(&cancel).await else {
                    return Ok(self.discard_stale(token, "locate"));
                };

                let location = {
                    let mut session = self.session.lock();
                    if session.token() != token {
                        drop(session);
                        return Ok(self.discard_stale(token, "locate"));
                    }
                    match resolved {
                        Ok(location) => {
                            session.location_resolved(location.clone())?;
                            location
                        }
                        Err(reason) => {
                            session.location_failed(reason)?;
                            let snapshot = session.snapshot();
                            drop(session);
                            warn!(token, %reason, "could not resolve current position");
                            self.record(
                                "location_failed",
                                json!({ "token": token, "reason": reason }),
                            );
                            return Ok(LookupOutcome::Completed(snapshot));
                        }
                    }
                };
                self.focus_if_current(token, &location);
                self.run_fetch(token, location, cancel).await
            }
        }
    }

    pub async fn retry(&self) -> AppResult<LookupOutcome> {
        let token = self.session.lock().token();
        self.retry_session(token, None).await
    }

    pub async fn lookup_with_retries(&self, request: LookupRequest) -> AppResult<LookupOutcome> {
        let mut outcome = self.lookup(request).await?;
        loop {
            let LookupOutcome::Completed(snapshot) = &outcome else {
                return Ok(outcome);
            };
            let retryable = snapshot.can_retry
                && snapshot
                    .error
                    .as_ref()
                    .is_some_and(DiscoveryError::is_retryable);
            let (token, failures) = (snapshot.token, snapshot.retry_count);
            if !retryable {
                return Ok(outcome);
            }
            let delay = self.backoff_delay(failures);
            debug!(token, ?delay, "scheduling automatic retry");
            sleep(delay).await;
            outcome = self.retry_session(token, Some(failures)).await?;
        }
    }

    pub fn cancel(&self) -> SessionSnapshot {
        let max_retries = self.settings.max_retries;
        let (token, _) = self.begin_session(|token| DiscoverySession::idle(token, max_retries));
        info!(token, "discovery cancelled");
        self.snapshot()
    }

    pub fn clear_places(&self) -> usize {
        let mut map = self.map.lock();
        self.layer.lock().clear(&mut *map)
    }

    fn begin_session(
        &self,
        create: impl FnOnce(u64) -> DiscoverySession,
    ) -> (u64, CancelToken) {
        let mut session = self.session.lock();
        let token = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *session = create(token);
        let cancel = self.replace_in_flight();
        debug!(token, status = ?session.status(), "started discovery session");
        (token, cancel)
    }

    fn replace_in_flight(&self) -> CancelToken {
        let fresh = CancelToken::new();
        let previous = std::mem::replace(&mut *self.in_flight.lock(), fresh.clone());
        previous.cancel();
        fresh
    }

    /// With `expected_failures` set, the retry only goes ahead if the session
    /// is still sitting in that failed state; otherwise the current snapshot
    /// is returned as is.
    async fn retry_session(
        &self,
        token: u64,
        expected_failures: Option<u32>,
    ) -> AppResult<LookupOutcome> {
        let (location, attempt, cancel) = {
            let mut session = self.session.lock();
            if session.token() != token {
                return Ok(LookupOutcome::Superseded);
            }
            if let Some(failures) = expected_failures {
                if session.status() != SessionStatus::Error || session.retry_count() != failures {
                    debug!(token, status = ?session.status(), "session moved on during backoff");
                    return Ok(LookupOutcome::Completed(session.snapshot()));
                }
            }
            let location = session.location().cloned().ok_or_else(|| {
                AppError::RetryRejected("session has no location to search around".into())
            })?;
            session.begin_retry()?;
            (location, session.retry_count() + 1, self.replace_in_flight())
        };
        info!(token, attempt, "retrying place fetch");
        self.record("retry_started", json!({ "token": token, "attempt": attempt }));
        self.run_fetch(token, location, cancel).await
    }

    async fn locate(&self, cancel: &CancelToken) -> Option<Result<Location, GeoFailure>> {
        let position = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            result = timeout(self.settings.geolocation_timeout, self.geolocation.current_position()) => {
                result.unwrap_or(Err(GeoFailure::Timeout))
            }
        };
        Some(position.and_then(|coordinates| {
            Location::new(coordinates.lat, coordinates.lon, CURRENT_LOCATION_LABEL)
                .map_err(|_| GeoFailure::PositionUnavailable)
        }))
    }

    async fn run_fetch(
        &self,
        token: u64,
        location: Location,
        cancel: CancelToken,
    ) -> AppResult<LookupOutcome> {
        let spec = QuerySpec::new(
            location,
            self.settings.radius_meters,
            self.settings.categories.clone(),
        )?;
        let query = build_query(&spec, self.settings.fetch_timeout);
        debug!(
            token,
            radius = spec.effective_radius(),
            categories = spec.categories.len(),
            "fetching nearby places"
        );
        let result = self
            .fetcher
            .fetch(&query, self.settings.fetch_timeout, &cancel)
            .await;
        self.apply_fetch_result(token, result)
    }

    fn apply_fetch_result(
        &self,
        token: u64,
        result: Result<Vec<RawPlace>, DiscoveryError>,
    ) -> AppResult<LookupOutcome> {
        let mut session = self.session.lock();
        if session.token() != token || matches!(result, Err(DiscoveryError::Cancelled)) {
            drop(session);
            return Ok(self.discard_stale(token, "fetch"));
        }

        match result {
            Ok(raw) => {
                let received = raw.len();
                session.fetch_succeeded(normalize(raw))?;
                let report = {
                    let mut map = self.map.lock();
                    self.layer.lock().reconcile(session.places(), &mut *map)
                };
                let snapshot = session.snapshot();
                drop(session);
                info!(
                    token,
                    received,
                    places = snapshot.places.len(),
                    added = report.added,
                    removed = report.removed,
                    "discovery completed"
                );
                self.record(
                    "lookup_completed",
                    json!({
                        "token": token,
                        "status": snapshot.status,
                        "places": snapshot.places.len(),
                        "markers_added": report.added,
                        "markers_removed": report.removed,
                    }),
                );
                Ok(LookupOutcome::Completed(snapshot))
            }
            Err(err) => {
                session.fetch_failed(err.clone())?;
                let snapshot = session.snapshot();
                drop(session);
                warn!(
                    token,
                    ?err,
                    retry_count = snapshot.retry_count,
                    can_retry = snapshot.can_retry,
                    "place fetch failed"
                );
                self.record(
                    "fetch_failed",
                    json!({
                        "token": token,
                        "error": err.as_tag(),
                        "retryable": err.is_retryable(),
                        "retry_count": snapshot.retry_count,
                    }),
                );
                Ok(LookupOutcome::Completed(snapshot))
            }
        }
    }

    fn focus_if_current(&self, token: u64, location: &Location) {
        let session = self.session.lock();
        if session.token() == token {
            self.map
                .lock()
                .set_view(location.coordinates(), self.settings.focus_zoom);
        }
    }

    fn discard_stale(&self, token: u64, stage: &'static str) -> LookupOutcome {
        debug!(token, stage, "discarding result of superseded session");
        self.record(
            "stale_response_discarded",
            json!({ "token": token, "stage": stage }),
        );
        LookupOutcome::Superseded
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = u64::try_from(self.settings.retry_backoff.as_millis()).unwrap_or(u64::MAX);
        let exponent = attempt.saturating_sub(1).min(6);
        let jitter_ms = if base_ms == 0 {
            0
        } else {
            self.jitter_rng.lock().gen_range(0..base_ms)
        };
        let delay_ms = base_ms
            .saturating_mul(1 << exponent)
            .saturating_add(jitter_ms);
        Duration::from_millis(delay_ms).min(MAX_BACKOFF)
    }

    fn record_started(&self, token: u64, location: Option<&Location>) {
        self.record(
            "lookup_started",
            json!({
                "token": token,
                "geolocate": location.is_none(),
                "label": location.map(|location| location.label.as_str()),
            }),
        );
    }

    fn record(&self, name: &str, payload: Value) {
        if let Some(telemetry) = &self.telemetry {
            if let Err(err) = telemetry.record(name, payload) {
                warn!(?err, event = name, "failed to record telemetry event");
            }
        }
    }
}
