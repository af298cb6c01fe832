use std::collections::BTreeSet;
use std::time::Duration;
use std::{env, io};

use serde::Serialize;
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::query::{CategoryTag, DEFAULT_RADIUS_METERS};

const DEFAULT_OVERPASS_ENDPOINT: &str = "https://overpass-api.de/api/interpreter";
const DEFAULT_FETCH_TIMEOUT_MS: u64 = 25_000;
const DEFAULT_GEOLOCATION_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;
const DEFAULT_FOCUS_ZOOM: u8 = 15;
pub const MAX_RETRIES_CAP: u32 = 3;
const DEFAULT_TELEMETRY_BUFFER_MAX_BYTES: u64 = 5 * 1024 * 1024;
const DEFAULT_TELEMETRY_BUFFER_MAX_FILES: usize = 5;

#[derive(Clone, Debug, Serialize)]
pub struct AppConfig {
    pub overpass_endpoint: String,
    pub http_user_agent: String,
    pub radius_meters: u32,
    pub categories: Vec<String>,
    pub fetch_timeout_ms: u64,
    pub geolocation_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub focus_zoom: u8,
    pub telemetry_enabled: bool,
    pub telemetry_batch_size: usize,
    pub telemetry_buffer_max_bytes: u64,
    pub telemetry_buffer_max_files: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            overpass_endpoint: DEFAULT_OVERPASS_ENDPOINT.to_string(),
            http_user_agent: default_user_agent(),
            radius_meters: DEFAULT_RADIUS_METERS,
            categories: CategoryTag::ALL
                .iter()
                .map(|tag| tag.as_tag().to_string())
                .collect(),
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            geolocation_timeout_ms: DEFAULT_GEOLOCATION_TIMEOUT_MS,
            max_retries: MAX_RETRIES_CAP,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            focus_zoom: DEFAULT_FOCUS_ZOOM,
            telemetry_enabled: true,
            telemetry_batch_size: 25,
            telemetry_buffer_max_bytes: DEFAULT_TELEMETRY_BUFFER_MAX_BYTES,
            telemetry_buffer_max_files: DEFAULT_TELEMETRY_BUFFER_MAX_FILES,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        let defaults = Self::default();
        Self {
            overpass_endpoint: env::var("OVERPASS_ENDPOINT")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.overpass_endpoint),
            http_user_agent: env::var("HTTP_USER_AGENT")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.http_user_agent),
            radius_meters: parse_u32("DISCOVERY_RADIUS_METERS", defaults.radius_meters),
            categories: env::var("DISCOVERY_CATEGORIES")
                .ok()
                .map(|raw| {
                    raw.split(',')
                        .map(|tag| tag.trim().to_string())
                        .filter(|tag| !tag.is_empty())
                        .collect::<Vec<_>>()
                })
                .filter(|tags| !tags.is_empty())
                .unwrap_or(defaults.categories),
            fetch_timeout_ms: parse_u64("FETCH_TIMEOUT_MS", defaults.fetch_timeout_ms).max(1),
            geolocation_timeout_ms: parse_u64(
                "GEOLOCATION_TIMEOUT_MS",
                defaults.geolocation_timeout_ms,
            )
            .max(1),
            max_retries: parse_u32("DISCOVERY_MAX_RETRIES", defaults.max_retries)
                .clamp(1, MAX_RETRIES_CAP),
            retry_backoff_ms: parse_u64("RETRY_BACKOFF_MS", defaults.retry_backoff_ms),
            focus_zoom: parse_u32("MAP_FOCUS_ZOOM", u32::from(defaults.focus_zoom)).min(20) as u8,
            telemetry_enabled: parse_bool("TELEMETRY_ENABLED", defaults.telemetry_enabled),
            telemetry_batch_size: parse_usize("TELEMETRY_BATCH_SIZE", defaults.telemetry_batch_size)
                .max(1),
            telemetry_buffer_max_bytes: parse_u64(
                "TELEMETRY_BUFFER_MAX_BYTES",
                defaults.telemetry_buffer_max_bytes,
            ),
            telemetry_buffer_max_files: parse_usize(
                "TELEMETRY_BUFFER_MAX_FILES",
                defaults.telemetry_buffer_max_files,
            )
            .max(1),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DiscoverySettings {
    pub radius_meters: u32,
    pub categories: BTreeSet<CategoryTag>,
    pub fetch_timeout: Duration,
    pub geolocation_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub focus_zoom: u8,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            radius_meters: DEFAULT_RADIUS_METERS,
            categories: CategoryTag::ALL.into_iter().collect(),
            fetch_timeout: Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS),
            geolocation_timeout: Duration::from_millis(DEFAULT_GEOLOCATION_TIMEOUT_MS),
            max_retries: MAX_RETRIES_CAP,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            focus_zoom: DEFAULT_FOCUS_ZOOM,
        }
    }
}

impl DiscoverySettings {
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        if config.radius_meters == 0 {
            return Err(AppError::Config(
                "DISCOVERY_RADIUS_METERS must be positive".into(),
            ));
        }
        let categories = config
            .categories
            .iter()
            .map(|tag| tag.parse::<CategoryTag>())
            .collect::<AppResult<BTreeSet<_>>>()?;
        if categories.is_empty() {
            return Err(AppError::Config(
                "DISCOVERY_CATEGORIES must name at least one category".into(),
            ));
        }
        Ok(Self {
            radius_meters: config.radius_meters,
            categories,
            fetch_timeout: Duration::from_millis(config.fetch_timeout_ms),
            geolocation_timeout: Duration::from_millis(config.geolocation_timeout_ms),
            max_retries: config.max_retries.clamp(1, MAX_RETRIES_CAP),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            focus_zoom: config.focus_zoom,
        })
    }
}

fn default_user_agent() -> String {
    format!("poi-discovery/{}", env!("CARGO_PKG_VERSION"))
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn parse_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default)
}
