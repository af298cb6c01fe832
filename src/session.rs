use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::{AppError, AppResult, DiscoveryError};
use crate::geolocation::GeoFailure;
use crate::normalize::Place;
use crate::query::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Locating,
    Fetching,
    Success,
    Empty,
    Error,
}

#[derive(Debug, Clone)]
pub struct DiscoverySession {
    token: u64,
    status: SessionStatus,
    location: Option<Location>,
    places: Vec<Place>,
    error: Option<DiscoveryError>,
    retry_count: u32,
    max_retries: u32,
    started_at: DateTime<Utc>,
}

impl DiscoverySession {
    pub fn idle(token: u64, max_retries: u32) -> Self {
        Self {
            token,
            status: SessionStatus::Idle,
            location: None,
            places: Vec::new(),
            error: None,
            retry_count: 0,
            max_retries,
            started_at: Utc::now(),
        }
    }

    pub fn locating(token: u64, max_retries: u32) -> Self {
        Self {
            status: SessionStatus::Locating,
            ..Self::idle(token, max_retries)
        }
    }

    pub fn fetching(token: u64, location: Location, max_retries: u32) -> Self {
        Self {
            status: SessionStatus::Fetching,
            location: Some(location),
            ..Self::idle(token, max_retries)
        }
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    pub fn places(&self) -> &[Place] {
        &self.places
    }

    pub fn error(&self) -> Option<&DiscoveryError> {
        self.error.as_ref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn location_resolved(&mut self, location: Location) -> AppResult<()> {
        self.require(SessionStatus::Locating, "resolve location")?;
        self.location = Some(location);
        self.status = SessionStatus::Fetching;
        Ok(())
    }

    pub fn location_failed(&mut self, reason: GeoFailure) -> AppResult<()> {
        self.require(SessionStatus::Locating, "fail location")?;
        self.error = Some(DiscoveryError::LocationUnavailable { reason });
        self.status = SessionStatus::Error;
        Ok(())
    }

    pub fn fetch_succeeded(&mut self, places: Vec<Place>) -> AppResult<()> {
        self.require(SessionStatus::Fetching, "complete fetch")?;
        self.status = if places.is_empty() {
            SessionStatus::Empty
        } else {
            SessionStatus::Success
        };
        self.places = places;
        self.error = None;
        Ok(())
    }

    /// Records a failed fetch attempt. `retry_count` counts failed attempts,
    /// so the session turns terminal once it reaches `max_retries`.
    pub fn fetch_failed(&mut self, error: DiscoveryError) -> AppResult<()> {
        self.require(SessionStatus::Fetching, "fail fetch")?;
        self.retry_count = (self.retry_count + 1).min(self.max_retries);
        self.error = Some(error);
        self.status = SessionStatus::Error;
        Ok(())
    }

    pub fn begin_retry(&mut self) -> AppResult<()> {
        self.require(SessionStatus::Error, "retry")?;
        match &self.error {
            Some(err) if !err.is_fetch_failure() => Err(AppError::RetryRejected(
                "location is unavailable; start a new lookup".into(),
            )),
            _ if self.retry_count >= self.max_retries => Err(AppError::RetryRejected(format!(
                "retry limit of {} reached; start a new lookup",
                self.max_retries
            ))),
            _ => {
                self.status = SessionStatus::Fetching;
                Ok(())
            }
        }
    }

    pub fn can_retry(&self) -> bool {
        self.status == SessionStatus::Error
            && self.error.as_ref().is_some_and(DiscoveryError::is_fetch_failure)
            && self.retry_count < self.max_retries
    }

    pub fn is_terminal(&self) -> bool {
        self.status == SessionStatus::Error && !self.can_retry()
    }

    pub fn places_by_distance(&self) -> Vec<&Place> {
        let mut ordered: Vec<&Place> = self.places.iter().collect();
        if let Some(origin) = &self.location {
            ordered.sort_by(|a, b| a.distance_meters(origin).total_cmp(&b.distance_meters(origin)));
        }
        ordered
    }

    pub fn status_message(&self) -> String {
        let near = self
            .location
            .as_ref()
            .map(|location| location.label.as_str())
            .filter(|label| !label.is_empty())
            .unwrap_or("the selected location");
        match self.status {
            SessionStatus::Idle => "Choose a location to discover nearby places.".into(),
            SessionStatus::Locating => "Finding your location...".into(),
            SessionStatus::Fetching if self.retry_count > 0 => format!(
                "Searching near {near} (attempt {} of {})...",
                self.retry_count + 1,
                self.max_retries
            ),
            SessionStatus::Fetching => format!("Searching for places near {near}..."),
            SessionStatus::Success if self.places.len() == 1 => format!("Found 1 place near {near}."),
            SessionStatus::Success => format!("Found {} places near {near}.", self.places.len()),
            SessionStatus::Empty => {
                format!("No places found within the search area near {near}.")
            }
            SessionStatus::Error => match &self.error {
                Some(DiscoveryError::LocationUnavailable { reason }) => format!(
                    "Could not determine your location ({reason}). Try again or search for a place."
                ),
                Some(err) if self.can_retry() => format!(
                    "Could not load places: {err}. You can retry ({} left).",
                    self.max_retries - self.retry_count
                ),
                Some(err) => {
                    format!("Could not load places: {err}. Start a new search to try again.")
                }
                None => "Something went wrong. Start a new search.".into(),
            },
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            token: self.token,
            status: self.status,
            message: self.status_message(),
            location: self.location.clone(),
            places: self.places.clone(),
            error: self.error.clone(),
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            can_retry: self.can_retry(),
            started_at: self.started_at,
        }
    }

    fn require(&self, required: SessionStatus, event: &'static str) -> AppResult<()> {
        if self.status == required {
            Ok(())
        } else {
            Err(AppError::InvalidTransition {
                from: self.status,
                event,
            })
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub token: u64,
    pub status: SessionStatus,
    pub message: String,
    pub location: Option<Location>,
    pub places: Vec<Place>,
    pub error: Option<DiscoveryError>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub can_retry: bool,
    pub started_at: DateTime<Utc>,
}
