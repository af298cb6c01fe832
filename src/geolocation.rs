use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::normalize::Coordinates;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoFailure {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
    Unsupported,
}

impl fmt::Display for GeoFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::PermissionDenied => "permission denied",
            Self::PositionUnavailable => "position unavailable",
            Self::Timeout => "timed out",
            Self::Unsupported => "geolocation unsupported",
        };
        f.write_str(text)
    }
}

#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<Coordinates, GeoFailure>;
}

#[derive(Debug, Default)]
pub struct NoGeolocation;

#[async_trait]
impl GeolocationProvider for NoGeolocation {
    async fn current_position(&self) -> Result<Coordinates, GeoFailure> {
        Err(GeoFailure::Unsupported)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedPosition(pub Coordinates);

#[async_trait]
impl GeolocationProvider for FixedPosition {
    async fn current_position(&self) -> Result<Coordinates, GeoFailure> {
        Ok(self.0)
    }
}
