use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::errors::{AppError, AppResult};
use crate::normalize::Coordinates;

pub const MAX_RADIUS_METERS: u32 = 2_000;
pub const DEFAULT_RADIUS_METERS: u32 = 1_500;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub label: String,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64, label: impl Into<String>) -> AppResult<Self> {
        let coordinates = Coordinates {
            lat: latitude,
            lon: longitude,
        };
        if !coordinates.is_valid() {
            return Err(AppError::InvalidLocation(format!(
                "({latitude}, {longitude}) is outside the valid coordinate range"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
            label: label.into(),
        })
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            lat: self.latitude,
            lon: self.longitude,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryTag {
    Restaurant,
    Cafe,
    FastFood,
    Bar,
    Pub,
    Hotel,
    GuestHouse,
}

impl CategoryTag {
    pub const ALL: [CategoryTag; 7] = [
        CategoryTag::Restaurant,
        CategoryTag::Cafe,
        CategoryTag::FastFood,
        CategoryTag::Bar,
        CategoryTag::Pub,
        CategoryTag::Hotel,
        CategoryTag::GuestHouse,
    ];

    pub fn as_tag(self) -> &'static str {
        match self {
            Self::Restaurant => "restaurant",
            Self::Cafe => "cafe",
            Self::FastFood => "fast_food",
            Self::Bar => "bar",
            Self::Pub => "pub",
            Self::Hotel => "hotel",
            Self::GuestHouse => "guest_house",
        }
    }

    pub fn osm_key(self) -> &'static str {
        match self {
            Self::Restaurant | Self::Cafe | Self::FastFood | Self::Bar | Self::Pub => "amenity",
            Self::Hotel | Self::GuestHouse => "tourism",
        }
    }

    fn predicate(self) -> String {
        format!("[\"{}\"=\"{}\"]", self.osm_key(), self.as_tag())
    }
}

impl FromStr for CategoryTag {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let needle = value.trim();
        Self::ALL
            .into_iter()
            .find(|tag| tag.as_tag().eq_ignore_ascii_case(needle))
            .ok_or_else(|| AppError::UnknownCategory(needle.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub center: Location,
    pub radius_meters: u32,
    pub categories: BTreeSet<CategoryTag>,
}

impl QuerySpec {
    pub fn new(
        center: Location,
        radius_meters: u32,
        categories: BTreeSet<CategoryTag>,
    ) -> AppResult<Self> {
        if radius_meters == 0 {
            return Err(AppError::InvalidQuery("radius must be positive".into()));
        }
        if categories.is_empty() {
            return Err(AppError::InvalidQuery(
                "at least one category is required".into(),
            ));
        }
        Ok(Self {
            center,
            radius_meters,
            categories,
        })
    }

    pub fn from_tags<S: AsRef<str>>(
        center: Location,
        radius_meters: u32,
        tags: &[S],
    ) -> AppResult<Self> {
        let categories = tags
            .iter()
            .map(|tag| tag.as_ref().parse::<CategoryTag>())
            .collect::<AppResult<BTreeSet<_>>>()?;
        Self::new(center, radius_meters, categories)
    }

    pub fn effective_radius(&self) -> u32 {
        self.radius_meters.min(MAX_RADIUS_METERS)
    }
}

pub fn build_query(spec: &QuerySpec, server_timeout: Duration) -> String {
    let radius = spec.effective_radius();
    let around = format!(
        "(around:{radius},{:.6},{:.6})",
        spec.center.latitude, spec.center.longitude
    );
    let mut query = format!(
        "[out:json][timeout:{}];\n(\n",
        server_timeout.as_secs().max(1)
    );
    for category in &spec.categories {
        let _ = writeln!(query, "  nwr{}{around};", category.predicate());
    }
    query.push_str(");\nout center tags;");
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    fn center() -> Location {
        Location::new(40.0, -74.0, "Test").unwrap()
    }

    #[test]
    fn emits_one_clause_per_category() {
        let spec = QuerySpec::from_tags(center(), 1200, &["restaurant", "hotel", "cafe"]).unwrap();
        let query = build_query(&spec, Duration::from_secs(25));

        assert!(query.starts_with("[out:json][timeout:25];"));
        assert_eq!(query.matches("nwr[").count(), 3);
        assert_eq!(
            query.matches("(around:1200,40.000000,-74.000000)").count(),
            3
        );
        assert!(query.contains("nwr[\"amenity\"=\"restaurant\"]"));
        assert!(query.contains("nwr[\"amenity\"=\"cafe\"]"));
        assert!(query.contains("nwr[\"tourism\"=\"hotel\"]"));
        assert!(query.ends_with("out center tags;"));
    }

    #[test]
    fn duplicate_tags_collapse_to_one_clause() {
        let spec = QuerySpec::from_tags(center(), 800, &["bar", "BAR", " bar "]).unwrap();
        let query = build_query(&spec, Duration::from_secs(10));
        assert_eq!(query.matches("nwr[").count(), 1);
    }

    #[test]
    fn clamps_radius_to_upper_bound() {
        let spec = QuerySpec::from_tags(center(), 50_000, &["pub"]).unwrap();
        assert_eq!(spec.effective_radius(), MAX_RADIUS_METERS);
        let query = build_query(&spec, Duration::from_secs(25));
        assert!(query.contains("(around:2000,"));
        assert!(!query.contains("50000"));
    }

    #[test]
    fn rejects_unknown_category() {
        let err = QuerySpec::from_tags(center(), 1200, &["restaurant", "museum"]).unwrap_err();
        assert!(matches!(err, AppError::UnknownCategory(tag) if tag == "museum"));
    }

    #[test]
    fn rejects_zero_radius_and_empty_categories() {
        assert!(matches!(
            QuerySpec::from_tags(center(), 0, &["cafe"]),
            Err(AppError::InvalidQuery(_))
        ));
        assert!(matches!(
            QuerySpec::new(center(), 1200, BTreeSet::new()),
            Err(AppError::InvalidQuery(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_location() {
        assert!(Location::new(91.0, 0.0, "north of north").is_err());
        assert!(Location::new(0.0, f64::NAN, "nowhere").is_err());
        assert!(Location::new(-33.86, 151.21, "Sydney").is_ok());
    }
}
