use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::query::Location;

const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    pub fn distance_meters(&self, other: &Coordinates) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (other.lon - self.lon).to_radians();
        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * a.sqrt().asin()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPlace {
    #[serde(rename = "type", default)]
    pub element_type: String,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub center: Option<Coordinates>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl RawPlace {
    fn identity(&self) -> Option<String> {
        let id = self.id?;
        if self.element_type.is_empty() {
            Some(id.to_string())
        } else {
            Some(format!("{}/{id}", self.element_type))
        }
    }

    fn coordinates(&self) -> Option<Coordinates> {
        let point = match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Coordinates { lat, lon },
            _ => self.center?,
        };
        point.is_valid().then_some(point)
    }

    fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    Restaurant,
    Cafe,
    FastFood,
    Bar,
    Pub,
    Hotel,
    GuestHouse,
    Unknown,
}

impl CategoryKind {
    fn from_tags(raw: &RawPlace) -> Self {
        let amenity = match raw.tag("amenity") {
            Some("restaurant") => Some(Self::Restaurant),
            Some("cafe") => Some(Self::Cafe),
            Some("fast_food") => Some(Self::FastFood),
            Some("bar") => Some(Self::Bar),
            Some("pub") => Some(Self::Pub),
            _ => None,
        };
        amenity
            .or_else(|| match raw.tag("tourism") {
                Some("hotel") => Some(Self::Hotel),
                Some("guest_house") => Some(Self::GuestHouse),
                _ => None,
            })
            .unwrap_or(Self::Unknown)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Restaurant => "Restaurant",
            Self::Cafe => "Cafe",
            Self::FastFood => "Fast food",
            Self::Bar => "Bar",
            Self::Pub => "Pub",
            Self::Hotel => "Hotel",
            Self::GuestHouse => "Guest house",
            Self::Unknown => "Place",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlaceAttributes {
    pub cuisine: Option<String>,
    pub opening_hours: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
}

impl PlaceAttributes {
    fn from_tags(raw: &RawPlace) -> Self {
        let owned = |key: &str| raw.tag(key).map(str::to_string);
        let street = match (raw.tag("addr:street"), raw.tag("addr:housenumber")) {
            (Some(street), Some(number)) => Some(format!("{street} {number}")),
            (Some(street), None) => Some(street.to_string()),
            _ => None,
        };
        Self {
            cuisine: owned("cuisine"),
            opening_hours: owned("opening_hours"),
            street,
            city: owned("addr:city"),
            phone: owned("phone").or_else(|| owned("contact:phone")),
            website: owned("website").or_else(|| owned("contact:website")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Place {
    pub id: String,
    pub coordinates: Coordinates,
    pub category_kind: CategoryKind,
    pub display_name: String,
    pub attributes: PlaceAttributes,
}

impl Place {
    pub fn from_raw(raw: &RawPlace) -> Option<Self> {
        let id = raw.identity()?;
        let coordinates = raw.coordinates()?;
        let category_kind = CategoryKind::from_tags(raw);
        let name = raw.tag("name");
        if name.is_none() && category_kind == CategoryKind::Unknown {
            return None;
        }
        let display_name = name.unwrap_or_else(|| category_kind.label()).to_string();
        Some(Self {
            id,
            coordinates,
            category_kind,
            display_name,
            attributes: PlaceAttributes::from_tags(raw),
        })
    }

    pub fn distance_meters(&self, location: &Location) -> f64 {
        self.coordinates.distance_meters(&location.coordinates())
    }
}

/// Filters and shapes backend elements. Order is preserved and the first
/// occurrence of an id wins.
pub fn normalize(raw: Vec<RawPlace>) -> Vec<Place> {
    let total = raw.len();
    let mut seen = HashSet::with_capacity(total);
    let places: Vec<Place> = raw
        .iter()
        .filter_map(Place::from_raw)
        .filter(|place| seen.insert(place.id.clone()))
        .collect();
    trace!(total, kept = places.len(), "normalized raw places");
    places
}
