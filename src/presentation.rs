use serde::Serialize;

use crate::normalize::{CategoryKind, Coordinates, Place};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerIcon {
    Restaurant,
    Cafe,
    FastFood,
    Bar,
    Pub,
    Hotel,
    GuestHouse,
    Generic,
}

impl MarkerIcon {
    pub fn for_category(kind: CategoryKind) -> Self {
        match kind {
            CategoryKind::Restaurant => Self::Restaurant,
            CategoryKind::Cafe => Self::Cafe,
            CategoryKind::FastFood => Self::FastFood,
            CategoryKind::Bar => Self::Bar,
            CategoryKind::Pub => Self::Pub,
            CategoryKind::Hotel => Self::Hotel,
            CategoryKind::GuestHouse => Self::GuestHouse,
            CategoryKind::Unknown => Self::Generic,
        }
    }

    pub fn glyph(self) -> &'static str {
        match self {
            Self::Restaurant => "🍽️",
            Self::Cafe => "☕",
            Self::FastFood => "🍔",
            Self::Bar => "🍸",
            Self::Pub => "🍺",
            Self::Hotel => "🏨",
            Self::GuestHouse => "🏠",
            Self::Generic => "📍",
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            Self::Restaurant => "poi-marker poi-restaurant",
            Self::Cafe => "poi-marker poi-cafe",
            Self::FastFood => "poi-marker poi-fast-food",
            Self::Bar => "poi-marker poi-bar",
            Self::Pub => "poi-marker poi-pub",
            Self::Hotel => "poi-marker poi-hotel",
            Self::GuestHouse => "poi-marker poi-guest-house",
            Self::Generic => "poi-marker",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopupLine {
    pub label: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopupContent {
    pub title: String,
    pub subtitle: &'static str,
    pub lines: Vec<PopupLine>,
}

impl PopupContent {
    pub fn to_html(&self) -> String {
        let mut html = format!(
            "<div class=\"poi-popup\"><strong>{}</strong><br><em>{}</em>",
            escape_html(&self.title),
            escape_html(self.subtitle)
        );
        for line in &self.lines {
            html.push_str(&format!(
                "<br>{}: {}",
                escape_html(line.label),
                escape_html(&line.value)
            ));
        }
        html.push_str("</div>");
        html
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerSpec {
    pub coordinates: Coordinates,
    pub icon: MarkerIcon,
    pub popup: PopupContent,
}

pub fn present(place: &Place) -> MarkerSpec {
    let attributes = &place.attributes;
    let address = match (&attributes.street, &attributes.city) {
        (Some(street), Some(city)) => Some(format!("{street}, {city}")),
        (Some(part), None) | (None, Some(part)) => Some(part.clone()),
        (None, None) => None,
    };
    let lines = [
        ("Cuisine", attributes.cuisine.clone()),
        ("Hours", attributes.opening_hours.clone()),
        ("Address", address),
        ("Phone", attributes.phone.clone()),
        ("Website", attributes.website.clone()),
    ]
    .into_iter()
    .filter_map(|(label, value)| value.map(|value| PopupLine { label, value }))
    .collect();

    MarkerSpec {
        coordinates: place.coordinates,
        icon: MarkerIcon::for_category(place.category_kind),
        popup: PopupContent {
            title: place.display_name.clone(),
            subtitle: place.category_kind.label(),
            lines,
        },
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
