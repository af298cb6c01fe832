use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::normalize::{Coordinates, Place};
use crate::presentation::{present, MarkerIcon, MarkerSpec, PopupContent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MarkerHandle(pub u64);

pub trait MapSurface: Send {
    fn add_marker(
        &mut self,
        coordinates: Coordinates,
        icon: MarkerIcon,
        popup: &PopupContent,
    ) -> MarkerHandle;
    fn remove_marker(&mut self, handle: MarkerHandle);
    fn set_view(&mut self, center: Coordinates, zoom: u8);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.removed == 0
    }
}

#[derive(Debug)]
struct TrackedMarker {
    handle: MarkerHandle,
    spec: MarkerSpec,
}

/// Owns the place-discovery marker layer. Only markers this type created are
/// ever removed, so markers drawn by other features on the same map survive
/// every reconciliation.
#[derive(Debug, Default)]
pub struct MapLayerSync {
    markers: HashMap<String, TrackedMarker>,
}

impl MapLayerSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn placed_ids(&self) -> HashSet<String> {
        self.markers.keys().cloned().collect()
    }

    pub fn handle_for(&self, place_id: &str) -> Option<MarkerHandle> {
        self.markers.get(place_id).map(|tracked| tracked.handle)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn reconcile(&mut self, places: &[Place], map: &mut dyn MapSurface) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let wanted: HashSet<&str> = places.iter().map(|place| place.id.as_str()).collect();

        let departed: Vec<String> = self
            .markers
            .keys()
            .filter(|id| !wanted.contains(id.as_str()))
            .cloned()
            .collect();
        for id in departed {
            if let Some(tracked) = self.markers.remove(&id) {
                map.remove_marker(tracked.handle);
                report.removed += 1;
            }
        }

        let mut visited = HashSet::with_capacity(places.len());
        for place in places {
            if !visited.insert(place.id.as_str()) {
                continue;
            }
            let spec = present(place);
            match self.markers.get_mut(&place.id) {
                Some(tracked) if tracked.spec == spec => {}
                Some(tracked) => {
                    map.remove_marker(tracked.handle);
                    tracked.handle = map.add_marker(spec.coordinates, spec.icon, &spec.popup);
                    tracked.spec = spec;
                    report.updated += 1;
                }
                None => {
                    let handle = map.add_marker(spec.coordinates, spec.icon, &spec.popup);
                    self.markers
                        .insert(place.id.clone(), TrackedMarker { handle, spec });
                    report.added += 1;
                }
            }
        }

        if !report.is_noop() {
            debug!(
                added = report.added,
                updated = report.updated,
                removed = report.removed,
                placed = self.markers.len(),
                "reconciled place layer"
            );
        }
        report
    }

    pub fn clear(&mut self, map: &mut dyn MapSurface) -> usize {
        let removed = self.markers.len();
        for (_, tracked) in self.markers.drain() {
            map.remove_marker(tracked.handle);
        }
        removed
    }
}
