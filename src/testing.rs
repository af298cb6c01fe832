use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::errors::DiscoveryError;
use crate::fetcher::PlaceSource;
use crate::map_sync::{MapSurface, MarkerHandle};
use crate::normalize::{Coordinates, RawPlace};
use crate::presentation::{MarkerIcon, PopupContent};

#[derive(Default)]
pub struct RecordingMap {
    next_handle: u64,
    live: BTreeMap<u64, PopupContent>,
    pub add_calls: usize,
    pub remove_calls: usize,
    pub views: Vec<(Coordinates, u8)>,
}

impl RecordingMap {
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, handle: MarkerHandle) -> bool {
        self.live.contains_key(&handle.0)
    }

    pub fn popup_titles(&self) -> Vec<String> {
        self.live.values().map(|popup| popup.title.clone()).collect()
    }
}

impl MapSurface for RecordingMap {
    fn add_marker(
        &mut self,
        _coordinates: Coordinates,
        _icon: MarkerIcon,
        popup: &PopupContent,
    ) -> MarkerHandle {
        self.next_handle += 1;
        self.add_calls += 1;
        self.live.insert(self.next_handle, popup.clone());
        MarkerHandle(self.next_handle)
    }

    fn remove_marker(&mut self, handle: MarkerHandle) {
        self.remove_calls += 1;
        self.live.remove(&handle.0);
    }

    fn set_view(&mut self, center: Coordinates, zoom: u8) {
        self.views.push((center, zoom));
    }
}

pub enum SourceStep {
    Respond(Vec<RawPlace>),
    Fail(DiscoveryError),
    Hang,
    Gated(Arc<Notify>, Vec<RawPlace>),
}

pub struct ScriptedSource {
    steps: Mutex<VecDeque<SourceStep>>,
    calls: AtomicUsize,
    pub started: Notify,
}

impl ScriptedSource {
    pub fn new(steps: Vec<SourceStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
            started: Notify::new(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlaceSource for ScriptedSource {
    async fn execute(&self, _query: &str) -> Result<Vec<RawPlace>, DiscoveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().pop_front();
        self.started.notify_one();
        match step {
            Some(SourceStep::Respond(elements)) => Ok(elements),
            Some(SourceStep::Fail(err)) => Err(err),
            Some(SourceStep::Hang) => std::future::pending().await,
            Some(SourceStep::Gated(release, elements)) => {
                release.notified().await;
                Ok(elements)
            }
            None => Ok(Vec::new()),
        }
    }
}

pub fn raw_node(id: u64, lat: f64, lon: f64, tags: &[(&str, &str)]) -> RawPlace {
    RawPlace {
        element_type: "node".into(),
        id: Some(id),
        lat: Some(lat),
        lon: Some(lon),
        center: None,
        tags: tags
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect(),
    }
}

pub fn restaurant(id: u64, name: &str) -> RawPlace {
    raw_node(
        id,
        40.0 + id as f64 * 0.001,
        -74.0,
        &[("amenity", "restaurant"), ("name", name)],
    )
}
