use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use httptest::matchers::request;
use httptest::responders::json_encoded;
use httptest::{Expectation, Server};
use parking_lot::Mutex;
use serde_json::json;

use poi_discovery::{
    CategoryTag, Coordinates, DiscoveryEngine, DiscoverySettings, Location, LookupOutcome,
    LookupRequest, MapSurface, MarkerHandle, MarkerIcon, NoGeolocation, OverpassClient,
    PopupContent, SessionStatus,
};

#[derive(Default)]
struct WidgetMap {
    next: u64,
    markers: HashMap<u64, (MarkerIcon, String)>,
    adds: usize,
}

impl MapSurface for WidgetMap {
    fn add_marker(
        &mut self,
        _coordinates: Coordinates,
        icon: MarkerIcon,
        popup: &PopupContent,
    ) -> MarkerHandle {
        self.next += 1;
        self.adds += 1;
        self.markers.insert(self.next, (icon, popup.to_html()));
        MarkerHandle(self.next)
    }

    fn remove_marker(&mut self, handle: MarkerHandle) {
        self.markers.remove(&handle.0);
    }

    fn set_view(&mut self, _center: Coordinates, _zoom: u8) {}
}

#[tokio::test]
async fn restaurants_near_a_searched_location_land_on_the_map() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", "/api/interpreter")).respond_with(
            json_encoded(json!({
                "elements": [
                    { "type": "node", "id": 1, "lat": 40.001, "lon": -74.0,
                      "tags": { "amenity": "restaurant", "name": "Luigi's", "cuisine": "italian" } },
                    { "type": "node", "id": 2, "lat": 40.002, "lon": -74.0,
                      "tags": { "amenity": "restaurant" } },
                    { "type": "way", "id": 3, "center": { "lat": 40.003, "lon": -74.001 },
                      "tags": { "amenity": "restaurant", "name": "Pier 3" } },
                    { "type": "relation", "id": 4,
                      "tags": { "amenity": "restaurant", "name": "No Coordinates" } }
                ]
            })),
        ),
    );

    let source = OverpassClient::new(
        server.url("/api/interpreter").to_string(),
        "poi-discovery-tests",
    )
    .unwrap();
    let map = Arc::new(Mutex::new(WidgetMap::default()));
    let settings = DiscoverySettings {
        radius_meters: 1200,
        categories: BTreeSet::from([CategoryTag::Restaurant]),
        fetch_timeout: Duration::from_secs(5),
        ..DiscoverySettings::default()
    };
    let engine = DiscoveryEngine::new(
        Arc::new(source),
        Arc::new(NoGeolocation),
        map.clone(),
        settings,
    )
    .unwrap();

    let location = Location::new(40.0, -74.0, "Hoboken").unwrap();
    let outcome = engine.lookup(LookupRequest::At(location)).await.unwrap();

    let LookupOutcome::Completed(snapshot) = outcome else {
        panic!("lookup superseded");
    };
    assert_eq!(snapshot.status, SessionStatus::Success);
    assert_eq!(snapshot.places.len(), 3);
    assert_eq!(snapshot.message, "Found 3 places near Hoboken.");

    let map = map.lock();
    assert_eq!(map.adds, 3);
    assert!(map
        .markers
        .values()
        .all(|(icon, _)| *icon == MarkerIcon::Restaurant));
    assert!(map
        .markers
        .values()
        .any(|(_, html)| html.contains("Cuisine: italian")));
    assert!(map
        .markers
        .values()
        .any(|(_, html)| html.contains("<strong>Restaurant</strong>")));
}
