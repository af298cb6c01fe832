use std::time::Duration;

use httptest::matchers::request;
use httptest::responders::{delay_and_then, json_encoded, status_code};
use httptest::{Expectation, Server};
use serde_json::json;

use poi_discovery::{
    CancelToken, DiscoveryError, OverpassClient, PlaceFetcher, PlaceSource,
};

const PATH: &str = "/api/interpreter";

fn client_for(server: &Server) -> OverpassClient {
    OverpassClient::new(server.url(PATH).to_string(), "poi-discovery-tests").unwrap()
}

#[tokio::test]
async fn returns_elements_from_backend() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", PATH)).respond_with(json_encoded(
            json!({
                "version": 0.6,
                "elements": [
                    {
                        "type": "node",
                        "id": 101,
                        "lat": 40.001,
                        "lon": -74.0,
                        "tags": { "amenity": "cafe", "name": "Bean There" }
                    },
                    {
                        "type": "way",
                        "id": 202,
                        "center": { "lat": 40.002, "lon": -74.001 },
                        "tags": { "tourism": "hotel" }
                    }
                ]
            }),
        )),
    );

    let elements = client_for(&server).execute("[out:json];").await.unwrap();

    assert_eq!(elements.len(), 2);
    assert_eq!(elements[0].id, Some(101));
    assert_eq!(elements[1].element_type, "way");
    assert!(elements[1].center.is_some());
}

#[tokio::test]
async fn non_success_status_maps_to_http_error() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", PATH))
            .times(2)
            .respond_with(status_code(504)),
    );
    let client = client_for(&server);

    let err = client.execute("q").await.unwrap_err();
    assert_eq!(err, DiscoveryError::HttpError { status: 504 });
    assert!(err.is_retryable());

    // Same outcome on a second call: the client keeps no state between requests.
    assert_eq!(client.execute("q").await.unwrap_err(), err);
}

#[tokio::test]
async fn client_errors_are_not_retryable() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", PATH))
            .respond_with(status_code(400).body("parse error")),
    );

    let err = client_for(&server).execute("bad query").await.unwrap_err();
    assert_eq!(err, DiscoveryError::HttpError { status: 400 });
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn missing_elements_is_malformed() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", PATH))
            .respond_with(json_encoded(json!({ "remark": "runtime error: out of memory" }))),
    );

    let err = client_for(&server).execute("q").await.unwrap_err();
    assert!(matches!(err, DiscoveryError::MalformedResponse { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn html_error_page_is_malformed() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", PATH))
            .respond_with(status_code(200).body("<html>rate limited</html>")),
    );

    let err = client_for(&server).execute("q").await.unwrap_err();
    assert!(matches!(err, DiscoveryError::MalformedResponse { .. }));
}

#[tokio::test]
async fn slow_backend_hits_the_deadline() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", PATH)).respond_with(delay_and_then(
            Duration::from_millis(800),
            json_encoded(json!({ "elements": [] })),
        )),
    );
    let fetcher = PlaceFetcher::new(std::sync::Arc::new(client_for(&server)));

    let err = fetcher
        .fetch("q", Duration::from_millis(100), &CancelToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, DiscoveryError::Timeout);
}

#[tokio::test]
async fn refused_connection_is_a_network_error() {
    let client = OverpassClient::new("http://127.0.0.1:1/api/interpreter", "tests").unwrap();

    let err = client.execute("q").await.unwrap_err();

    assert!(matches!(err, DiscoveryError::NetworkError { .. }));
    assert!(err.is_retryable());
}
