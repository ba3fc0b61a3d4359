use std::time::Duration;

use routewatch_service::resolver::{Resolution, RouteRequest};
use routewatch_service::types::{Coordinate, PairId, RouteSource};

use crate::{OracleServer, setup_resolver};

fn request(ambulance: &str, origin: Coordinate) -> RouteRequest {
    RouteRequest::new(
        PairId::new(ambulance, "San José"),
        vec![origin, Coordinate::new(2.441981, -76.612537)],
    )
}

#[tokio::test]
async fn test_resolves_and_caches() {
    let server = OracleServer::new();
    let resolver = setup_resolver(server.url("/"), |_| {});
    let origin = Coordinate::new(2.4448, -76.6147);

    let resolution = resolver.resolve(request("A1", origin)).unwrap();
    assert_eq!(resolution.current().source, RouteSource::Fallback);

    let route = resolution.into_final().await;
    assert_eq!(route.source, RouteSource::Detailed);
    assert_eq!(route.geometry.len(), 3);
    assert_eq!(route.distance_km, Some(5.0));
    assert_eq!(route.duration_min, Some(10.0));

    // same pair after the ambulance moved less than the key precision
    let again = resolver
        .resolve(request("A1", Coordinate::new(2.44480004, -76.6147)))
        .unwrap();
    let Resolution::Ready(cached) = again else {
        panic!("expected a cache hit");
    };
    assert_eq!(cached.source, RouteSource::Cached);

    assert_eq!(server.accesses(), 1);
    assert_eq!(resolver.pending_len(), 0);
}

#[tokio::test]
async fn test_server_error_falls_back() {
    let server = OracleServer::new();
    let resolver = setup_resolver(server.url("status/503"), |_| {});
    let origin = Coordinate::new(2.4448, -76.6147);

    let route = resolver
        .resolve(request("A1", origin))
        .unwrap()
        .into_final()
        .await;
    assert_eq!(route.source, RouteSource::Fallback);
    assert_eq!(route.distance_km, None);
    assert_eq!(resolver.cache_len(), 0);

    // failures are not cached, the next push asks again
    let route = resolver
        .resolve(request("A1", origin))
        .unwrap()
        .into_final()
        .await;
    assert_eq!(route.source, RouteSource::Fallback);
    assert_eq!(server.accesses(), 2);
}

#[tokio::test]
async fn test_timeout_falls_back() {
    let server = OracleServer::new();
    let resolver = setup_resolver(server.url("delay/10s"), |config| {
        config.oracle.timeout = Duration::from_millis(200);
    });
    let origin = Coordinate::new(2.4448, -76.6147);

    let resolution = resolver.resolve(request("A1", origin)).unwrap();
    // the pair is pending while the request hangs
    let duplicate = resolver.resolve(request("A1", origin)).unwrap();
    assert!(matches!(duplicate, Resolution::Ready(_)));

    let route = resolution.into_final().await;
    assert_eq!(route.source, RouteSource::Fallback);
    assert_eq!(resolver.pending_len(), 0);
    assert_eq!(server.accesses(), 1);
}

#[tokio::test]
async fn test_burst_only_requests_last_pair() {
    let server = OracleServer::new();
    let resolver = setup_resolver(server.url("/"), |_| {});

    let resolutions = resolver.resolve_batch([
        request("A1", Coordinate::new(2.40, -76.60)),
        request("A2", Coordinate::new(2.41, -76.60)),
        request("A3", Coordinate::new(2.42, -76.60)),
    ]);

    let mut sources = Vec::new();
    for resolution in resolutions {
        sources.push(resolution.unwrap().into_final().await.source);
    }

    assert_eq!(
        sources,
        [RouteSource::Fallback, RouteSource::Fallback, RouteSource::Detailed]
    );
    assert_eq!(server.accesses(), 1);
    assert_eq!(resolver.pending_len(), 0);
}
