use std::time::Duration;

use routewatch_service::config::OracleConfig;
use routewatch_service::oracle::{OsrmOracle, RouteError, RoutingOracle};
use routewatch_service::types::Coordinate;
use routewatch_test as test;

use crate::OracleServer;

const ORIGIN: Coordinate = Coordinate::new(2.4448, -76.6147);
const DESTINATION: Coordinate = Coordinate::new(2.441981, -76.612537);

fn oracle(server: &OracleServer, path: &str) -> OsrmOracle {
    test::setup();
    let config = OracleConfig {
        url: server.url(path),
        timeout: Duration::from_millis(500),
        ..OracleConfig::default()
    };
    OsrmOracle::from_config(&config).unwrap()
}

#[tokio::test]
async fn test_detailed_route() {
    let server = OracleServer::new();
    let oracle = oracle(&server, "/");

    let response = oracle.fetch_route(ORIGIN, DESTINATION).await.unwrap();
    let summary = response.into_summary().unwrap();

    assert_eq!(summary.geometry.len(), 3);
    assert_eq!(summary.geometry[0], ORIGIN);
    assert_eq!(summary.geometry[2], DESTINATION);
    assert_eq!(summary.distance_km, 5.0);
    assert_eq!(summary.duration_min, 10.0);

    assert_eq!(
        server.all_hits(),
        [(
            "/route/v1/driving/-76.6147,2.4448;-76.612537,2.441981".to_owned(),
            1
        )]
    );
}

#[tokio::test]
async fn test_unusable_responses() {
    let server = OracleServer::new();

    let response = oracle(&server, "empty").fetch_route(ORIGIN, DESTINATION).await;
    assert_eq!(response.unwrap().into_summary(), Err(RouteError::NoRoute));

    let response = oracle(&server, "short").fetch_route(ORIGIN, DESTINATION).await;
    assert_eq!(
        response.unwrap().into_summary(),
        Err(RouteError::TooFewPoints(2))
    );

    let response = oracle(&server, "rejected").fetch_route(ORIGIN, DESTINATION).await;
    assert!(matches!(
        response.unwrap().into_summary(),
        Err(RouteError::Rejected(reason)) if reason.starts_with("NoRoute")
    ));

    assert_eq!(server.accesses(), 3);
}

#[tokio::test]
async fn test_transport_errors() {
    let server = OracleServer::new();

    let result = oracle(&server, "status/500").fetch_route(ORIGIN, DESTINATION).await;
    assert_eq!(result, Err(RouteError::Status(500)));

    let result = oracle(&server, "status/404").fetch_route(ORIGIN, DESTINATION).await;
    assert_eq!(result, Err(RouteError::Status(404)));

    let result = oracle(&server, "garbage").fetch_route(ORIGIN, DESTINATION).await;
    assert!(matches!(result, Err(RouteError::Malformed(_))), "{result:?}");

    let result = oracle(&server, "delay/5s").fetch_route(ORIGIN, DESTINATION).await;
    assert_eq!(result, Err(RouteError::Timeout(Duration::from_millis(500))));
}

#[tokio::test]
async fn test_connection_refused() {
    test::setup();

    // grab a free port and release it again, so nothing listens there
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = OracleConfig {
        url: format!("http://127.0.0.1:{port}/").parse().unwrap(),
        ..OracleConfig::default()
    };
    let oracle = OsrmOracle::from_config(&config).unwrap();

    let result = oracle.fetch_route(ORIGIN, DESTINATION).await;
    assert!(matches!(result, Err(RouteError::Download(_))), "{result:?}");
}
