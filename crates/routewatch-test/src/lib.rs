//! Helpers for testing the resolver against a routing oracle.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - When using [`OracleServer`], make sure that the server is held until all requests to it
//!    have been made. If the server is dropped, the port is closed and every request to it
//!    fails. To avoid this, assign it to a variable: `let server = OracleServer::new();`.
//!
//!  - The mock server runs on a real socket, so tests using it cannot pause tokio time.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use axum::extract::{self, Request};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use reqwest::Url;
use serde_json::json;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

pub use tempfile::TempDir;

/// Distance of every route the mock oracle serves, in meters.
pub const ROUTE_DISTANCE_M: f64 = 5000.0;
/// Duration of every route the mock oracle serves, in seconds.
pub const ROUTE_DURATION_S: f64 = 600.0;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `routewatch` crates and mutes all
///    other logs (such as hyper or reqwest).
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("routewatch=trace,routewatch_service=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Creates a temporary directory.
///
/// The directory is deleted when the [`TempDir`] instance is dropped. Use it as a guard to
/// automatically clean up after tests.
pub fn tempdir() -> TempDir {
    TempDir::new().unwrap()
}

/// Returns the absolute path to the given fixture.
///
/// Fixtures are located in the `tests/fixtures` directory, located from the workspace root.
///
/// # Panics
///
/// Panics if the fixture path does not exist on the file system.
pub fn fixture(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();

    let mut full_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    full_path.pop(); // to /crates/
    full_path.pop(); // to /
    full_path.push("./tests/fixtures/");
    full_path.push(path);

    assert!(full_path.exists(), "'{}' does not exist", path.display());

    full_path
}

/// Returns the contents of a fixture.
///
/// # Panics
///
/// Panics if the fixture does not exist or cannot be read.
pub fn read_fixture(path: impl AsRef<Path>) -> Vec<u8> {
    std::fs::read(fixture(path)).unwrap()
}

/// A test server that binds to a random port and serves a web app.
///
/// This server requires a `tokio` runtime and is supposed to be run in a `tokio::test`. It
/// automatically stops serving when dropped.
#[derive(Debug)]
pub struct Server {
    pub handle: tokio::task::JoinHandle<()>,
    pub socket: SocketAddr,
}

impl Server {
    pub fn with_router(router: Router) -> Self {
        let listener = std::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();
        let listener = tokio::net::TcpListener::from_std(listener).unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { handle, socket }
    }

    /// Returns the socket address that this server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.socket
    }

    /// Returns the port that this server listens on.
    pub fn port(&self) -> u16 {
        self.addr().port()
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> Url {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.port(), path)
            .parse()
            .unwrap()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Parses the `{lon},{lat};{lon},{lat}` segment of an OSRM route request.
fn parse_waypoints(coords: &str) -> Option<[[f64; 2]; 2]> {
    let mut waypoints = coords.split(';').map(|waypoint| {
        let (lon, lat) = waypoint.split_once(',')?;
        Some([lon.parse().ok()?, lat.parse().ok()?])
    });
    let origin = waypoints.next()??;
    let destination = waypoints.next()??;
    Some([origin, destination])
}

/// A successful OSRM payload with a three point route between the requested waypoints.
pub fn detailed_route(coords: &str) -> Response {
    let Some([origin, destination]) = parse_waypoints(coords) else {
        return (StatusCode::BAD_REQUEST, "invalid waypoints").into_response();
    };
    let midpoint = [
        (origin[0] + destination[0]) / 2.0,
        (origin[1] + destination[1]) / 2.0,
    ];

    Json(json!({
        "code": "Ok",
        "waypoints": [],
        "routes": [{
            "geometry": {
                "type": "LineString",
                "coordinates": [origin, midpoint, destination],
            },
            "distance": ROUTE_DISTANCE_M,
            "duration": ROUTE_DURATION_S,
            "legs": [],
        }],
    }))
    .into_response()
}

/// A mock OSRM server that counts the requests it receives.
///
/// The base URLs for [`url`](Self::url) select how the server answers route requests:
///
/// - `/`: a detailed three-point route.
/// - `/empty/`: `code: Ok` with no routes.
/// - `/short/`: a route with just two points.
/// - `/rejected/`: `code: NoRoute`.
/// - `/status/{code}/`: an empty response with the given status.
/// - `/delay/{time}/`: a detailed route, after sleeping for `time` (e.g. `3s`).
/// - `/garbage/`: a body that is not JSON.
pub struct OracleServer {
    server: Server,
    hits: Arc<Mutex<BTreeMap<String, usize>>>,
}

impl OracleServer {
    pub fn new() -> Self {
        let hits = Arc::new(Mutex::new(BTreeMap::new()));

        let hitcounter = {
            let hits = hits.clone();
            move |extract::OriginalUri(uri): extract::OriginalUri, req: Request, next: Next| {
                let hits = hits.clone();
                async move {
                    {
                        let mut hits = hits.lock().unwrap();
                        let hits = hits.entry(uri.path().to_owned()).or_default();
                        *hits += 1;
                    }

                    next.run(req).await
                }
            }
        };

        let router = Router::new()
            .route(
                "/route/v1/:profile/:coords",
                get(|extract::Path((_, coords)): extract::Path<(String, String)>| async move {
                    detailed_route(&coords)
                }),
            )
            .route(
                "/empty/route/v1/:profile/:coords",
                get(|| async { Json(json!({"code": "Ok", "routes": []})) }),
            )
            .route(
                "/short/route/v1/:profile/:coords",
                get(|| async {
                    Json(json!({
                        "code": "Ok",
                        "routes": [{
                            "geometry": {"coordinates": [[-76.61, 2.44], [-76.60, 2.45]]},
                            "distance": 1200.0,
                            "duration": 90.0,
                        }],
                    }))
                }),
            )
            .route(
                "/rejected/route/v1/:profile/:coords",
                get(|| async {
                    Json(json!({"code": "NoRoute", "message": "Impossible route between points"}))
                }),
            )
            .route(
                "/status/:num/*tail",
                get(
                    |extract::Path((num, _)): extract::Path<(u16, String)>| async move {
                        StatusCode::from_u16(num).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                    },
                ),
            )
            .route(
                "/delay/:time/route/v1/:profile/:coords",
                get(
                    |extract::Path((time, _, coords)): extract::Path<(String, String, String)>| async move {
                        let duration = humantime::parse_duration(&time).unwrap();
                        tokio::time::sleep(duration).await;
                        detailed_route(&coords)
                    },
                ),
            )
            .route(
                "/garbage/*tail",
                get(|| async { ([("content-type", "application/json")], "<html>not json</html>") }),
            )
            .layer(middleware::from_fn(hitcounter));

        let server = Server::with_router(router);

        Self { server, hits }
    }

    /// Takes the total number of requests received so far, resetting the counter.
    pub fn accesses(&self) -> usize {
        let map = std::mem::take(&mut *self.hits.lock().unwrap());
        map.into_values().sum()
    }

    /// Takes the requests received so far by path, resetting the counter.
    pub fn all_hits(&self) -> Vec<(String, usize)> {
        let map = std::mem::take(&mut *self.hits.lock().unwrap());
        map.into_iter().collect()
    }

    pub fn url(&self, path: &str) -> Url {
        self.server.url(path)
    }
}

impl Default for OracleServer {
    fn default() -> Self {
        Self::new()
    }
}
