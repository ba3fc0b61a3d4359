use routewatch_service::events::{PushEvent, Snapshot};
use routewatch_service::overlay::MapOverlay;
use routewatch_service::session::MapSession;
use routewatch_service::types::{PairId, RouteSource};

use crate::{OracleServer, read_fixture, setup_resolver};

fn events() -> Vec<PushEvent> {
    let contents = read_fixture("events.ndjson");
    std::str::from_utf8(&contents)
        .unwrap()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_replay_recorded_events() {
    let server = OracleServer::new();
    let resolver = setup_resolver(server.url("/"), |_| {});
    let snapshot: Snapshot = serde_json::from_slice(&read_fixture("snapshot.json")).unwrap();

    let mut session = MapSession::new(resolver, MapOverlay::new());
    session.load_snapshot(&snapshot);
    for event in events() {
        session.handle_event(event);
        session.settle().await;
    }

    session.with_renderer(|overlay| {
        assert_eq!(overlay.markers.len(), 5);

        // moved by the position updates, with the label rebound to its destination
        let a1 = overlay.marker("A1").unwrap();
        assert_eq!(a1.position.lat, 2.4431);
        assert_eq!(a1.label.as_deref(), Some("A1 → Hospital San José"));

        // the second route list replaced the first one entirely
        assert_eq!(overlay.routes.len(), 2);

        let a1 = overlay.route(&PairId::new("A1", "Hospital San José")).unwrap();
        assert_eq!(a1.source, RouteSource::Detailed);
        assert_eq!(a1.color, "red");
        assert_eq!(a1.tooltip, "A1 → Hospital San José\nTiempo total: 4 min");

        let a2 = overlay.route(&PairId::new("A2", "Clínica La Estancia")).unwrap();
        assert_eq!(a2.source, RouteSource::Supplied);
        assert_eq!(a2.geometry.len(), 4);
        assert_eq!(a2.color, "blue");

        assert_eq!(overlay.graph.len(), 1);
        assert_eq!(overlay.graph[0].origin.as_ref().unwrap().id, "N1");
    });

    // A1 lost the debounce slot to A3 in the first list and was only resolved for the second
    assert_eq!(server.accesses(), 2);
}
