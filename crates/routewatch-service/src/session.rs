//! Feeds push events through the resolver into an overlay renderer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::{JoinError, JoinSet};

use crate::events::{GraphOverlayEntry, PositionUpdate, PushEvent, RouteListEntry, Snapshot};
use crate::overlay::{GraphOverlay, Marker, OverlayRenderer, OverlayRoute};
use crate::resolver::{Resolution, RouteRequest, RouteResolver};

/// The routes of the latest route list, as currently drawn.
#[derive(Debug, Default)]
struct RouteBoard {
    /// Bumped on every route list. Outcomes for an older list are discarded.
    generation: u64,
    routes: Vec<OverlayRoute>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A live map: the overlay state driven by one push event stream.
///
/// Route lists are drawn right away, with straight lines for every route that is still being
/// resolved. When a detailed route arrives later, the route layer is redrawn with it, as long
/// as no newer route list replaced the layer in the meantime.
pub struct MapSession<R> {
    resolver: RouteResolver,
    renderer: Arc<Mutex<R>>,
    board: Arc<Mutex<RouteBoard>>,
    upgrades: JoinSet<()>,
}

impl<R> MapSession<R>
where
    R: OverlayRenderer + Send + 'static,
{
    pub fn new(resolver: RouteResolver, renderer: R) -> Self {
        Self {
            resolver,
            renderer: Arc::new(Mutex::new(renderer)),
            board: Arc::default(),
            upgrades: JoinSet::new(),
        }
    }

    /// Places the ambulance and hospital markers of the initial snapshot.
    pub fn load_snapshot(&mut self, snapshot: &Snapshot) {
        let markers = snapshot
            .ambulances
            .iter()
            .map(Marker::ambulance)
            .chain(snapshot.hospitals.iter().map(Marker::hospital))
            .collect();
        lock(&self.renderer).place_markers(markers);
    }

    pub fn resolver(&self) -> &RouteResolver {
        &self.resolver
    }

    /// Runs `f` with the renderer.
    pub fn with_renderer<T>(&self, f: impl FnOnce(&R) -> T) -> T {
        f(&lock(&self.renderer))
    }

    /// Applies one push event. Must be called from within a tokio runtime.
    pub fn handle_event(&mut self, event: PushEvent) {
        self.reap_upgrades();
        tracing::trace!(event = event.name(), "Handling push event");
        match event {
            PushEvent::Position(update) => self.handle_position(update),
            PushEvent::Routes(entries) => self.handle_routes(entries),
            PushEvent::Graph(entries) => self.handle_graph(entries),
        }
    }

    fn handle_position(&mut self, update: PositionUpdate) {
        let label = update.display_label();
        lock(&self.renderer).update_position(&update.pair_id, update.coordinate(), label);
    }

    fn handle_routes(&mut self, entries: Vec<RouteListEntry>) {
        let mut board = lock(&self.board);
        board.generation += 1;
        board.routes.clear();
        let generation = board.generation;

        for entry in entries {
            let request = RouteRequest::new(entry.pair(), entry.nodes.clone());
            let resolution = match self.resolver.resolve(request) {
                Ok(resolution) => resolution,
                Err(err) => {
                    tracing::error!(error = %err, "Skipping route");
                    continue;
                }
            };

            let index = board.routes.len();
            board.routes.push(OverlayRoute::new(resolution.current().clone(), &entry));

            if let Resolution::Scheduled(pending) = resolution {
                let board = Arc::clone(&self.board);
                let renderer = Arc::clone(&self.renderer);
                self.upgrades.spawn(async move {
                    let route = pending.outcome().await;
                    if !route.source.is_detailed() {
                        return;
                    }

                    let mut board = lock(&board);
                    if board.generation != generation {
                        tracing::trace!(pair = %route.pair, "Dropping detailed route for a replaced route list");
                        return;
                    }
                    board.routes[index] = board.routes[index].with_route(route);
                    lock(&renderer).replace_routes(&board.routes);
                });
            }
        }

        lock(&self.renderer).replace_routes(&board.routes);
    }

    fn handle_graph(&mut self, entries: Vec<GraphOverlayEntry>) {
        let paths: Vec<GraphOverlay> = entries.into_iter().map(GraphOverlay::from).collect();
        lock(&self.renderer).replace_graph(&paths);
    }

    /// Releases upgrade tasks that already finished.
    fn reap_upgrades(&mut self) {
        while let Some(result) = self.upgrades.try_join_next() {
            log_upgrade_result(result);
        }
    }

    /// Waits until every scheduled route has been delivered.
    pub async fn settle(&mut self) {
        while let Some(result) = self.upgrades.join_next().await {
            log_upgrade_result(result);
        }
    }

    /// Stops resolving. Routes still pending stay drawn as straight lines.
    pub async fn shutdown(mut self) -> R
    where
        R: Clone,
    {
        self.resolver.shutdown();
        self.settle().await;
        let renderer = lock(&self.renderer);
        renderer.clone()
    }
}

fn log_upgrade_result(result: Result<(), JoinError>) {
    if let Err(err) = result {
        tracing::error!(error = &err as &dyn std::error::Error, "Route upgrade task failed");
    }
}
