//! Offline drivers for the resolver: replaying recorded push streams and one-off lookups.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use routewatch_service::config::Config;
use routewatch_service::events::{PushEvent, Snapshot};
use routewatch_service::oracle::OsrmOracle;
use routewatch_service::overlay::MapOverlay;
use routewatch_service::resolver::{ResolverOptions, RouteRequest, RouteResolver};
use routewatch_service::session::MapSession;
use routewatch_service::types::{Coordinate, PairId, ResolvedRoute};

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .thread_name("routewatch")
        .enable_all()
        .build()
        .context("failed to create the runtime")
}

/// Creates a resolver talking to the configured oracle.
pub fn create_resolver(config: &Config) -> Result<RouteResolver> {
    let oracle = OsrmOracle::from_config(&config.oracle).context("failed to create HTTP client")?;
    tracing::debug!(url = %oracle.base_url(), "Using routing oracle");
    Ok(RouteResolver::new(
        Arc::new(oracle),
        ResolverOptions::from_config(config),
    ))
}

/// Parses newline-delimited push events. Blank lines are skipped.
pub fn read_events(reader: impl BufRead) -> Result<Vec<PushEvent>> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("failed to read events")?;
        if line.trim().is_empty() {
            continue;
        }
        let event = serde_json::from_str(&line)
            .with_context(|| format!("invalid push event on line {}", index + 1))?;
        events.push(event);
    }
    Ok(events)
}

/// Applies `events` to a fresh overlay and returns the overlay once every route has settled.
///
/// With a `pace`, events are spaced out like a live stream and outcomes may overlap with later
/// events. Without one, each event is settled before the next is applied.
pub async fn replay_events(
    resolver: RouteResolver,
    snapshot: Option<&Snapshot>,
    events: Vec<PushEvent>,
    pace: Option<Duration>,
) -> MapOverlay {
    let mut session = MapSession::new(resolver, MapOverlay::new());
    if let Some(snapshot) = snapshot {
        session.load_snapshot(snapshot);
    }

    for event in events {
        session.handle_event(event);
        match pace {
            Some(pace) => tokio::time::sleep(pace).await,
            None => session.settle().await,
        }
    }

    session.settle().await;
    session.with_renderer(MapOverlay::clone)
}

/// Replays the events in `path` and prints the final overlay to `stdout`.
pub fn run(config: &Config, path: &Path, pace: Option<Duration>) -> Result<()> {
    let file = File::open(path)
        .with_context(|| format!("failed to open events file `{}`", path.display()))?;
    let events = read_events(BufReader::new(file))?;
    let snapshot = config
        .snapshot
        .as_deref()
        .map(Snapshot::from_path)
        .transpose()?;

    tracing::info!(events = events.len(), "Replaying push events");
    let runtime = runtime()?;
    let overlay = runtime.block_on(async {
        let resolver = create_resolver(config)?;
        anyhow::Ok(replay_events(resolver, snapshot.as_ref(), events, pace).await)
    })?;

    println!("{}", serde_json::to_string_pretty(&overlay)?);
    Ok(())
}

/// Resolves one route with the full pipeline, including the debounce delay.
pub async fn resolve_route(
    resolver: &RouteResolver,
    origin: Coordinate,
    destination: Coordinate,
) -> Result<ResolvedRoute> {
    let request = RouteRequest::new(PairId::new("origin", "destination"), vec![origin, destination]);
    let resolution = resolver.resolve(request)?;
    Ok(resolution.into_final().await)
}

/// Resolves a single route and prints it to `stdout`.
pub fn resolve_one(config: &Config, origin: Coordinate, destination: Coordinate) -> Result<()> {
    let runtime = runtime()?;
    let route = runtime.block_on(async {
        let resolver = create_resolver(config)?;
        resolve_route(&resolver, origin, destination).await
    })?;

    if !route.source.is_detailed() {
        tracing::warn!("No detailed route available, showing a straight line");
    }
    println!("{}", serde_json::to_string_pretty(&route)?);
    Ok(())
}
