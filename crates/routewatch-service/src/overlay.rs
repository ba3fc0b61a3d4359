//! The map overlay: markers, the route layer and the graph layer.
//!
//! [`OverlayRenderer`] is implemented by whatever actually draws the map. Implementations only
//! provide the per-item primitives. The provided methods take care of clearing and redrawing
//! whole layers, and of skipping (and logging) items that fail to render, so one bad route never
//! takes the rest of the list down with it.
//!
//! [`MapOverlay`] is an in-memory renderer that keeps the layers as plain data.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::events::{Ambulance, Endpoint, GraphOverlayEntry, Hospital, RouteListEntry};
use crate::types::{Coordinate, PairId, ResolvedRoute, RouteSource};

/// The color routes are drawn in when the server does not pick one.
pub const DEFAULT_ROUTE_COLOR: &str = "blue";
/// The color graph paths are drawn in when the server does not pick one.
pub const DEFAULT_GRAPH_COLOR: &str = "gray";
/// Stroke width of route polylines.
pub const ROUTE_WEIGHT: u32 = 4;
/// Stroke width of graph polylines.
pub const GRAPH_WEIGHT: u32 = 2;

/// Why a single overlay item could not be drawn.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverlayError {
    #[error("geometry needs at least two points")]
    EmptyGeometry,
    #[error("geometry contains a non-finite coordinate")]
    NonFiniteCoordinate,
    #[error("unknown marker `{0}`")]
    UnknownMarker(String),
}

/// The overlay layers a renderer owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Routes,
    Graph,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    Ambulance,
    Hospital,
    /// An endpoint of a graph path. Lives on the graph layer.
    Endpoint,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub id: String,
    pub kind: MarkerKind,
    pub position: Coordinate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Marker {
    pub fn ambulance(ambulance: &Ambulance) -> Self {
        Self {
            id: ambulance.id.clone(),
            kind: MarkerKind::Ambulance,
            position: Coordinate::new(ambulance.lat, ambulance.lon),
            label: Some(format!("Ambulancia {}", ambulance.id)),
        }
    }

    pub fn hospital(hospital: &Hospital) -> Self {
        Self {
            id: hospital.nombre.clone(),
            kind: MarkerKind::Hospital,
            position: Coordinate::new(hospital.lat, hospital.lon),
            label: Some(format!("{} (Espera: {} min)", hospital.nombre, hospital.espera)),
        }
    }
}

/// A route as it is drawn on the route layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayRoute {
    pub pair: PairId,
    pub geometry: Vec<Coordinate>,
    pub color: String,
    pub weight: u32,
    pub tooltip: String,
    pub source: RouteSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_min: Option<f64>,
}

impl OverlayRoute {
    /// Styles a resolved route with the presentation fields of its route list entry.
    pub fn new(route: ResolvedRoute, entry: &RouteListEntry) -> Self {
        let mut tooltip = route.pair.to_string();
        if let Some(total) = entry.total_time_min {
            tooltip.push_str(&format!("\nTiempo total: {total} min"));
        }

        Self {
            pair: route.pair,
            geometry: route.geometry,
            color: entry
                .color
                .clone()
                .unwrap_or_else(|| DEFAULT_ROUTE_COLOR.to_owned()),
            weight: ROUTE_WEIGHT,
            tooltip,
            source: route.source,
            distance_km: route.distance_km,
            duration_min: route.duration_min,
        }
    }

    /// Swaps in new geometry for the same pair, keeping the styling.
    pub fn with_route(&self, route: ResolvedRoute) -> Self {
        Self {
            geometry: route.geometry,
            source: route.source,
            distance_km: route.distance_km,
            duration_min: route.duration_min,
            ..self.clone()
        }
    }
}

/// A graph path with its optional endpoint markers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphOverlay {
    pub path: Vec<Coordinate>,
    pub color: String,
    pub weight: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<Marker>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<Marker>,
}

impl From<GraphOverlayEntry> for GraphOverlay {
    fn from(entry: GraphOverlayEntry) -> Self {
        let endpoint = |endpoint: Endpoint| Marker {
            position: endpoint.coordinate(),
            label: Some(endpoint.id.clone()),
            id: endpoint.id,
            kind: MarkerKind::Endpoint,
        };

        Self {
            path: entry.path,
            color: entry
                .color
                .unwrap_or_else(|| DEFAULT_GRAPH_COLOR.to_owned()),
            weight: GRAPH_WEIGHT,
            origin: entry.origin.map(endpoint),
            destination: entry.destination.map(endpoint),
        }
    }
}

/// Checks that a polyline can be drawn.
pub fn validate_path(path: &[Coordinate]) -> Result<(), OverlayError> {
    if path.len() < 2 {
        return Err(OverlayError::EmptyGeometry);
    }
    if !path.iter().all(Coordinate::is_finite) {
        return Err(OverlayError::NonFiniteCoordinate);
    }
    Ok(())
}

/// Draws the overlay.
pub trait OverlayRenderer {
    /// Adds a marker, replacing any marker with the same id.
    fn add_marker(&mut self, marker: Marker) -> Result<(), OverlayError>;

    /// Moves a marker and, if given, rebinds its label.
    ///
    /// Fails with [`OverlayError::UnknownMarker`] if there is no such marker.
    fn move_marker(
        &mut self,
        id: &str,
        position: Coordinate,
        label: Option<String>,
    ) -> Result<(), OverlayError>;

    /// Removes everything from `layer`.
    fn clear_layer(&mut self, layer: Layer);

    /// Draws one route on the route layer.
    fn draw_route(&mut self, route: &OverlayRoute) -> Result<(), OverlayError>;

    /// Draws one graph path and its endpoints on the graph layer.
    fn draw_graph_path(&mut self, path: &GraphOverlay) -> Result<(), OverlayError>;

    /// Places the initial markers, skipping those that cannot be drawn.
    fn place_markers(&mut self, markers: Vec<Marker>) {
        for marker in markers {
            let id = marker.id.clone();
            if let Err(err) = self.add_marker(marker) {
                tracing::error!(marker = %id, error = %err, "Failed to place marker");
            }
        }
    }

    /// Applies a position update. An unknown marker is silently ignored.
    ///
    /// Returns whether a marker was moved.
    fn update_position(&mut self, id: &str, position: Coordinate, label: Option<String>) -> bool {
        match self.move_marker(id, position, label) {
            Ok(()) => true,
            Err(OverlayError::UnknownMarker(_)) => {
                tracing::trace!(marker = id, "Ignoring position of unknown marker");
                false
            }
            Err(err) => {
                tracing::error!(marker = id, error = %err, "Failed to move marker");
                false
            }
        }
    }

    /// Clears the route layer and draws `routes` on it.
    fn replace_routes(&mut self, routes: &[OverlayRoute]) {
        self.clear_layer(Layer::Routes);
        for route in routes {
            if let Err(err) = self.draw_route(route) {
                tracing::error!(pair = %route.pair, error = %err, "Failed to draw route");
            }
        }
    }

    /// Clears the graph layer and draws `paths` on it.
    fn replace_graph(&mut self, paths: &[GraphOverlay]) {
        self.clear_layer(Layer::Graph);
        for (index, path) in paths.iter().enumerate() {
            if let Err(err) = self.draw_graph_path(path) {
                tracing::error!(index, error = %err, "Failed to draw graph path");
            }
        }
    }
}

/// An [`OverlayRenderer`] that keeps the drawn overlay in memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MapOverlay {
    pub markers: BTreeMap<String, Marker>,
    pub routes: Vec<OverlayRoute>,
    pub graph: Vec<GraphOverlay>,
}

impl MapOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marker(&self, id: &str) -> Option<&Marker> {
        self.markers.get(id)
    }

    pub fn route(&self, pair: &PairId) -> Option<&OverlayRoute> {
        self.routes.iter().find(|route| &route.pair == pair)
    }
}

impl OverlayRenderer for MapOverlay {
    fn add_marker(&mut self, marker: Marker) -> Result<(), OverlayError> {
        if !marker.position.is_finite() {
            return Err(OverlayError::NonFiniteCoordinate);
        }
        self.markers.insert(marker.id.clone(), marker);
        Ok(())
    }

    fn move_marker(
        &mut self,
        id: &str,
        position: Coordinate,
        label: Option<String>,
    ) -> Result<(), OverlayError> {
        let marker = self
            .markers
            .get_mut(id)
            .ok_or_else(|| OverlayError::UnknownMarker(id.to_owned()))?;
        if !position.is_finite() {
            return Err(OverlayError::NonFiniteCoordinate);
        }

        marker.position = position;
        if label.is_some() {
            marker.label = label;
        }
        Ok(())
    }

    fn clear_layer(&mut self, layer: Layer) {
        match layer {
            Layer::Routes => self.routes.clear(),
            Layer::Graph => self.graph.clear(),
        }
    }

    fn draw_route(&mut self, route: &OverlayRoute) -> Result<(), OverlayError> {
        validate_path(&route.geometry)?;
        self.routes.push(route.clone());
        Ok(())
    }

    fn draw_graph_path(&mut self, path: &GraphOverlay) -> Result<(), OverlayError> {
        validate_path(&path.path)?;
        let mut endpoints = path.origin.iter().chain(&path.destination);
        if !endpoints.all(|marker| marker.position.is_finite()) {
            return Err(OverlayError::NonFiniteCoordinate);
        }
        self.graph.push(path.clone());
        Ok(())
    }
}
