//! Payloads pushed by the dispatch server, and the initial entity snapshot.
//!
//! Field names follow the camelCase wire format. The older Spanish field names the server used
//! to send (`ambulancia`, `hospital`, `nodos`, `tiempo_total`) are accepted as aliases.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::{Coordinate, PairId};

/// Moves one ambulance marker.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdate {
    #[serde(alias = "ambulancia")]
    pub pair_id: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// The hospital the ambulance is heading to, if the server says so.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hospital: Option<String>,
}

impl PositionUpdate {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lon)
    }

    /// The popup text for the moved marker.
    ///
    /// An explicit label wins. Otherwise the marker reads `{pairId} → {hospital}` when the
    /// destination is known.
    pub fn display_label(&self) -> Option<String> {
        match (&self.label, &self.hospital) {
            (Some(label), _) => Some(label.clone()),
            (None, Some(hospital)) => Some(format!("{} → {}", self.pair_id, hospital)),
            (None, None) => None,
        }
    }
}

/// One route in a route list push.
///
/// `nodes` is the server's own geometry. When it already has more than two points it is drawn
/// as-is, otherwise its first and last nodes are resolved into a detailed route.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteListEntry {
    #[serde(alias = "ambulancia")]
    pub pair_id: String,
    #[serde(alias = "hospital")]
    pub counterpart_id: String,
    #[serde(alias = "nodos")]
    pub nodes: Vec<Coordinate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(
        default,
        alias = "tiempo_total",
        skip_serializing_if = "Option::is_none"
    )]
    pub total_time_min: Option<f64>,
}

impl RouteListEntry {
    pub fn pair(&self) -> PairId {
        PairId::new(self.pair_id.as_str(), self.counterpart_id.as_str())
    }
}

/// A labelled endpoint of a graph overlay path.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Endpoint {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
}

impl Endpoint {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lon)
    }
}

/// A path of the dispatch graph, drawn as-is without any resolution.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GraphOverlayEntry {
    pub path: Vec<Coordinate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Endpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<Endpoint>,
}

/// One event of the push stream.
///
/// Serialized as `{"event": "...", "data": ...}`, the envelope socket.io event recordings use.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum PushEvent {
    #[serde(alias = "update_position")]
    Position(PositionUpdate),
    #[serde(alias = "update_rutas")]
    Routes(Vec<RouteListEntry>),
    #[serde(alias = "update_grafo")]
    Graph(Vec<GraphOverlayEntry>),
}

impl PushEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Position(_) => "position",
            Self::Routes(_) => "routes",
            Self::Graph(_) => "graph",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Ambulance {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub especialidad: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Hospital {
    pub nombre: String,
    pub lat: f64,
    pub lon: f64,
    /// Current waiting time in minutes.
    #[serde(alias = "tiempo_espera")]
    pub espera: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pacientes_actuales: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacidad_max: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub porcentaje_ocupacion: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub puede_recibir: Option<bool>,
}

/// The entities shown before the first push event arrives.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Snapshot {
    #[serde(default, alias = "ambulancias")]
    pub ambulances: Vec<Ambulance>,
    #[serde(default, alias = "hospitales")]
    pub hospitals: Vec<Hospital>,
}

impl Snapshot {
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read(path)
            .with_context(|| format!("failed to read snapshot `{}`", path.display()))?;
        serde_json::from_slice(&contents).context("failed to parse snapshot JSON")
    }
}
