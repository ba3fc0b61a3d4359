//! Core value types shared by the resolver, the cache and the overlay.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of decimal digits coordinates are quantized to before they form a cache key.
pub const COORDINATE_PRECISION: u32 = 6;

const MICRODEGREES: f64 = 10u32.pow(COORDINATE_PRECISION) as f64;

/// A geographic position in decimal degrees.
///
/// Serialized as a `[lat, lon]` pair, which is the shape the dispatch server uses for route
/// nodes and graph paths.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Both components are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }

    /// Finite and within the latitude/longitude ranges.
    pub fn is_valid(&self) -> bool {
        self.is_finite() && (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }

    /// Latitude and longitude as whole microdegrees.
    ///
    /// This is the quantization used for cache keys. `-0.0000001` becomes `0`, so values that
    /// are equal after rounding also have equal microdegrees.
    pub fn to_microdegrees(self) -> (i64, i64) {
        (to_micro(self.lat), to_micro(self.lon))
    }

    /// Rounds both components to [`COORDINATE_PRECISION`] decimal digits.
    pub fn quantized(self) -> Self {
        let (lat, lon) = self.to_microdegrees();
        Self::new(lat as f64 / MICRODEGREES, lon as f64 / MICRODEGREES)
    }
}

fn to_micro(value: f64) -> i64 {
    // `as` saturates; the result is only meaningful for finite input.
    (value * MICRODEGREES).round() as i64
}

impl From<[f64; 2]> for Coordinate {
    fn from([lat, lon]: [f64; 2]) -> Self {
        Self { lat, lon }
    }
}

impl From<Coordinate> for [f64; 2] {
    fn from(coord: Coordinate) -> Self {
        [coord.lat, coord.lon]
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lon)
    }
}

/// Error returned when a `lat,lon` string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid coordinate `{0}`, expected `lat,lon`")]
pub struct ParseCoordinateError(String);

impl FromStr for Coordinate {
    type Err = ParseCoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseCoordinateError(s.to_owned());
        let (lat, lon) = s.split_once(',').ok_or_else(err)?;
        let lat = lat.trim().parse().map_err(|_| err())?;
        let lon = lon.trim().parse().map_err(|_| err())?;
        let coord = Coordinate::new(lat, lon);
        if coord.is_valid() {
            Ok(coord)
        } else {
            Err(err())
        }
    }
}

/// Identifies a route by the ambulance it belongs to and the hospital it leads to.
///
/// This is what in-flight deduplication works on, not the raw coordinates: an ambulance that
/// moves a few meters between pushes is still the same pending resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PairId {
    pub ambulance: Arc<str>,
    pub hospital: Arc<str>,
}

impl PairId {
    pub fn new(ambulance: impl Into<Arc<str>>, hospital: impl Into<Arc<str>>) -> Self {
        Self {
            ambulance: ambulance.into(),
            hospital: hospital.into(),
        }
    }
}

impl fmt::Display for PairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.ambulance, self.hospital)
    }
}

/// A road-following route as returned by the routing oracle, already converted to
/// `(lat, lon)` order and metric units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteSummary {
    pub geometry: Vec<Coordinate>,
    pub distance_km: f64,
    pub duration_min: f64,
}

/// Where the geometry of a [`ResolvedRoute`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    /// The push event already carried a detailed polyline.
    Supplied,
    /// Served from the in-memory route cache.
    Cached,
    /// Freshly resolved by the routing oracle.
    Detailed,
    /// Straight line between origin and destination.
    Fallback,
}

impl RouteSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supplied => "supplied",
            Self::Cached => "cached",
            Self::Detailed => "detailed",
            Self::Fallback => "fallback",
        }
    }

    /// Whether the geometry follows roads rather than being a bare straight line.
    pub fn is_detailed(&self) -> bool {
        !matches!(self, Self::Fallback)
    }
}

/// The final geometry for one route, ready to be drawn.
///
/// Distance and duration are `None` when unknown, which is the case for fallback and
/// supplied geometry. Unknown is not the same as zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedRoute {
    pub pair: PairId,
    pub geometry: Vec<Coordinate>,
    pub distance_km: Option<f64>,
    pub duration_min: Option<f64>,
    pub source: RouteSource,
}

impl ResolvedRoute {
    pub fn fallback(pair: PairId, origin: Coordinate, destination: Coordinate) -> Self {
        Self {
            pair,
            geometry: vec![origin, destination],
            distance_km: None,
            duration_min: None,
            source: RouteSource::Fallback,
        }
    }

    pub fn supplied(pair: PairId, geometry: Vec<Coordinate>) -> Self {
        Self {
            pair,
            geometry,
            distance_km: None,
            duration_min: None,
            source: RouteSource::Supplied,
        }
    }

    pub fn from_summary(pair: PairId, summary: &RouteSummary, source: RouteSource) -> Self {
        Self {
            pair,
            geometry: summary.geometry.clone(),
            distance_km: Some(summary.distance_km),
            duration_min: Some(summary.duration_min),
            source,
        }
    }
}
