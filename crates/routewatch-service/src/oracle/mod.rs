//! Access to the external routing oracle.
//!
//! The oracle is anything that can answer "how do I drive from A to B" with an OSRM-shaped
//! payload. [`OsrmOracle`] talks to an OSRM HTTP server. Tests substitute their own
//! [`RoutingOracle`] implementations.

use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Deserialize;
use thiserror::Error;

use crate::types::{Coordinate, RouteSummary};

mod osrm;

pub use osrm::OsrmOracle;

/// The minimum number of points a detailed geometry needs.
///
/// Anything shorter carries no more information than the straight line between origin and
/// destination.
pub const MIN_DETAILED_POINTS: usize = 3;

/// Why a detailed route could not be obtained.
///
/// None of these are fatal. The resolver answers all of them with a straight-line fallback and
/// never caches them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouteError {
    /// The oracle did not answer within the deadline.
    #[error("routing request timed out after {0:?}")]
    Timeout(Duration),
    /// Connection loss, DNS resolution or some other transport problem.
    #[error("routing request failed: {0}")]
    Download(String),
    /// The oracle answered with a non-success HTTP status.
    #[error("routing oracle responded with status {0}")]
    Status(u16),
    /// The oracle answered, but with a `code` other than `Ok`.
    #[error("routing oracle rejected the request: {0}")]
    Rejected(String),
    /// The payload had no routes at all.
    #[error("no route found")]
    NoRoute,
    /// The route's geometry is too short to be worth drawing.
    #[error("route geometry has only {0} points")]
    TooFewPoints(usize),
    /// The payload could not be understood.
    #[error("malformed routing response: {0}")]
    Malformed(String),
    /// The resolver is shutting down.
    #[error("routing request cancelled")]
    Cancelled,
}

impl RouteError {
    /// Creates a [`RouteError::Download`] from the innermost cause of `error`.
    ///
    /// The outer layers of a `reqwest` error mostly repeat the URL, which is already part of
    /// the log context.
    pub fn download_error(mut error: &dyn std::error::Error) -> Self {
        while let Some(src) = error.source() {
            error = src;
        }

        Self::Download(error.to_string())
    }

    /// A short, stable name for metrics tags.
    pub fn metric_tag(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Download(_) => "download",
            Self::Status(_) => "status",
            Self::Rejected(_) => "rejected",
            Self::NoRoute => "no_route",
            Self::TooFewPoints(_) => "too_few_points",
            Self::Malformed(_) => "malformed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<reqwest::Error> for RouteError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            return Self::Malformed(error.to_string());
        }
        if let Some(status) = error.status() {
            return Self::Status(status.as_u16());
        }
        Self::download_error(&error)
    }
}

impl From<serde_json::Error> for RouteError {
    fn from(error: serde_json::Error) -> Self {
        Self::Malformed(error.to_string())
    }
}

/// Top-level response of the OSRM `route` service.
///
/// Only the fields needed for drawing are read. Everything else is ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OsrmResponse {
    /// `Ok` on success. Servers that omit it are treated as successful.
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub routes: Option<Vec<OsrmRoute>>,
}

/// One route alternative, with geometry in GeoJSON `[lon, lat]` order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OsrmRoute {
    pub geometry: OsrmGeometry,
    /// Meters.
    pub distance: f64,
    /// Seconds.
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OsrmGeometry {
    pub coordinates: Vec<[f64; 2]>,
}

impl OsrmResponse {
    /// Classifies the payload, turning the first route into a [`RouteSummary`].
    ///
    /// Coordinates are swapped into `(lat, lon)` order, meters become kilometers and seconds
    /// become minutes.
    pub fn into_summary(self) -> Result<RouteSummary, RouteError> {
        if let Some(code) = self.code.filter(|code| code != "Ok") {
            let reason = match self.message {
                Some(message) => format!("{code}: {message}"),
                None => code,
            };
            return Err(RouteError::Rejected(reason));
        }

        let route = self
            .routes
            .and_then(|routes| routes.into_iter().next())
            .ok_or(RouteError::NoRoute)?;

        let points = route.geometry.coordinates.len();
        if points < MIN_DETAILED_POINTS {
            return Err(RouteError::TooFewPoints(points));
        }

        if !is_non_negative(route.distance) || !is_non_negative(route.duration) {
            return Err(RouteError::Malformed(format!(
                "invalid distance {} or duration {}",
                route.distance, route.duration
            )));
        }

        let geometry: Vec<_> = route
            .geometry
            .coordinates
            .into_iter()
            .map(|[lon, lat]| Coordinate::new(lat, lon))
            .collect();
        if let Some(bad) = geometry.iter().find(|coord| !coord.is_finite()) {
            return Err(RouteError::Malformed(format!("non-finite coordinate {bad}")));
        }

        Ok(RouteSummary {
            geometry,
            distance_km: route.distance / 1000.0,
            duration_min: route.duration / 60.0,
        })
    }
}

fn is_non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

/// Something that resolves detailed routes between two coordinates.
pub trait RoutingOracle: Send + Sync + fmt::Debug + 'static {
    /// Fetches the route from `origin` to `destination`.
    ///
    /// Implementations do not need to enforce a timeout. The resolver races every call against
    /// its own deadline and drops the future when it loses.
    fn fetch_route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> BoxFuture<'_, Result<OsrmResponse, RouteError>>;
}
